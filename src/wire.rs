//! Fixed-layout packet encoding for the reliable-datagram path.
//!
//! Layout on the wire: a one-byte type field, a four-byte sequence number in
//! network byte order, and up to [`PKT_LEN`] bytes of payload. The payload is
//! never padded — the on-wire size is `HEADER_LEN + payload.len()`.

use crate::error::Error;

/// Maximum payload bytes carried by a single packet.
pub const PKT_LEN: usize = 1400;

/// `type(1) + seqnum(4)`. Named rather than inlined so the reader can see
/// where it comes from, even though the byte-by-byte encoder below has no
/// struct-layout padding to guard against.
pub const HEADER_LEN: usize = 1 + 4;

/// Packet type bitset: `DAT=0, SYN=1, ACK=2, FIN=4`. `SYN|ACK` is the
/// combination the responder sends during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketKind(pub u8);

impl PacketKind {
    pub const DAT: PacketKind = PacketKind(0);
    pub const SYN: PacketKind = PacketKind(1);
    pub const ACK: PacketKind = PacketKind(2);
    pub const FIN: PacketKind = PacketKind(4);
    pub const SYN_ACK: PacketKind = PacketKind(Self::SYN.0 | Self::ACK.0);

    pub fn contains(self, bit: PacketKind) -> bool {
        self.0 & bit.0 == bit.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    pub seqnum: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(kind: PacketKind, seqnum: u32, payload: Vec<u8>) -> Self {
        debug_assert!(payload.len() <= PKT_LEN);
        Packet {
            kind,
            seqnum,
            payload,
        }
    }

    pub fn control(kind: PacketKind, seqnum: u32) -> Self {
        Packet::new(kind, seqnum, Vec::new())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.kind.0);
        buf.extend_from_slice(&self.seqnum.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decodes a received datagram. A datagram shorter than the header is
    /// rejected outright; the payload length is whatever is left over.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < HEADER_LEN {
            return Err(Error::ShortPacket);
        }

        let kind = PacketKind(bytes[0]);
        let seqnum = u32::from_be_bytes(bytes[1..HEADER_LEN].try_into().unwrap());
        let payload = bytes[HEADER_LEN..].to_vec();

        Ok(Packet::new(kind, seqnum, payload))
    }
}
