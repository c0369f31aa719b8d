//! Send window: a fixed-capacity ring of unacknowledged outgoing packets.
//!
//! `enqueue` is the producer side (called from `RdtSocket::send`); the
//! engine's transmission loop is the consumer side (transmits, retransmits
//! on the rate-limit gate, and trims on cumulative ACK). Both sides take the
//! same lock; the engine must never hold it across a blocking socket read.

use std::os::fd::RawFd;
use std::time::Instant;

use crate::wire::Packet;

pub const DEFAULT_WINDOW_CAPACITY: usize = 20;

#[derive(Debug)]
pub struct Slot {
    pub handle: RawFd,
    pub packet: Packet,
    pub payload_len: usize,
    pub last_sent: Option<Instant>,
    pub sent_once: bool,
    /// Number of times this slot has been transmitted. Only consulted when
    /// `TransportConfig::max_retransmits` is set; the spec's core behavior
    /// never bounds retransmission.
    pub attempts: u32,
}

/// Ring buffer of [`Slot`]s. Occupied slots run from `tail` to `head` (mod
/// capacity); their sequence numbers are strictly increasing from tail to
/// head by construction, since `enqueue` only ever appends at `head`.
#[derive(Debug)]
pub struct SendWindow {
    slots: Vec<Option<Slot>>,
    capacity: usize,
    head: usize,
    tail: usize,
    count: usize,
}

impl SendWindow {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        SendWindow {
            slots,
            capacity,
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn len(&self) -> usize {
        self.count
    }

    /// Appends a new slot at `head`. Caller must have already checked
    /// `!is_full()` under the same lock acquisition (the blocking-while-full
    /// poll loop lives in `RdtSocket::send`, outside this type, so it can
    /// release the lock between checks).
    pub fn push(&mut self, handle: RawFd, packet: Packet, payload_len: usize) {
        debug_assert!(!self.is_full());
        self.slots[self.head] = Some(Slot {
            handle,
            packet,
            payload_len,
            last_sent: None,
            sent_once: false,
            attempts: 0,
        });
        self.head = (self.head + 1) % self.capacity;
        self.count += 1;
    }

    /// Iterates occupied slots from tail to head.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Slot> {
        let capacity = self.capacity;
        let tail = self.tail;
        let count = self.count;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(move |(i, slot)| {
                let offset = (i + capacity - tail) % capacity;
                if offset < count {
                    slot.as_mut()
                } else {
                    None
                }
            })
    }

    /// Removes every slot from `tail` forward whose `seqnum <= ack_seq`.
    /// Cumulative: a single later ACK subsumes lost earlier ones.
    pub fn ack_through(&mut self, ack_seq: u32) -> usize {
        let mut removed = 0;
        loop {
            if self.count == 0 {
                break;
            }
            let seqnum = match &self.slots[self.tail] {
                Some(slot) => slot.packet.seqnum,
                None => break,
            };
            if seqnum > ack_seq {
                break;
            }
            self.slots[self.tail] = None;
            self.tail = (self.tail + 1) % self.capacity;
            self.count -= 1;
            removed += 1;
        }
        removed
    }

    /// Drops every occupied slot without requiring an ACK. Used by
    /// `disconnect`'s explicit drain, so a closed connection doesn't leave
    /// dead slots retransmitting against a socket nobody is reading from.
    pub fn drain(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }

    /// Marks every occupied slot eligible for immediate retransmission, as
    /// happens when the engine's ACK-collection read times out.
    pub fn mark_all_for_retransmit(&mut self) {
        for slot in self.iter_mut() {
            slot.sent_once = false;
            slot.last_sent = None;
        }
    }
}
