//! A reliable datagram transport: sequenced, acknowledged, retransmitted
//! delivery over an unreliable UDP socket, exposed through the same
//! connection-oriented API (`connect`/`accept`/`send`/`recv`/`disconnect`)
//! used for a plain reliable byte stream passed through to the host OS.
//!
//! Modules: `wire` (packet encoding), `table` (handle-to-peer lookup),
//! `window` + `engine` (the send window and its background transmission
//! loop), `socket` (the connect/accept/send/recv/disconnect facade).

mod config;
mod engine;
mod error;
mod socket;
mod table;
mod window;
mod wire;

pub use config::TransportConfig;
pub use error::Error;
pub use socket::{
    accept, accept_with_config, connect, connect_with_config, Protocol, RdtSocket, RecvOutcome,
    Socket,
};
pub use wire::{Packet, PacketKind, HEADER_LEN, PKT_LEN};
