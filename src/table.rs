//! Connection table (CT): maps an active local datagram socket handle to its
//! confirmed peer address.
//!
//! Kept process-wide and fixed-capacity rather than folded into the
//! per-connection state: it is independently testable (connect/accept should
//! leave a matching entry behind), and it is cheap to keep coarse-locked
//! since lookups and saves are rare compared to the data path.

use std::os::fd::RawFd;
use std::sync::{Mutex, OnceLock};

use crate::error::Error;

pub const CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy)]
struct Record {
    handle: RawFd,
    addr: std::net::SocketAddr,
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    records: Mutex<Vec<Option<Record>>>,
}

impl ConnectionTable {
    fn new() -> Self {
        ConnectionTable {
            records: Mutex::new(vec![None; CAPACITY]),
        }
    }

    pub fn global() -> &'static ConnectionTable {
        static TABLE: OnceLock<ConnectionTable> = OnceLock::new();
        TABLE.get_or_init(ConnectionTable::new)
    }

    /// Stores `addr` for `handle` in the first empty slot.
    ///
    /// Duplicate saves of the same handle are undefined behavior per the
    /// spec; callers are expected to `clear` before re-saving the same
    /// handle (`disconnect` does this).
    pub fn save(&self, handle: RawFd, addr: std::net::SocketAddr) -> Result<(), Error> {
        let mut records = self.records.lock().unwrap();
        for slot in records.iter_mut() {
            if slot.is_none() {
                *slot = Some(Record { handle, addr });
                return Ok(());
            }
        }
        Err(Error::TableFull)
    }

    pub fn lookup(&self, handle: RawFd) -> Option<std::net::SocketAddr> {
        let records = self.records.lock().unwrap();
        records
            .iter()
            .flatten()
            .find(|r| r.handle == handle)
            .map(|r| r.addr)
    }

    /// Marks the slot for `handle` empty. A no-op if no record exists, so
    /// `disconnect` can call it unconditionally.
    pub fn clear(&self, handle: RawFd) {
        let mut records = self.records.lock().unwrap();
        for slot in records.iter_mut() {
            if slot.map(|r| r.handle) == Some(handle) {
                *slot = None;
            }
        }
    }
}
