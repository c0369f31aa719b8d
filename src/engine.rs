//! Reliable transport engine (RTE): the background transmission loop that
//! owns first transmission, timed retransmission, and ACK processing for one
//! connection's send window.
//!
//! Lifetime is tied to the [`Engine`] value rather than the process: so a
//! connection's background work shuts down deterministically alongside it,
//! `Engine::drop` signals the stop flag and joins the thread.

use std::net::UdpSocket;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::config::TransportConfig;
use crate::table::ConnectionTable;
use crate::wire::{Packet, PacketKind, HEADER_LEN};
use crate::window::SendWindow;

pub struct Engine {
    stop: Arc<AtomicBool>,
    unreachable: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl Engine {
    /// Spawns the background loop. `socket` must be a handle to the same
    /// underlying datagram socket the connection sends on (typically a
    /// `try_clone`), since the loop both transmits outgoing slots and reads
    /// inbound ACKs.
    pub fn spawn(
        window: Arc<Mutex<SendWindow>>,
        socket: UdpSocket,
        handle: RawFd,
        config: TransportConfig,
    ) -> Engine {
        let stop = Arc::new(AtomicBool::new(false));
        let unreachable = Arc::new(AtomicBool::new(false));

        let join = {
            let stop = stop.clone();
            let unreachable = unreachable.clone();
            thread::spawn(move || transmission_loop(window, socket, handle, config, stop, unreachable))
        };

        Engine {
            stop,
            unreachable,
            join: Some(join),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_peer_unreachable(&self) -> bool {
        self.unreachable.load(Ordering::Acquire)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn transmission_loop(
    window: Arc<Mutex<SendWindow>>,
    socket: UdpSocket,
    handle: RawFd,
    config: TransportConfig,
    stop: Arc<AtomicBool>,
    unreachable: Arc<AtomicBool>,
) {
    let table = ConnectionTable::global();
    socket
        .set_read_timeout(Some(config.recv_timeout))
        .expect("setting a read timeout on a fresh socket cannot fail");

    while !stop.load(Ordering::Acquire) {
        let had_work = {
            let mut win = window.lock().unwrap();
            if win.is_empty() {
                false
            } else {
                let now = Instant::now();
                for slot in win.iter_mut() {
                    let Some(peer) = table.lookup(slot.handle) else {
                        continue;
                    };

                    if slot.sent_once {
                        if let Some(last) = slot.last_sent {
                            if now.duration_since(last) < config.retransmit_interval {
                                continue;
                            }
                        }
                    }

                    if let Some(max) = config.max_retransmits {
                        if slot.attempts >= max {
                            unreachable.store(true, Ordering::Release);
                            continue;
                        }
                    }

                    let wire = slot.packet.encode();
                    if socket.send_to(&wire, peer).is_ok() {
                        slot.last_sent = Some(now);
                        slot.sent_once = true;
                        slot.attempts += 1;
                        log::trace!(
                            "rte[{}]: transmitted seq={} len={}",
                            handle,
                            slot.packet.seqnum,
                            slot.payload_len
                        );
                    }
                }
                true
            }
        };

        if !had_work {
            thread::sleep(config.poll_interval);
            continue;
        }

        // Receive on the oldest unacked slot's socket, one header-sized read.
        // Sufficient because ACKs are addressed to the sender that sent the
        // oldest outstanding packet, under the one-connection-per-socket
        // assumption this engine instance embodies.
        let mut hdr = [0u8; HEADER_LEN];
        let received = socket.recv_from(&mut hdr);

        let mut win = window.lock().unwrap();
        match received {
            Ok((n, _from)) if n >= HEADER_LEN => {
                if let Ok(pkt) = Packet::decode(&hdr[..n]) {
                    if pkt.kind == PacketKind::ACK {
                        let removed = win.ack_through(pkt.seqnum);
                        if removed > 0 {
                            log::debug!("rte[{}]: ack through seq={} retired {} slot(s)", handle, pkt.seqnum, removed);
                        }
                    }
                }
            }
            _ => {
                // Timeout or short read: everything in the window is
                // eligible for immediate retransmission.
                win.mark_all_for_retransmit();
            }
        }
        drop(win);

        thread::sleep(config.poll_interval);
    }
}
