//! Socket façade (SF): the public connection-oriented API. Dispatches on a
//! protocol selector to either the host stream transport (pass-through) or
//! the reliable-datagram path (handshake + engine-backed send / inline
//! receive).

use std::io::{Read, Write};
use std::mem::size_of;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::os::fd::{AsRawFd, FromRawFd, RawFd};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::TransportConfig;
use crate::engine::Engine;
use crate::error::Error;
use crate::table::ConnectionTable;
use crate::wire::{Packet, PacketKind, HEADER_LEN, PKT_LEN};
use crate::window::SendWindow;

/// Protocol selector at the façade: `Stream` delegates to the host OS byte
/// stream; `ReliableDatagram` is this crate's handshake + send-window path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Stream,
    ReliableDatagram,
}

/// Widened receive result: distinguishes "try again" (duplicate/out-of-order)
/// from a dropped non-`DAT` packet, rather than conflating both into a bare
/// `0`. [`RdtSocket::recv`] and [`Socket::recv`] still return a plain byte
/// count built on top of this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
    Delivered(usize),
    Duplicate,
    Dropped,
}

/// The reliable-datagram connection state held behind [`Socket`].
pub struct RdtSocket {
    socket: UdpSocket,
    handle: RawFd,
    window: Arc<Mutex<SendWindow>>,
    engine: Engine,
    send_seq: AtomicU32,
    recv_seq: AtomicU32,
    config: TransportConfig,
}

impl RdtSocket {
    pub fn connect(host: &str, port: u16, config: TransportConfig) -> Result<RdtSocket, Error> {
        let peer = resolve_one(host, port)?;

        let socket = UdpSocket::bind("0.0.0.0:0").map_err(Error::SocketCreate)?;
        socket
            .set_read_timeout(Some(config.recv_timeout))
            .map_err(Error::SocketCreate)?;

        let syn = Packet::control(PacketKind::SYN, 0);
        let mut recv_buf = [0u8; HEADER_LEN];

        for attempt in 0..config.handshake_retries {
            socket.send_to(&syn.encode(), peer).map_err(Error::SendFailed)?;
            log::debug!("connect: sent SYN attempt {}/{}", attempt + 1, config.handshake_retries);

            match socket.recv_from(&mut recv_buf) {
                Ok((n, from)) => {
                    if let Ok(pkt) = Packet::decode(&recv_buf[..n]) {
                        if pkt.kind == PacketKind::SYN_ACK {
                            let ack = Packet::control(PacketKind::ACK, 0);
                            socket.send_to(&ack.encode(), from).map_err(Error::SendFailed)?;

                            let handle = socket.as_raw_fd();
                            ConnectionTable::global().save(handle, from)?;

                            return Ok(RdtSocket::new(socket, handle, config));
                        }
                    }
                }
                Err(_) => continue, // timed out waiting for SYN|ACK; retry
            }
        }

        Err(Error::HandshakeFailed)
    }

    pub fn accept(iface: &str, port: u16, config: TransportConfig) -> Result<RdtSocket, Error> {
        let bind_addr = resolve_one(iface, port)?;
        let socket = UdpSocket::bind(bind_addr).map_err(Error::Bind)?;
        socket
            .set_read_timeout(Some(config.recv_timeout))
            .map_err(Error::SocketCreate)?;

        let mut buf = [0u8; HEADER_LEN];
        loop {
            let (n, client) = match socket.recv_from(&mut buf) {
                Ok(v) => v,
                Err(_) => continue,
            };

            let Ok(pkt) = Packet::decode(&buf[..n]) else {
                continue;
            };
            if pkt.kind != PacketKind::SYN {
                continue; // discard anything that isn't a SYN while listening
            }

            let synack = Packet::control(PacketKind::SYN_ACK, 0);
            loop {
                socket.send_to(&synack.encode(), client).map_err(Error::SendFailed)?;

                match socket.recv_from(&mut buf) {
                    Ok((n, from)) if from == client => {
                        if let Ok(pkt) = Packet::decode(&buf[..n]) {
                            if pkt.kind == PacketKind::ACK {
                                let handle = socket.as_raw_fd();
                                ConnectionTable::global().save(handle, client)?;
                                return Ok(RdtSocket::new(socket, handle, config));
                            }
                        }
                    }
                    _ => continue, // keep resending SYN|ACK; responder retries indefinitely
                }
            }
        }
    }

    fn new(socket: UdpSocket, handle: RawFd, config: TransportConfig) -> RdtSocket {
        let window = Arc::new(Mutex::new(SendWindow::new(config.window_capacity)));
        let engine_socket = socket.try_clone().expect("udp socket try_clone");
        let engine = Engine::spawn(window.clone(), engine_socket, handle, config.clone());

        RdtSocket {
            socket,
            handle,
            window,
            engine,
            send_seq: AtomicU32::new(0),
            recv_seq: AtomicU32::new(0),
            config,
        }
    }

    /// Hands `min(bytes.len(), PKT_LEN)` bytes to the engine's send window,
    /// blocking (poll-based) while the window is full.
    /// Returns `bytes.len()` — the full count accepted from the caller's
    /// point of view — even though only the leading `PKT_LEN` bytes were
    /// actually enqueued; the caller is expected to chunk payloads larger
    /// than one packet.
    pub fn send(&self, bytes: &[u8]) -> Result<usize, Error> {
        if self.engine.is_peer_unreachable() {
            return Err(Error::PeerUnreachable(
                self.config.max_retransmits.unwrap_or_default(),
            ));
        }

        let payload_len = bytes.len().min(PKT_LEN);
        loop {
            {
                let mut window = self.window.lock().unwrap();
                if !window.is_full() {
                    let seq = self.send_seq.fetch_add(1, Ordering::AcqRel);
                    let packet = Packet::new(PacketKind::DAT, seq, bytes[..payload_len].to_vec());
                    window.push(self.handle, packet, payload_len);
                    break;
                }
            }
            thread::sleep(self.config.poll_interval);
        }

        Ok(bytes.len())
    }

    /// Blocks on one datagram, ACKs it first if it's `DAT`, then decides
    /// whether to deliver it. See [`RecvOutcome`].
    pub fn recv_detailed(&self, buf: &mut [u8]) -> Result<RecvOutcome, Error> {
        let mut raw = vec![0u8; HEADER_LEN + PKT_LEN];
        let (n, _from) = self.socket.recv_from(&mut raw).map_err(Error::RecvFailed)?;
        let pkt = Packet::decode(&raw[..n])?;

        if pkt.kind != PacketKind::DAT {
            return Ok(RecvOutcome::Dropped);
        }

        // ACK-first-then-decide: prevents silent loss of ACKs on duplicates.
        // This ACKs the packet's own seqnum ("received"), not a cumulative
        // highest-in-order ("delivered") — the sender's window trims
        // cumulatively on receipt, so acking each arrival individually is
        // still enough to retire every slot up to the highest one acked.
        if let Some(peer) = ConnectionTable::global().lookup(self.handle) {
            let ack = Packet::control(PacketKind::ACK, pkt.seqnum);
            let _ = self.socket.send_to(&ack.encode(), peer);
        }

        let expected = self.recv_seq.load(Ordering::Acquire);
        if pkt.seqnum == expected {
            let to_copy = pkt.payload.len().min(buf.len());
            buf.iter_mut().for_each(|b| *b = 0);
            buf[..to_copy].copy_from_slice(&pkt.payload[..to_copy]);
            self.recv_seq.fetch_add(1, Ordering::AcqRel);
            Ok(RecvOutcome::Delivered(to_copy))
        } else {
            Ok(RecvOutcome::Duplicate)
        }
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, Error> {
        match self.recv_detailed(buf)? {
            RecvOutcome::Delivered(n) => Ok(n),
            RecvOutcome::Duplicate | RecvOutcome::Dropped => Ok(0),
        }
    }

    /// Exposes the send/receive sequence counters for test observability.
    pub fn debug_seqs(&self) -> (u32, u32) {
        (
            self.send_seq.load(Ordering::Acquire),
            self.recv_seq.load(Ordering::Acquire),
        )
    }

    /// Exposes the number of unacknowledged slots for test observability.
    pub fn debug_window_len(&self) -> usize {
        self.window.lock().unwrap().len()
    }

    /// Clears the connection-table entry, drains the send window (rather
    /// than leaving it to retransmit against a closed socket forever), stops
    /// the engine, and closes the underlying socket by consuming `self`.
    pub fn disconnect(self) -> Result<(), Error> {
        ConnectionTable::global().clear(self.handle);
        self.window.lock().unwrap().drain();
        Ok(())
        // `self` drops here: `Engine::drop` stops and joins the background
        // thread, then `socket` closes.
    }
}

/// The unified connection-oriented socket. Consuming `Self` on `disconnect`
/// makes "send after disconnect" a compile error rather than a runtime one.
pub enum Socket {
    Stream(TcpStream),
    Datagram(RdtSocket),
}

pub fn connect(host: &str, port: u16, protocol: Protocol) -> Result<Socket, Error> {
    connect_with_config(host, port, protocol, TransportConfig::default())
}

pub fn connect_with_config(
    host: &str,
    port: u16,
    protocol: Protocol,
    config: TransportConfig,
) -> Result<Socket, Error> {
    match protocol {
        Protocol::Stream => {
            let mut last_err = None;
            for addr in (host, port)
                .to_socket_addrs()
                .map_err(|_| Error::AddressResolution(host.to_string(), port))?
            {
                match TcpStream::connect(addr) {
                    Ok(stream) => return Ok(Socket::Stream(stream)),
                    Err(e) => last_err = Some(e),
                }
            }
            Err(Error::Connect(last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved")
            })))
        }
        Protocol::ReliableDatagram => Ok(Socket::Datagram(RdtSocket::connect(host, port, config)?)),
    }
}

pub fn accept(iface: &str, port: u16, protocol: Protocol) -> Result<Socket, Error> {
    accept_with_config(iface, port, protocol, TransportConfig::default())
}

pub fn accept_with_config(
    iface: &str,
    port: u16,
    protocol: Protocol,
    config: TransportConfig,
) -> Result<Socket, Error> {
    match protocol {
        Protocol::Stream => {
            let addr = resolve_one(iface, port)?;
            let listener = bind_reusable_tcp_listener(addr)?;
            let (stream, _peer) = listener.accept().map_err(Error::Connect)?;
            // Single-connection simplification: the listening socket is
            // closed once the one client is accepted.
            drop(listener);
            Ok(Socket::Stream(stream))
        }
        Protocol::ReliableDatagram => Ok(Socket::Datagram(RdtSocket::accept(iface, port, config)?)),
    }
}

impl Socket {
    pub fn send(&self, bytes: &[u8]) -> Result<usize, Error> {
        match self {
            Socket::Stream(stream) => (&*stream).write(bytes).map_err(Error::SendFailed),
            Socket::Datagram(rdt) => rdt.send(bytes),
        }
    }

    pub fn recv(&self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            Socket::Stream(stream) => (&*stream).read(buf).map_err(Error::RecvFailed),
            Socket::Datagram(rdt) => rdt.recv(buf),
        }
    }

    pub fn disconnect(self) -> Result<(), Error> {
        match self {
            Socket::Stream(stream) => {
                stream.shutdown(std::net::Shutdown::Both).or(Ok(()))
            }
            Socket::Datagram(rdt) => rdt.disconnect(),
        }
    }
}

fn resolve_one(host: &str, port: u16) -> Result<SocketAddr, Error> {
    (host, port)
        .to_socket_addrs()
        .map_err(|_| Error::AddressResolution(host.to_string(), port))?
        .next()
        .ok_or_else(|| Error::AddressResolution(host.to_string(), port))
}

/// Builds a `TcpListener` with `SO_REUSEADDR` set before bind. `std` offers
/// no way to set socket options pre-bind, so this drops to the raw `libc`
/// syscalls instead.
fn bind_reusable_tcp_listener(addr: SocketAddr) -> Result<TcpListener, Error> {
    unsafe {
        let domain = if addr.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
        let fd = libc::socket(domain, libc::SOCK_STREAM, 0);
        if fd < 0 {
            return Err(Error::SocketCreate(std::io::Error::last_os_error()));
        }

        let optval: libc::c_int = 1;
        let rc = libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &optval as *const _ as *const libc::c_void,
            size_of::<libc::c_int>() as libc::socklen_t,
        );
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(Error::SocketCreate(err));
        }

        let (storage, len) = socket_addr_to_raw(addr);
        let rc = libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len);
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(Error::Bind(err));
        }

        let rc = libc::listen(fd, libc::SOMAXCONN);
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            libc::close(fd);
            return Err(Error::Listen(err));
        }

        Ok(TcpListener::from_raw_fd(fd))
    }
}

fn socket_addr_to_raw(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
    // SAFETY: `sockaddr_storage` is valid when zeroed; we only ever write
    // through the `sockaddr_in`/`sockaddr_in6` view matching the family we
    // just set, and only read it back through the generic `sockaddr*` the
    // syscalls expect.
    unsafe {
        let mut storage: libc::sockaddr_storage = std::mem::zeroed();
        match addr {
            SocketAddr::V4(v4) => {
                let sin = &mut storage as *mut _ as *mut libc::sockaddr_in;
                (*sin).sin_family = libc::AF_INET as libc::sa_family_t;
                (*sin).sin_port = v4.port().to_be();
                (*sin).sin_addr = libc::in_addr {
                    s_addr: u32::from_ne_bytes(v4.ip().octets()),
                };
                (storage, size_of::<libc::sockaddr_in>() as libc::socklen_t)
            }
            SocketAddr::V6(v6) => {
                let sin6 = &mut storage as *mut _ as *mut libc::sockaddr_in6;
                (*sin6).sin6_family = libc::AF_INET6 as libc::sa_family_t;
                (*sin6).sin6_port = v6.port().to_be();
                (*sin6).sin6_addr = libc::in6_addr {
                    s6_addr: v6.ip().octets(),
                };
                (storage, size_of::<libc::sockaddr_in6>() as libc::socklen_t)
            }
        }
    }
}
