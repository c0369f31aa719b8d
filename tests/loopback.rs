//! Integration tests that exercise the reliable-datagram path over real
//! loopback UDP sockets rather than a mocked transport — handshake, ordered
//! delivery, window-saturation backpressure, loss recovery, and out-of-order
//! rejection.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use rdt::{
    accept_with_config, connect_with_config, Packet, PacketKind, Protocol, RdtSocket,
    RecvOutcome, TransportConfig, HEADER_LEN, PKT_LEN,
};

fn fast_config(window_capacity: usize) -> TransportConfig {
    TransportConfig {
        window_capacity,
        retransmit_interval: Duration::from_millis(20),
        recv_timeout: Duration::from_millis(200),
        handshake_retries: 5,
        poll_interval: Duration::from_millis(1),
        max_retransmits: None,
    }
}

#[test]
fn clean_round_trip_delivers_payloads_in_order() {
    let config = fast_config(20);
    let server_config = config.clone();

    let server = thread::spawn(move || {
        accept_with_config("127.0.0.1", 29101, Protocol::ReliableDatagram, server_config).unwrap()
    });

    // give the accept loop a moment to bind before the client's first SYN
    thread::sleep(Duration::from_millis(50));

    let client = connect_with_config("127.0.0.1", 29101, Protocol::ReliableDatagram, config).unwrap();
    let server = server.join().unwrap();

    for payload in [b"A".as_slice(), b"BB".as_slice(), b"CCC".as_slice()] {
        client.send(payload).unwrap();
    }

    let mut delivered = Vec::new();
    while delivered.len() < 3 {
        let mut buf = [0u8; 1500];
        let n = server.recv(&mut buf).unwrap();
        if n > 0 {
            delivered.push(buf[..n].to_vec());
        }
    }

    assert_eq!(delivered, vec![b"A".to_vec(), b"BB".to_vec(), b"CCC".to_vec()]);

    client.disconnect().unwrap();
    server.disconnect().unwrap();
}

#[test]
fn handshake_fails_when_nobody_is_listening() {
    let config = TransportConfig {
        recv_timeout: Duration::from_millis(50),
        handshake_retries: 3,
        ..fast_config(20)
    };

    let err = connect_with_config("127.0.0.1", 29102, Protocol::ReliableDatagram, config).unwrap_err();
    assert!(matches!(err, rdt::Error::HandshakeFailed));
}

#[test]
fn window_saturation_blocks_until_acks_arrive() {
    let config = fast_config(3);
    let server_config = config.clone();

    let server = thread::spawn(move || {
        accept_with_config("127.0.0.1", 29103, Protocol::ReliableDatagram, server_config).unwrap()
    });

    thread::sleep(Duration::from_millis(50));

    let client = connect_with_config("127.0.0.1", 29103, Protocol::ReliableDatagram, config).unwrap();
    let server = server.join().unwrap();

    // Fill the 3-slot window without the server reading anything yet.
    for i in 0..3u8 {
        client.send(&[i]).unwrap();
    }

    let (tx, rx) = mpsc::channel();
    let blocked_send = thread::spawn(move || {
        client.send(&[99]).unwrap();
        tx.send(()).unwrap();
        client
    });

    // The 4th send should still be blocked: no ACKs have been read yet.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // Draining the first three packets ACKs them and frees slots.
    for _ in 0..3u8 {
        let mut buf = [0u8; 16];
        let mut n = 0;
        while n == 0 {
            n = server.recv(&mut buf).unwrap();
        }
    }

    // Now the blocked send can complete.
    rx.recv_timeout(Duration::from_secs(2))
        .expect("4th send should unblock once a slot frees up");
    let client = blocked_send.join().unwrap();

    client.disconnect().unwrap();
    server.disconnect().unwrap();
}

/// A UDP relay sitting between a client and a real server, forwarding
/// datagrams in both directions but dropping exactly the first transmission
/// of one chosen sequence number. Used to force the engine's retransmit
/// timer (rather than a clean first attempt) to be what delivers a packet.
struct LossyRelay {
    stop: Arc<AtomicBool>,
    forward: thread::JoinHandle<()>,
    backward: thread::JoinHandle<()>,
}

impl LossyRelay {
    fn spawn(listen_addr: &str, target_addr: SocketAddr, drop_seq: u32) -> LossyRelay {
        let client_side = UdpSocket::bind(listen_addr).unwrap();
        let server_side = UdpSocket::bind("127.0.0.1:0").unwrap();
        client_side.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        server_side.set_read_timeout(Some(Duration::from_millis(20))).unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let dropped_once = Arc::new(AtomicBool::new(false));
        let client_addr: Arc<Mutex<Option<SocketAddr>>> = Arc::new(Mutex::new(None));

        let forward = {
            let stop = stop.clone();
            let dropped_once = dropped_once.clone();
            let client_addr = client_addr.clone();
            let client_side = client_side.try_clone().unwrap();
            let server_side = server_side.try_clone().unwrap();
            thread::spawn(move || {
                let mut buf = [0u8; HEADER_LEN + PKT_LEN];
                while !stop.load(Ordering::Acquire) {
                    let Ok((n, from)) = client_side.recv_from(&mut buf) else {
                        continue;
                    };
                    *client_addr.lock().unwrap() = Some(from);
                    if let Ok(pkt) = Packet::decode(&buf[..n]) {
                        if pkt.kind == PacketKind::DAT
                            && pkt.seqnum == drop_seq
                            && !dropped_once.swap(true, Ordering::AcqRel)
                        {
                            continue;
                        }
                    }
                    let _ = server_side.send_to(&buf[..n], target_addr);
                }
            })
        };

        let backward = {
            let stop = stop.clone();
            thread::spawn(move || {
                let mut buf = [0u8; HEADER_LEN + PKT_LEN];
                while !stop.load(Ordering::Acquire) {
                    let Ok((n, _from)) = server_side.recv_from(&mut buf) else {
                        continue;
                    };
                    if let Some(addr) = *client_addr.lock().unwrap() {
                        let _ = client_side.send_to(&buf[..n], addr);
                    }
                }
            })
        };

        LossyRelay { stop, forward, backward }
    }

    fn stop(self) {
        self.stop.store(true, Ordering::Release);
        let _ = self.forward.join();
        let _ = self.backward.join();
    }
}

#[test]
fn lossy_first_transmission_recovers_via_retransmit_and_cumulative_ack() {
    let server_port = 29104;
    let proxy_port = 29105;
    let config = fast_config(20);
    let server_config = config.clone();

    let server = thread::spawn(move || {
        RdtSocket::accept("127.0.0.1", server_port, server_config).unwrap()
    });
    thread::sleep(Duration::from_millis(50));

    // Drop only the first transmission of seqnum=1; the retransmit timer
    // picks it up afterward.
    let relay = LossyRelay::spawn(
        &format!("127.0.0.1:{proxy_port}"),
        format!("127.0.0.1:{server_port}").parse().unwrap(),
        1,
    );

    let client = RdtSocket::connect("127.0.0.1", proxy_port, config).unwrap();
    let server = server.join().unwrap();

    for payload in [b"A".as_slice(), b"B".as_slice(), b"C".as_slice()] {
        client.send(payload).unwrap();
    }

    let mut delivered = Vec::new();
    while delivered.len() < 3 {
        let mut buf = [0u8; 16];
        let n = server.recv(&mut buf).unwrap();
        if n > 0 {
            delivered.push(buf[..n].to_vec());
        }
    }
    assert_eq!(delivered, vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()]);

    // The dropped packet forces a retransmit; once its ACK lands, the
    // cumulative trim on the sender's window should retire every slot, not
    // just the one that was lost.
    let deadline = Instant::now() + Duration::from_secs(2);
    while client.debug_window_len() > 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(client.debug_window_len(), 0);

    client.disconnect().unwrap();
    server.disconnect().unwrap();
    relay.stop();
}

#[test]
fn out_of_order_datagram_is_acked_but_withheld_until_in_order_arrives() {
    let server_port = 29106;
    let config = fast_config(20);

    let server = thread::spawn(move || RdtSocket::accept("127.0.0.1", server_port, config).unwrap());
    thread::sleep(Duration::from_millis(50));

    // A hand-rolled peer: drives the handshake and crafts out-of-order
    // packets directly, bypassing the engine so delivery order is exact.
    let fake_client = UdpSocket::bind("127.0.0.1:0").unwrap();
    fake_client.set_read_timeout(Some(Duration::from_millis(200))).unwrap();
    let server_addr: SocketAddr = format!("127.0.0.1:{server_port}").parse().unwrap();

    let syn = Packet::control(PacketKind::SYN, 0).encode();
    let mut hdr = [0u8; HEADER_LEN];
    'handshake: loop {
        fake_client.send_to(&syn, server_addr).unwrap();
        if let Ok((n, _)) = fake_client.recv_from(&mut hdr) {
            if let Ok(pkt) = Packet::decode(&hdr[..n]) {
                if pkt.kind == PacketKind::SYN_ACK {
                    break 'handshake;
                }
            }
        }
    }
    let ack = Packet::control(PacketKind::ACK, 0).encode();
    fake_client.send_to(&ack, server_addr).unwrap();

    let server = server.join().unwrap();

    // Send seqnum=1 before seqnum=0 has ever arrived.
    let out_of_order = Packet::new(PacketKind::DAT, 1, b"B".to_vec()).encode();
    fake_client.send_to(&out_of_order, server_addr).unwrap();

    match server.recv_detailed(&mut [0u8; 16]).unwrap() {
        RecvOutcome::Duplicate => {}
        other => panic!("expected Duplicate for an out-of-order packet, got {other:?}"),
    }
    // Still ACKed, even though it wasn't delivered.
    let mut ack_buf = [0u8; HEADER_LEN];
    let (n, _) = fake_client.recv_from(&mut ack_buf).unwrap();
    let ack_pkt = Packet::decode(&ack_buf[..n]).unwrap();
    assert_eq!(ack_pkt.kind, PacketKind::ACK);
    assert_eq!(ack_pkt.seqnum, 1);
    assert_eq!(server.debug_seqs().1, 0);

    // Now the in-order packet arrives and gets delivered, advancing recv_seq.
    let in_order = Packet::new(PacketKind::DAT, 0, b"A".to_vec()).encode();
    fake_client.send_to(&in_order, server_addr).unwrap();
    let mut buf = [0u8; 16];
    match server.recv_detailed(&mut buf).unwrap() {
        RecvOutcome::Delivered(n) => assert_eq!(&buf[..n], b"A".as_slice()),
        other => panic!("expected Delivered for the in-order packet, got {other:?}"),
    }
    assert_eq!(server.debug_seqs().1, 1);

    // The retransmitted seqnum=1 now arrives in order and is delivered too.
    let retransmitted = Packet::new(PacketKind::DAT, 1, b"B".to_vec()).encode();
    fake_client.send_to(&retransmitted, server_addr).unwrap();
    match server.recv_detailed(&mut buf).unwrap() {
        RecvOutcome::Delivered(n) => assert_eq!(&buf[..n], b"B".as_slice()),
        other => panic!("expected Delivered for the retransmitted packet, got {other:?}"),
    }
    assert_eq!(server.debug_seqs().1, 2);

    server.disconnect().unwrap();
}
