use rdt::{accept, Protocol};

fn main() {
    env_logger::init();

    println!(">>> Waiting for incoming connections...");
    let socket = accept("0.0.0.0", 9090, Protocol::ReliableDatagram).unwrap();
    println!(">>> Connection accepted");

    loop {
        let mut buf = [0u8; 1500];
        let n = socket.recv(&mut buf).unwrap();

        if n == 0 {
            // Duplicate/out-of-order on the reliable-datagram path: the
            // caller is expected to just call recv again.
            continue;
        }

        let text = String::from_utf8_lossy(&buf[..n]).into_owned();
        println!(">>> Read: {:?}", text);
        socket.send(text.as_bytes()).unwrap();
    }
}
