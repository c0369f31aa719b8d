use rdt::{connect, Protocol};

fn main() {
    env_logger::init();

    println!(">>> Trying to connect to server...");
    let socket = connect("127.0.0.1", 9090, Protocol::ReliableDatagram).unwrap();
    println!(">>> Connected!");

    for payload in ["A", "BB", "CCC"] {
        socket.send(payload.as_bytes()).unwrap();

        let mut buf = [0u8; 1500];
        loop {
            let n = socket.recv(&mut buf).unwrap();
            if n > 0 {
                println!(">>> Echo: {:?}", String::from_utf8_lossy(&buf[..n]));
                break;
            }
        }
    }

    socket.disconnect().unwrap();
}
