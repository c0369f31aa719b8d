#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to resolve {0}:{1}")]
    AddressResolution(String, u16),

    #[error("failed to create socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    #[error("failed to listen: {0}")]
    Listen(#[source] std::io::Error),

    #[error("failed to connect: {0}")]
    Connect(#[source] std::io::Error),

    #[error("handshake failed after retries exhausted")]
    HandshakeFailed,

    #[error("connection table is full")]
    TableFull,

    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    #[error("recv failed: {0}")]
    RecvFailed(#[source] std::io::Error),

    #[error("datagram shorter than the packet header")]
    ShortPacket,

    #[error("peer unreachable after {0} unacknowledged retransmissions")]
    PeerUnreachable(u32),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
