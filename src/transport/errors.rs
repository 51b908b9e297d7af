use std::fmt;

#[derive(Debug)]
pub enum TransportError {
    Disconnected,
    Protocol(String),
    Io(String),
    InvalidConfig(String),
}

impl TransportError {
    /// Connect, handshake and stream faults.
    pub fn is_transport(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Disconnected)
    }

    /// Framing desync, unknown message kinds and server rejections.
    pub fn is_protocol(&self) -> bool {
        matches!(self, TransportError::Protocol(_))
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Disconnected => write!(f, "transport disconnected"),
            TransportError::Protocol(message) => write!(f, "protocol error: {message}"),
            TransportError::Io(message) => write!(f, "io error: {message}"),
            TransportError::InvalidConfig(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(error: std::io::Error) -> Self {
        TransportError::Io(error.to_string())
    }
}
