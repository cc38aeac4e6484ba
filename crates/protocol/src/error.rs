//! Error types for the wire protocol.

/// Errors produced while encoding or decoding protocol frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("truncated {what}: expected {expected} bytes, received {received}")]
    Truncated {
        what: &'static str,
        expected: usize,
        received: usize,
    },

    #[error("unknown command byte: {0:#04x}")]
    UnknownCommand(u8),

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("{what} too long: {len} bytes (max {max})")]
    TooLong {
        what: &'static str,
        len: usize,
        max: usize,
    },

    #[error("unexpected status: {0}")]
    UnexpectedStatus(String),
}

impl ProtocolError {
    /// Returns `true` if the error means the peer went away (EOF or a
    /// truncated frame) rather than sending something malformed.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Truncated { .. } => true,
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}
