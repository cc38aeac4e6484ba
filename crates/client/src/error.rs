use fileshare_protocol::ProtocolError;

/// Errors produced by [`Client`](crate::Client) operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("operation timed out")]
    Timeout,

    #[error("server rejected upload of {0:?}")]
    UploadFailed(String),

    /// The local source ended before the declared size was sent. The
    /// connection is out of sync afterwards and must be dropped.
    #[error("{name:?}: source produced {actual} of {expected} bytes")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },
}
