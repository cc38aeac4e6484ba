//! Server side of the fileshare protocol.
//!
//! [`FileServer`] accepts TCP connections and runs one [`Session`] per
//! connection on its own task, alongside the UDP discovery responder.
//! Sessions share nothing but the [`SharedRoot`](fileshare_file_ops::SharedRoot).

mod server;
mod session;

pub use server::{DEFAULT_SERVICE_NAME, FileServer, ServerConfig};
pub use session::{Session, SessionState, SessionSummary};

use fileshare_discovery::DiscoveryError;
use fileshare_file_ops::StoreError;
use fileshare_protocol::ProtocolError;

/// Read/write buffer size per connection (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Errors produced by the server. Any error returned from a session has
/// already closed that session and no other.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("file store error: {0}")]
    Store(#[from] StoreError),

    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("read timed out")]
    Timeout,

    #[error("upload of {name:?} incomplete: received {received} of {expected} bytes")]
    IncompleteUpload {
        name: String,
        expected: u64,
        received: u64,
    },

    #[error("{name:?} shrank while sending: sent {sent} of {expected} bytes")]
    SourceTruncated {
        name: String,
        expected: u64,
        sent: u64,
    },
}

impl ServerError {
    /// Returns `true` if the session ended because the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::IncompleteUpload { .. } => true,
            ServerError::Protocol(e) => e.is_disconnect(),
            ServerError::Io(e) => matches!(
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
