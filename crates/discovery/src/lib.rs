pub mod client;
pub mod server;
pub mod types;

// Re-export primary types.
pub use client::probe;
pub use server::{Responder, get_local_ips};
pub use types::{DiscoveredServer, MAX_DATAGRAM_SIZE, ServiceAdvertisement};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid service advertisement: {0}")]
    InvalidAdvertisement(String),
}
