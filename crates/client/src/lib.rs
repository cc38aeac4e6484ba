//! Client side of the fileshare protocol.
//!
//! [`Client`] issues one command at a time over a single connection and
//! waits for the matching response before returning.

mod client;
mod error;

pub use client::Client;
pub use error::ClientError;

use std::time::Duration;

/// Read/write buffer size per connection (256 KB).
pub const TCP_BUFFER_SIZE: usize = 256 * 1024;

/// Timeout for the TCP connection attempt.
pub const TCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
