//! Wire protocol for the fileshare service.
//!
//! A client opens a TCP connection and issues one command at a time. Every
//! variable-length field is preceded by a fixed-width big-endian length.
//!
//! # Wire format
//!
//! See [`codec`] for the request/response layouts and [`wire`] for the
//! exact-length transport primitives they are built on.

pub mod codec;
pub mod command;
pub mod error;
pub mod wire;

pub use codec::{PutStatus, Request};
pub use command::Command;
pub use error::ProtocolError;

/// Literal datagram a client broadcasts to locate servers.
pub const DISCOVERY_PROBE: &[u8] = b"SERVICE DISCOVERY";

/// Default TCP port for the file exchange protocol.
pub const DEFAULT_TCP_PORT: u16 = 30001;

/// Default UDP port for discovery.
pub const DEFAULT_DISCOVERY_PORT: u16 = 30000;

/// Maximum accepted file name length on the wire, in bytes.
pub const MAX_NAME_LEN: usize = 4096;

/// Maximum accepted listing length on the wire (16 MiB).
pub const MAX_LISTING_LEN: usize = 16 * 1024 * 1024;

/// Chunk size used when streaming file payloads (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Returns `true` if `datagram` is exactly the discovery probe text.
pub fn is_discovery_probe(datagram: &[u8]) -> bool {
    datagram == DISCOVERY_PROBE
}
