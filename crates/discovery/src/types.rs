use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::DiscoveryError;

/// Largest datagram the responder reads or sends.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// Identity string a server sends in reply to a discovery probe.
///
/// Immutable and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceAdvertisement(Arc<str>);

impl ServiceAdvertisement {
    /// Creates an advertisement, rejecting empty or oversized identities.
    pub fn new(identity: impl Into<String>) -> Result<Self, DiscoveryError> {
        let identity = identity.into();
        if identity.is_empty() {
            return Err(DiscoveryError::InvalidAdvertisement(
                "service name must not be empty".into(),
            ));
        }
        if identity.len() > MAX_DATAGRAM_SIZE {
            return Err(DiscoveryError::InvalidAdvertisement(format!(
                "service name too long: {} bytes (max {MAX_DATAGRAM_SIZE})",
                identity.len()
            )));
        }
        Ok(Self(identity.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for ServiceAdvertisement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A server that answered a discovery probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    /// Identity text from the reply datagram.
    pub name: String,
    /// Address the reply came from (the discovery port, not the TCP port).
    pub addr: SocketAddr,
}
