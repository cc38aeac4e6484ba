use std::net::{IpAddr, SocketAddr};

use fileshare_protocol::is_discovery_probe;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use crate::DiscoveryError;
use crate::types::{MAX_DATAGRAM_SIZE, ServiceAdvertisement};

/// Answers discovery probes with the server's advertisement.
///
/// Each datagram is handled on its own; there is no per-sender state.
pub struct Responder {
    socket: UdpSocket,
    advertisement: ServiceAdvertisement,
}

impl Responder {
    /// Binds the discovery socket with broadcast enabled.
    pub async fn bind(
        addr: SocketAddr,
        advertisement: ServiceAdvertisement,
    ) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind(addr).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            advertisement,
        })
    }

    /// Address the discovery socket is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serves probes until the cancellation token is triggered.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DiscoveryError> {
        let local_addr = self.local_addr()?;
        tracing::info!(%local_addr, service = %self.advertisement, "discovery responder listening");

        // One extra byte so an oversized datagram never equals the probe.
        let mut buf = [0u8; MAX_DATAGRAM_SIZE + 1];
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("discovery responder shutting down");
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result,
            };

            match received {
                Ok((len, peer)) => self.handle_datagram(&buf[..len], peer).await,
                Err(e) => {
                    // ICMP port-unreachable from an earlier reply can
                    // surface here on some platforms.
                    tracing::warn!("discovery receive error: {e}");
                }
            }
        }
    }

    async fn handle_datagram(&self, datagram: &[u8], peer: SocketAddr) {
        if !is_discovery_probe(datagram) {
            tracing::trace!(%peer, len = datagram.len(), "ignoring unrelated datagram");
            return;
        }

        match self.socket.send_to(self.advertisement.as_bytes(), peer).await {
            Ok(_) => tracing::debug!(%peer, "answered discovery probe"),
            Err(e) => tracing::warn!(%peer, "failed to answer discovery probe: {e}"),
        }
    }
}

/// Returns local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
pub fn get_local_ips() -> Vec<IpAddr> {
    let mut ips = Vec::new();

    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return ips;
    };

    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        if let IpAddr::V4(ipv4) = iface.ip() {
            if ipv4.is_loopback() || ipv4.is_link_local() {
                continue;
            }
            ips.push(IpAddr::V4(ipv4));
        }
    }

    ips
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn spawn_responder(
        name: &str,
    ) -> (SocketAddr, CancellationToken, tokio::task::JoinHandle<()>) {
        let ad = ServiceAdvertisement::new(name).unwrap();
        let responder = Responder::bind("127.0.0.1:0".parse().unwrap(), ad)
            .await
            .unwrap();
        let addr = responder.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            responder.run(token).await.unwrap();
        });
        (addr, cancel, handle)
    }

    #[tokio::test]
    async fn answers_probe_with_identity() {
        let (addr, cancel, handle) = spawn_responder("Lab File Sharing Service").await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"SERVICE DISCOVERY", addr).await.unwrap();

        let mut buf = [0u8; 256];
        let (len, from) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"Lab File Sharing Service");
        assert_eq!(from, addr);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn ignores_unrelated_datagrams() {
        let (addr, cancel, handle) = spawn_responder("svc").await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello?", addr).await.unwrap();
        client.send_to(b"SERVICE DISCOVERY ", addr).await.unwrap();

        let mut buf = [0u8; 256];
        let silent =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(silent.is_err(), "responder must not answer junk");

        // Still serving afterwards.
        client.send_to(b"SERVICE DISCOVERY", addr).await.unwrap();
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"svc");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn one_reply_per_probe() {
        let (addr, cancel, handle) = spawn_responder("svc").await;

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"SERVICE DISCOVERY", addr).await.unwrap();

        let mut buf = [0u8; 256];
        tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let extra =
            tokio::time::timeout(Duration::from_millis(200), client.recv_from(&mut buf)).await;
        assert!(extra.is_err(), "expected exactly one reply");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn local_ips_exclude_loopback() {
        for ip in get_local_ips() {
            assert!(!ip.is_loopback());
        }
    }
}
