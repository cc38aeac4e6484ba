use std::net::SocketAddr;
use std::time::Duration;

use fileshare_protocol::DISCOVERY_PROBE;
use tokio::net::UdpSocket;
use tokio::time::Instant;

use crate::DiscoveryError;
use crate::types::{DiscoveredServer, MAX_DATAGRAM_SIZE};

/// Sends one discovery probe to `target` and collects replies for `wait`.
///
/// `target` is usually a broadcast address such as `255.255.255.255:30000`,
/// but a unicast address works too. Replies that are not valid UTF-8 are
/// skipped. Duplicate replies from the same address are kept once.
pub async fn probe(
    target: SocketAddr,
    wait: Duration,
) -> Result<Vec<DiscoveredServer>, DiscoveryError> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        ([0, 0, 0, 0], 0).into()
    } else {
        (std::net::Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.set_broadcast(true)?;
    socket.send_to(DISCOVERY_PROBE, target).await?;
    tracing::debug!(to = %target, "discovery probe sent");

    let mut servers: Vec<DiscoveredServer> = Vec::new();
    let mut buf = [0u8; MAX_DATAGRAM_SIZE];
    let deadline = Instant::now() + wait;

    loop {
        let received = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await;
        let (len, addr) = match received {
            Err(_) => break,
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                tracing::warn!("discovery probe receive error: {e}");
                continue;
            }
        };

        let Ok(name) = std::str::from_utf8(&buf[..len]) else {
            tracing::trace!(%addr, "skipping non-UTF-8 discovery reply");
            continue;
        };
        if servers.iter().any(|s| s.addr == addr) {
            continue;
        }
        tracing::debug!(%addr, service = name, "discovered server");
        servers.push(DiscoveredServer {
            name: name.to_owned(),
            addr,
        });
    }

    Ok(servers)
}
