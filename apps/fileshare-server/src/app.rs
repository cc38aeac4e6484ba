//! Wires the file server to the process: bind, log reachability, wait for
//! Ctrl+C, shut down.

use fileshare_discovery::get_local_ips;
use fileshare_server::FileServer;

use crate::config::Config;

/// Runs the server until Ctrl+C or a fatal server error.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let server = FileServer::bind(config.to_server_config()?).await?;
    let addr = server.local_addr()?;

    let ips = get_local_ips();
    if ips.is_empty() {
        tracing::warn!("no non-loopback IPv4 address found; peers may not reach this host");
    }
    for ip in &ips {
        tracing::info!(%ip, port = addr.port(), "reachable at");
    }
    match server.discovery_addr() {
        Some(discovery) => tracing::info!(%discovery, service = %config.name, "discovery enabled"),
        None => tracing::info!("discovery disabled"),
    }

    let cancel = server.cancel_token();
    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        result = &mut server_task => {
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, shutting down");
        }
    }

    cancel.cancel();
    server_task.await??;
    Ok(())
}
