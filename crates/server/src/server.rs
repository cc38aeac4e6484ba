//! Session supervisor.
//!
//! Owns the TCP listener and the discovery responder, runs them side by
//! side, and spawns one task per accepted connection. No protocol logic
//! lives here.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fileshare_discovery::{Responder, ServiceAdvertisement};
use fileshare_file_ops::SharedRoot;
use fileshare_protocol::{DEFAULT_DISCOVERY_PORT, DEFAULT_TCP_PORT};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ServerError;
use crate::session::Session;

/// Identity advertised when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "File Sharing Service";

/// Server configuration, fixed for the lifetime of a [`FileServer`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory exposed to peers.
    pub shared_dir: PathBuf,
    /// Address both sockets bind to.
    pub bind_addr: IpAddr,
    /// TCP port for the file protocol (0 = OS-assigned).
    pub tcp_port: u16,
    /// UDP port for discovery (`None` disables the responder, 0 = OS-assigned).
    pub discovery_port: Option<u16>,
    /// Identity sent in discovery replies.
    pub service_name: String,
    /// Per-read limit for sessions (`None` waits forever).
    pub read_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shared_dir: PathBuf::from("shared_files"),
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            tcp_port: DEFAULT_TCP_PORT,
            discovery_port: Some(DEFAULT_DISCOVERY_PORT),
            service_name: DEFAULT_SERVICE_NAME.into(),
            read_timeout: None,
        }
    }
}

/// A bound file server, ready to [`run`](Self::run).
pub struct FileServer {
    listener: TcpListener,
    responder: Option<Responder>,
    root: Arc<SharedRoot>,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
}

impl FileServer {
    /// Opens the shared directory and binds both sockets.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let root = Arc::new(SharedRoot::open(&config.shared_dir).await?);

        let listener = TcpListener::bind(SocketAddr::new(config.bind_addr, config.tcp_port)).await?;

        let responder = match config.discovery_port {
            Some(port) => {
                let advertisement = ServiceAdvertisement::new(config.service_name.clone())?;
                let addr = SocketAddr::new(config.bind_addr, port);
                Some(Responder::bind(addr, advertisement).await?)
            }
            None => None,
        };

        Ok(Self {
            listener,
            responder,
            root,
            read_timeout: config.read_timeout,
            cancel: CancellationToken::new(),
        })
    }

    /// Address of the TCP listener.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Address of the discovery socket, if discovery is enabled.
    pub fn discovery_addr(&self) -> Option<SocketAddr> {
        self.responder.as_ref().and_then(|r| r.local_addr().ok())
    }

    /// The shared directory being served.
    pub fn root(&self) -> &SharedRoot {
        &self.root
    }

    /// Token that stops the server (and every session) when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops accepting connections and aborts in-flight sessions.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Runs the accept loop and the discovery responder until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let local_addr = self.local_addr()?;
        tracing::info!(
            %local_addr,
            root = %self.root.path().display(),
            "file server listening"
        );

        let discovery = self.responder.map(|responder| {
            let cancel = self.cancel.child_token();
            tokio::spawn(async move {
                if let Err(e) = responder.run(cancel).await {
                    tracing::error!("discovery responder failed: {e}");
                }
            })
        });

        loop {
            let accepted = tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("server shutting down");
                    break;
                }
                result = self.listener.accept() => result,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let root = Arc::clone(&self.root);
                    let cancel = self.cancel.child_token();
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        serve_connection(stream, peer, root, read_timeout, cancel).await;
                    });
                }
                Err(e) => {
                    tracing::error!("accept error: {e}");
                }
            }
        }

        if let Some(handle) = discovery {
            join_logged("discovery responder", handle).await;
        }
        Ok(())
    }
}

/// Waits for a background task, logging it if it panicked or was aborted.
/// Returns `true` if the task ran to completion.
async fn join_logged(task: &'static str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(task, "background task failed: {e}");
            false
        }
    }
}

/// Runs one session to completion and logs how it ended.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    root: Arc<SharedRoot>,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, "failed to set TCP_NODELAY: {e}");
    }
    tracing::info!(%peer, "connection accepted");

    let session = Session::new(stream, peer, root, read_timeout);
    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!(%peer, "session cancelled by shutdown");
            return;
        }
        outcome = session.run() => outcome,
    };

    match outcome {
        Ok(summary) => tracing::info!(
            %peer,
            commands = summary.commands,
            bytes_sent = summary.bytes_sent,
            bytes_received = summary.bytes_received,
            "session closed"
        ),
        Err(e) if e.is_disconnect() => tracing::warn!(%peer, "session ended by peer: {e}"),
        Err(ServerError::Timeout) => tracing::info!(%peer, "session idle timeout"),
        Err(e) => tracing::error!(%peer, "session error: {e}"),
    }
}
