//! Per-connection protocol state machine.
//!
//! ```text
//!                 +--> Listing ---+
//! AwaitingCommand +--> Sending ---+--> AwaitingCommand
//!        |        +--> Receiving -+
//!        v
//!      Closed  (EOF, BYE, or any fatal error)
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fileshare_file_ops::SharedRoot;
use fileshare_protocol::codec::{read_request, write_file_size, write_listing, write_status};
use fileshare_protocol::{CHUNK_SIZE, PutStatus, Request};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf,
    WriteHalf,
};

use crate::{ServerError, TCP_BUFFER_SIZE};

/// Where a session is in its command cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingCommand,
    Listing,
    Sending,
    Receiving,
    Closed,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub commands: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

/// One client connection.
///
/// The session owns the stream; when [`run`](Self::run) returns the stream
/// has been shut down and dropped.
pub struct Session<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    root: Arc<SharedRoot>,
    peer: SocketAddr,
    read_timeout: Option<Duration>,
    state: SessionState,
    summary: SessionSummary,
    buf: Vec<u8>,
}

impl<S: AsyncRead + AsyncWrite> Session<S> {
    /// Wraps an accepted stream. `read_timeout` bounds every socket read,
    /// including the wait for the next command.
    pub fn new(
        stream: S,
        peer: SocketAddr,
        root: Arc<SharedRoot>,
        read_timeout: Option<Duration>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            writer: BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
            root,
            peer,
            read_timeout,
            state: SessionState::AwaitingCommand,
            summary: SessionSummary::default(),
            buf: vec![0u8; CHUNK_SIZE],
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Handles commands until the session closes, then shuts the stream down.
    pub async fn run(mut self) -> Result<SessionSummary, ServerError> {
        let result = loop {
            match self.step().await {
                Ok(SessionState::Closed) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.writer.shutdown().await {
            tracing::debug!(peer = %self.peer, "stream shutdown failed: {e}");
        }
        result.map(|()| self.summary)
    }

    /// Reads and fully handles one command.
    ///
    /// Returns the state the session is left in: `AwaitingCommand` to keep
    /// going, `Closed` when finished. An error always leaves it `Closed`.
    pub async fn step(&mut self) -> Result<SessionState, ServerError> {
        if self.state == SessionState::Closed {
            return Ok(SessionState::Closed);
        }

        match self.handle_next().await {
            Ok(next) => {
                self.transition(next);
                Ok(next)
            }
            Err(e) => {
                self.transition(SessionState::Closed);
                Err(e)
            }
        }
    }

    async fn handle_next(&mut self) -> Result<SessionState, ServerError> {
        let Some(request) = with_timeout(self.read_timeout, read_request(&mut self.reader)).await?
        else {
            tracing::debug!(peer = %self.peer, "peer closed connection");
            return Ok(SessionState::Closed);
        };

        self.summary.commands += 1;
        tracing::debug!(peer = %self.peer, command = %request.command(), "command received");

        match request {
            Request::List => {
                self.transition(SessionState::Listing);
                self.handle_list().await?;
            }
            Request::Get { name } => {
                self.transition(SessionState::Sending);
                self.handle_get(&name).await?;
            }
            Request::Put { name, size } => {
                self.transition(SessionState::Receiving);
                self.handle_put(&name, size).await?;
            }
            Request::Bye => {
                tracing::debug!(peer = %self.peer, "peer said goodbye");
                return Ok(SessionState::Closed);
            }
        }
        Ok(SessionState::AwaitingCommand)
    }

    async fn handle_list(&mut self) -> Result<(), ServerError> {
        let names = match self.root.list_entries().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(peer = %self.peer, "failed to list shared directory: {e}");
                Vec::new()
            }
        };

        write_listing(&mut self.writer, &names).await?;
        self.writer.flush().await?;
        tracing::debug!(peer = %self.peer, entries = names.len(), "listing sent");
        Ok(())
    }

    async fn handle_get(&mut self, name: &str) -> Result<(), ServerError> {
        let path = self.root.resolve(name)?;

        let opened = match self.root.open_file(&path).await {
            Ok(opened) => opened,
            Err(e) => {
                tracing::warn!(peer = %self.peer, file = name, "failed to open file: {e}");
                None
            }
        };

        let Some((mut file, size)) = opened else {
            write_file_size(&mut self.writer, 0).await?;
            self.writer.flush().await?;
            tracing::debug!(peer = %self.peer, file = name, "requested file not found");
            return Ok(());
        };

        write_file_size(&mut self.writer, size).await?;

        let mut remaining = size;
        while remaining > 0 {
            let to_read = remaining.min(self.buf.len() as u64) as usize;
            let n = file.read(&mut self.buf[..to_read]).await?;
            if n == 0 {
                return Err(ServerError::SourceTruncated {
                    name: name.to_owned(),
                    expected: size,
                    sent: size - remaining,
                });
            }
            self.writer.write_all(&self.buf[..n]).await?;
            remaining -= n as u64;
            self.summary.bytes_sent += n as u64;
        }
        self.writer.flush().await?;

        tracing::debug!(peer = %self.peer, file = name, size, "file sent");
        Ok(())
    }

    async fn handle_put(&mut self, name: &str, size: u64) -> Result<(), ServerError> {
        let target = self.root.resolve(name)?;

        // Without a staging file the payload is still drained so the next
        // command starts on a frame boundary.
        let mut staging = match self.root.create_staging().await {
            Ok(staging) => Some(staging),
            Err(e) => {
                tracing::warn!(peer = %self.peer, file = name, "cannot create staging file: {e}");
                None
            }
        };

        let mut remaining = size;
        while remaining > 0 {
            let to_read = remaining.min(self.buf.len() as u64) as usize;
            let n = with_timeout(
                self.read_timeout,
                self.reader.read(&mut self.buf[..to_read]),
            )
            .await?;

            if n == 0 {
                let received = size - remaining;
                if let Some(staging) = staging.take() {
                    if let Err(e) = staging.discard().await {
                        tracing::warn!(peer = %self.peer, file = name, "failed to discard staging file: {e}");
                    }
                }
                tracing::warn!(
                    peer = %self.peer,
                    file = name,
                    expected = size,
                    received,
                    "peer closed during upload; staging file discarded"
                );
                return Err(ServerError::IncompleteUpload {
                    name: name.to_owned(),
                    expected: size,
                    received,
                });
            }

            let write_error = match staging.as_mut() {
                Some(file) => file.write_chunk(&self.buf[..n]).await.err(),
                None => None,
            };
            if let Some(e) = write_error {
                tracing::warn!(peer = %self.peer, file = name, "staging write failed: {e}");
                // Dropping the handle removes the partial file.
                staging = None;
            }

            remaining -= n as u64;
            self.summary.bytes_received += n as u64;
        }

        let status = match staging {
            None => PutStatus::Failed,
            Some(staging) => match self.root.promote(staging, &target).await {
                Ok(()) => PutStatus::Success,
                Err(e) => {
                    tracing::warn!(peer = %self.peer, file = name, "failed to move upload into place: {e}");
                    PutStatus::Failed
                }
            },
        };

        write_status(&mut self.writer, status).await?;
        self.writer.flush().await?;

        tracing::info!(peer = %self.peer, file = name, size, status = status.as_str(), "upload finished");
        Ok(())
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            tracing::trace!(peer = %self.peer, from = ?self.state, to = ?next, "session state");
            self.state = next;
        }
    }
}

/// Awaits `fut`, failing with [`ServerError::Timeout`] if `limit` elapses first.
async fn with_timeout<T, E, F>(limit: Option<Duration>, fut: F) -> Result<T, ServerError>
where
    F: Future<Output = Result<T, E>>,
    ServerError: From<E>,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ServerError::Timeout),
        },
        None => Ok(fut.await?),
    }
}
