use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use fileshare_protocol::codec::{read_file_size, read_listing, read_status, write_request};
use fileshare_protocol::{CHUNK_SIZE, ProtocolError, PutStatus, Request};
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::{TCP_BUFFER_SIZE, TCP_CONNECT_TIMEOUT};

/// A connection to a fileshare server.
///
/// Operations take `&mut self`, so requests on one connection are strictly
/// sequential. Open several clients for parallel transfers.
pub struct Client<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    timeout: Option<Duration>,
    buf: Vec<u8>,
}

impl Client<TcpStream> {
    /// Connects to a server's TCP port.
    pub async fn connect(addr: SocketAddr) -> Result<Self, ClientError> {
        let stream = match tokio::time::timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect(addr)).await
        {
            Ok(Ok(s)) => s,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ClientError::Timeout),
        };
        stream.set_nodelay(true)?;
        info!(%addr, "connected to file server");
        Ok(Self::new(stream))
    }
}

impl<S: AsyncRead + AsyncWrite> Client<S> {
    /// Wraps an already-connected stream.
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::with_capacity(TCP_BUFFER_SIZE, reader),
            writer: BufWriter::with_capacity(TCP_BUFFER_SIZE, writer),
            timeout: None,
            buf: vec![0u8; CHUNK_SIZE],
        }
    }

    /// Sets a deadline applied to each whole operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Lists the names of the files in the server's shared directory.
    pub async fn list(&mut self) -> Result<Vec<String>, ClientError> {
        let limit = self.timeout;
        with_timeout(limit, self.list_inner()).await
    }

    /// Downloads `name` into memory.
    ///
    /// Returns `None` when the server reports size 0, which covers both a
    /// missing file and an empty one.
    pub async fn get(&mut self, name: &str) -> Result<Option<Vec<u8>>, ClientError> {
        let mut data = Vec::new();
        let size = self.get_to_writer(name, &mut data).await?;
        Ok((size > 0).then_some(data))
    }

    /// Streams `name` into `out`, returning the number of bytes written.
    pub async fn get_to_writer<W: AsyncWrite + Unpin>(
        &mut self,
        name: &str,
        out: &mut W,
    ) -> Result<u64, ClientError> {
        let limit = self.timeout;
        with_timeout(limit, self.get_inner(name, out)).await
    }

    /// Uploads `data` as `name`.
    pub async fn put(&mut self, name: &str, data: &[u8]) -> Result<(), ClientError> {
        self.put_from_reader(name, data.len() as u64, data).await
    }

    /// Uploads exactly `size` bytes read from `source` as `name`.
    ///
    /// Fails with [`ClientError::UploadFailed`] if the server could not
    /// store the file; the connection stays usable in that case.
    pub async fn put_from_reader<R: AsyncRead + Unpin>(
        &mut self,
        name: &str,
        size: u64,
        source: R,
    ) -> Result<(), ClientError> {
        let limit = self.timeout;
        with_timeout(limit, self.put_inner(name, size, source)).await
    }

    /// Says goodbye and closes the connection.
    pub async fn bye(mut self) -> Result<(), ClientError> {
        write_request(&mut self.writer, &Request::Bye).await?;
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        debug!("session closed with BYE");
        Ok(())
    }

    async fn list_inner(&mut self) -> Result<Vec<String>, ClientError> {
        write_request(&mut self.writer, &Request::List).await?;
        self.writer.flush().await?;
        let names = read_listing(&mut self.reader).await?;
        debug!(count = names.len(), "listing received");
        Ok(names)
    }

    async fn get_inner<W: AsyncWrite + Unpin>(
        &mut self,
        name: &str,
        out: &mut W,
    ) -> Result<u64, ClientError> {
        write_request(&mut self.writer, &Request::Get { name: name.into() }).await?;
        self.writer.flush().await?;

        let size = read_file_size(&mut self.reader).await?;
        let mut remaining = size;
        while remaining > 0 {
            let to_read = remaining.min(self.buf.len() as u64) as usize;
            let n = self.reader.read(&mut self.buf[..to_read]).await?;
            if n == 0 {
                return Err(ProtocolError::Truncated {
                    what: "file payload",
                    expected: size as usize,
                    received: (size - remaining) as usize,
                }
                .into());
            }
            out.write_all(&self.buf[..n]).await?;
            remaining -= n as u64;
        }
        out.flush().await?;

        debug!(file = name, size, "download finished");
        Ok(size)
    }

    async fn put_inner<R: AsyncRead + Unpin>(
        &mut self,
        name: &str,
        size: u64,
        mut source: R,
    ) -> Result<(), ClientError> {
        let request = Request::Put {
            name: name.into(),
            size,
        };
        write_request(&mut self.writer, &request).await?;

        let mut remaining = size;
        while remaining > 0 {
            let to_read = remaining.min(self.buf.len() as u64) as usize;
            let n = source.read(&mut self.buf[..to_read]).await?;
            if n == 0 {
                return Err(ClientError::SizeMismatch {
                    name: name.into(),
                    expected: size,
                    actual: size - remaining,
                });
            }
            self.writer.write_all(&self.buf[..n]).await?;
            remaining -= n as u64;
        }
        self.writer.flush().await?;

        match read_status(&mut self.reader).await? {
            PutStatus::Success => {
                debug!(file = name, size, "upload stored");
                Ok(())
            }
            PutStatus::Failed => Err(ClientError::UploadFailed(name.into())),
        }
    }
}

async fn with_timeout<T, F>(limit: Option<Duration>, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => fut.await,
    }
}
