//! Exact-length transport primitives.
//!
//! ```text
//! FRAME:  [4 bytes BE: len][len bytes]
//! SIZE:   [8 bytes BE: file_size]
//! ```
//!
//! Every read loops until the requested length is satisfied or the peer
//! closes. A short read is reported, never padded or retried.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;

/// Reads into `buf` until it is full or the peer closes.
///
/// Returns the number of bytes read. A value smaller than `buf.len()` means
/// the stream hit EOF first.
pub async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Reads exactly `N` bytes into an array, failing on truncation.
pub async fn read_array<R: AsyncRead + Unpin, const N: usize>(
    reader: &mut R,
    what: &'static str,
) -> Result<[u8; N], ProtocolError> {
    let mut buf = [0u8; N];
    let received = read_full(reader, &mut buf).await?;
    if received < N {
        return Err(ProtocolError::Truncated {
            what,
            expected: N,
            received,
        });
    }
    Ok(buf)
}

/// Reads exactly `len` bytes, failing on truncation.
pub async fn read_exact_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    len: usize,
    what: &'static str,
) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = vec![0u8; len];
    let received = read_full(reader, &mut buf).await?;
    if received < len {
        return Err(ProtocolError::Truncated {
            what,
            expected: len,
            received,
        });
    }
    Ok(buf)
}

/// Reads a 4-byte length prefix followed by that many bytes.
///
/// Lengths above `max` are rejected before any allocation.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max: usize,
    what: &'static str,
) -> Result<Vec<u8>, ProtocolError> {
    let len = u32::from_be_bytes(read_array::<_, 4>(reader, what).await?) as usize;
    if len > max {
        return Err(ProtocolError::TooLong { what, len, max });
    }
    read_exact_frame(reader, len, what).await
}

/// Writes a 4-byte length prefix followed by `payload`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    what: &'static str,
) -> Result<(), ProtocolError> {
    let len = u32::try_from(payload.len()).map_err(|_| ProtocolError::TooLong {
        what,
        len: payload.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_u32(len).await?;
    writer.write_all(payload).await?;
    Ok(())
}

/// Reads an 8-byte big-endian size field.
pub async fn read_size<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, ProtocolError> {
    Ok(u64::from_be_bytes(
        read_array::<_, 8>(reader, "file size").await?,
    ))
}

/// Writes an 8-byte big-endian size field.
pub async fn write_size<W: AsyncWrite + Unpin>(
    writer: &mut W,
    size: u64,
) -> Result<(), ProtocolError> {
    writer.write_u64(size).await?;
    Ok(())
}
