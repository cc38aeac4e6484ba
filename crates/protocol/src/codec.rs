//! Request and response encoding.
//!
//! ```text
//! LIST  (C -> S): [1: 0x01]
//!       (S -> C): [4 BE: len][len: UTF-8 names joined by '\n']
//!
//! GET   (C -> S): [1: 0x02][4 BE: name_len][name_len: name]
//!       (S -> C): [8 BE: size][size: file bytes]      size 0 = not found
//!
//! PUT   (C -> S): [1: 0x03][4 BE: name_len][name_len: name][8 BE: size][size: bytes]
//!       (S -> C): [4 BE: len][len: "UPLOAD_SUCCESS" | "UPLOAD_FAILED"]
//!
//! BYE   (C -> S): [1: 0x04]                           no response
//! ```
//!
//! PUT payload bytes are not part of [`Request`]; the caller streams them
//! after writing (or reading) the request header.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::command::Command;
use crate::error::ProtocolError;
use crate::wire::{read_frame, read_size, write_frame, write_size};
use crate::{MAX_LISTING_LEN, MAX_NAME_LEN};

/// Status text sent after a completed upload.
pub const UPLOAD_SUCCESS: &str = "UPLOAD_SUCCESS";

/// Status text sent after an upload the server could not store.
pub const UPLOAD_FAILED: &str = "UPLOAD_FAILED";

/// A decoded request header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    List,
    Get { name: String },
    /// `size` payload bytes follow the header on the stream.
    Put { name: String, size: u64 },
    Bye,
}

impl Request {
    /// Command code of the request.
    pub fn command(&self) -> Command {
        match self {
            Request::List => Command::List,
            Request::Get { .. } => Command::Get,
            Request::Put { .. } => Command::Put,
            Request::Bye => Command::Bye,
        }
    }
}

/// Outcome of a PUT as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Success,
    Failed,
}

impl PutStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PutStatus::Success => UPLOAD_SUCCESS,
            PutStatus::Failed => UPLOAD_FAILED,
        }
    }
}

/// Reads the next request header.
///
/// Returns `None` if the peer closed the connection cleanly before sending
/// a command byte. EOF anywhere after the command byte is a
/// [`ProtocolError::Truncated`].
pub async fn read_request<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Request>, ProtocolError> {
    let mut code = [0u8; 1];
    if reader.read(&mut code).await? == 0 {
        return Ok(None);
    }

    let request = match Command::try_from(code[0])? {
        Command::List => Request::List,
        Command::Bye => Request::Bye,
        Command::Get => Request::Get {
            name: read_name(reader).await?,
        },
        Command::Put => {
            let name = read_name(reader).await?;
            let size = read_size(reader).await?;
            Request::Put { name, size }
        }
    };
    Ok(Some(request))
}

/// Writes a request header. For PUT the caller writes the payload next.
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    request: &Request,
) -> Result<(), ProtocolError> {
    writer.write_u8(request.command().code()).await?;
    match request {
        Request::List | Request::Bye => {}
        Request::Get { name } => write_name(writer, name).await?,
        Request::Put { name, size } => {
            write_name(writer, name).await?;
            write_size(writer, *size).await?;
        }
    }
    Ok(())
}

async fn read_name<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, ProtocolError> {
    let bytes = read_frame(reader, MAX_NAME_LEN, "file name").await?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::InvalidName(format!("invalid UTF-8: {e}")))
}

async fn write_name<W: AsyncWrite + Unpin>(writer: &mut W, name: &str) -> Result<(), ProtocolError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::TooLong {
            what: "file name",
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    write_frame(writer, name.as_bytes(), "file name").await
}

/// Writes a LIST response: names joined by `'\n'`, no trailing newline.
pub async fn write_listing<W: AsyncWrite + Unpin, S: AsRef<str>>(
    writer: &mut W,
    names: &[S],
) -> Result<(), ProtocolError> {
    let text = names
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    write_frame(writer, text.as_bytes(), "listing").await
}

/// Reads a LIST response. An empty frame decodes to no entries.
pub async fn read_listing<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<String>, ProtocolError> {
    let bytes = read_frame(reader, MAX_LISTING_LEN, "listing").await?;
    let text = String::from_utf8(bytes)
        .map_err(|e| ProtocolError::InvalidName(format!("listing is not UTF-8: {e}")))?;
    if text.is_empty() {
        return Ok(Vec::new());
    }
    Ok(text.split('\n').map(str::to_owned).collect())
}

/// Writes the 8-byte GET response header (0 = not found).
pub async fn write_file_size<W: AsyncWrite + Unpin>(
    writer: &mut W,
    size: u64,
) -> Result<(), ProtocolError> {
    write_size(writer, size).await
}

/// Reads the 8-byte GET response header.
pub async fn read_file_size<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, ProtocolError> {
    read_size(reader).await
}

/// Writes a PUT status frame.
pub async fn write_status<W: AsyncWrite + Unpin>(
    writer: &mut W,
    status: PutStatus,
) -> Result<(), ProtocolError> {
    write_frame(writer, status.as_str().as_bytes(), "status").await
}

/// Reads a PUT status frame. Text other than the two known statuses is an
/// [`ProtocolError::UnexpectedStatus`].
pub async fn read_status<R: AsyncRead + Unpin>(reader: &mut R) -> Result<PutStatus, ProtocolError> {
    let bytes = read_frame(reader, 256, "status").await?;
    match bytes.as_slice() {
        b"UPLOAD_SUCCESS" => Ok(PutStatus::Success),
        b"UPLOAD_FAILED" => Ok(PutStatus::Failed),
        other => Err(ProtocolError::UnexpectedStatus(
            String::from_utf8_lossy(other).into_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn encode(request: &Request) -> Vec<u8> {
        let mut buf = Vec::new();
        write_request(&mut buf, request).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn get_request_layout() {
        let buf = encode(&Request::Get {
            name: "notes.txt".into(),
        })
        .await;
        assert_eq!(buf[0], 2);
        assert_eq!(&buf[1..5], &9u32.to_be_bytes());
        assert_eq!(&buf[5..], b"notes.txt");
    }

    #[tokio::test]
    async fn put_header_then_payload_left_on_stream() {
        let mut buf = encode(&Request::Put {
            name: "copy.txt".into(),
            size: 3,
        })
        .await;
        buf.extend_from_slice(b"abc");

        let mut cursor = &buf[..];
        let request = read_request(&mut cursor).await.unwrap().unwrap();
        assert_eq!(
            request,
            Request::Put {
                name: "copy.txt".into(),
                size: 3
            }
        );
        assert_eq!(cursor, b"abc");
    }

    #[tokio::test]
    async fn consecutive_requests_decode_in_order() {
        let mut buf = encode(&Request::List).await;
        buf.extend(encode(&Request::Get { name: "a".into() }).await);
        buf.extend(encode(&Request::Bye).await);

        let mut cursor = &buf[..];
        assert_eq!(read_request(&mut cursor).await.unwrap(), Some(Request::List));
        assert_eq!(
            read_request(&mut cursor).await.unwrap(),
            Some(Request::Get { name: "a".into() })
        );
        assert_eq!(read_request(&mut cursor).await.unwrap(), Some(Request::Bye));
        assert_eq!(read_request(&mut cursor).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clean_eof_is_none() {
        let mut cursor: &[u8] = &[];
        assert!(read_request(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_command_rejected() {
        let mut cursor: &[u8] = &[9];
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownCommand(9)));
    }

    #[tokio::test]
    async fn truncated_name_is_fatal() {
        let mut cursor: &[u8] = &[2, 0, 0, 0, 8, b'a', b'b'];
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated { what: "file name", .. }));
    }

    #[tokio::test]
    async fn put_missing_size_is_fatal() {
        let mut cursor: &[u8] = &[3, 0, 0, 0, 1, b'a', 0, 0, 0];
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::Truncated {
                what: "file size",
                expected: 8,
                received: 3
            }
        ));
    }

    #[tokio::test]
    async fn non_utf8_name_rejected() {
        let mut cursor: &[u8] = &[2, 0, 0, 0, 2, 0xff, 0xfe];
        let err = read_request(&mut cursor).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidName(_)));
    }

    #[tokio::test]
    async fn listing_empty_and_populated() {
        let mut buf = Vec::new();
        write_listing::<_, &str>(&mut buf, &[]).await.unwrap();
        assert_eq!(buf, [0, 0, 0, 0]);
        let mut cursor = &buf[..];
        assert!(read_listing(&mut cursor).await.unwrap().is_empty());

        let mut buf = Vec::new();
        write_listing(&mut buf, &["a.txt", "notes.txt"]).await.unwrap();
        assert_eq!(&buf[4..], b"a.txt\nnotes.txt");
        let mut cursor = &buf[..];
        assert_eq!(
            read_listing(&mut cursor).await.unwrap(),
            vec!["a.txt".to_string(), "notes.txt".to_string()]
        );
    }

    #[tokio::test]
    async fn status_frames() {
        let mut buf = Vec::new();
        write_status(&mut buf, PutStatus::Success).await.unwrap();
        write_status(&mut buf, PutStatus::Failed).await.unwrap();
        assert_eq!(&buf[..4], &14u32.to_be_bytes());

        let mut cursor = &buf[..];
        assert_eq!(read_status(&mut cursor).await.unwrap(), PutStatus::Success);
        assert_eq!(read_status(&mut cursor).await.unwrap(), PutStatus::Failed);
    }

    #[tokio::test]
    async fn unexpected_status_rejected() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"FILE_NOT_FOUND", "status").await.unwrap();
        let mut cursor = &buf[..];
        assert!(matches!(
            read_status(&mut cursor).await,
            Err(ProtocolError::UnexpectedStatus(s)) if s == "FILE_NOT_FOUND"
        ));
    }

    #[tokio::test]
    async fn name_too_long_rejected_on_write() {
        let name = "a".repeat(MAX_NAME_LEN + 1);
        let mut buf = Vec::new();
        let result = write_request(&mut buf, &Request::Get { name }).await;
        assert!(matches!(result, Err(ProtocolError::TooLong { .. })));
    }
}
