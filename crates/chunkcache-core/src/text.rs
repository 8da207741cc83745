//! memcached text protocol codec.
//!
//! Parses one line (plus, for storage commands, one data block) into a
//! `Request`, and serializes a `Response` back into memcached's line-based
//! reply grammar. Knows nothing about chunking — see `chunkcache-engine`.

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::CodecError;
use crate::model::{Item, Request, Response, StoreOp};
use crate::wire::validate_key;

const CRLF: &[u8] = b"\r\n";

/// Read and parse one request from the stream. Storage commands consume
/// their trailing data block + CRLF as part of the same call.
pub async fn read_request<R>(reader: &mut BufReader<R>) -> Result<Request, CodecError>
where
    R: AsyncRead + Unpin,
{
    let line = read_line(reader).await?;
    let mut parts = line.split(|&b| b == b' ').filter(|p| !p.is_empty());

    let cmd = parts
        .next()
        .ok_or_else(|| CodecError::MalformedRequest("empty command line".into()))?;

    match cmd {
        b"set" | b"add" | b"replace" => {
            let op = match cmd {
                b"set" => StoreOp::Set,
                b"add" => StoreOp::Add,
                _ => StoreOp::Replace,
            };
            parse_storage(reader, parts, op).await
        }
        b"get" | b"gets" => {
            let keys: Vec<Bytes> = parts.map(|k| Bytes::copy_from_slice(k)).collect();
            if keys.is_empty() {
                return Err(CodecError::MalformedRequest("get with no keys".into()));
            }
            for k in &keys {
                if !validate_key(k) {
                    return Err(CodecError::MalformedRequest("bad key".into()));
                }
            }
            Ok(Request::Get { keys, opaque: 0, quiet: false })
        }
        b"gat" => {
            let exptime = parse_u32(parts.next(), "exptime")?;
            let keys: Vec<Bytes> = parts.map(|k| Bytes::copy_from_slice(k)).collect();
            if keys.is_empty() {
                return Err(CodecError::MalformedRequest("gat missing key".into()));
            }
            for k in &keys {
                if !validate_key(k) {
                    return Err(CodecError::MalformedRequest("bad key".into()));
                }
            }
            Ok(Request::Gat { keys, exptime, opaque: 0 })
        }
        b"delete" => {
            let key = parts
                .next()
                .ok_or_else(|| CodecError::MalformedRequest("delete missing key".into()))?;
            if !validate_key(key) {
                return Err(CodecError::MalformedRequest("bad key".into()));
            }
            let quiet = parts.next() == Some(b"noreply");
            Ok(Request::Delete {
                key: Bytes::copy_from_slice(key),
                opaque: 0,
                quiet,
            })
        }
        b"touch" => {
            let key = parts
                .next()
                .ok_or_else(|| CodecError::MalformedRequest("touch missing key".into()))?;
            if !validate_key(key) {
                return Err(CodecError::MalformedRequest("bad key".into()));
            }
            let exptime = parse_u32(parts.next(), "exptime")?;
            let quiet = parts.next() == Some(b"noreply");
            Ok(Request::Touch {
                key: Bytes::copy_from_slice(key),
                exptime,
                opaque: 0,
                quiet,
            })
        }
        b"quit" => Ok(Request::Quit { opaque: 0 }),
        b"version" => Ok(Request::Version { opaque: 0 }),
        other => Err(CodecError::MalformedRequest(format!(
            "unknown command {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

async fn parse_storage<'a, R, I>(
    reader: &mut BufReader<R>,
    mut parts: I,
    op: StoreOp,
) -> Result<Request, CodecError>
where
    R: AsyncRead + Unpin,
    I: Iterator<Item = &'a [u8]>,
{
    let key = parts
        .next()
        .ok_or_else(|| CodecError::MalformedRequest("storage command missing key".into()))?;
    if !validate_key(key) {
        return Err(CodecError::MalformedRequest("bad key".into()));
    }
    let flags = parse_u32(parts.next(), "flags")?;
    let exptime = parse_u32(parts.next(), "exptime")?;
    let bytes_len = parse_u32(parts.next(), "bytes")? as usize;
    let quiet = parts.next() == Some(b"noreply");

    if bytes_len > crate::wire::MAX_VALUE_LEN {
        return Err(CodecError::MalformedRequest("value too large".into()));
    }

    let mut data = vec![0u8; bytes_len];
    tokio::io::AsyncReadExt::read_exact(reader, &mut data).await?;
    let mut trailer = [0u8; 2];
    tokio::io::AsyncReadExt::read_exact(reader, &mut trailer).await?;
    if trailer != *CRLF {
        return Err(CodecError::MalformedRequest(
            "storage command missing trailing CRLF".into(),
        ));
    }

    Ok(Request::Store {
        op,
        key: Bytes::copy_from_slice(key),
        flags,
        exptime,
        value: Bytes::from(data),
        opaque: 0,
        quiet,
    })
}

fn parse_u32(field: Option<&[u8]>, name: &str) -> Result<u32, CodecError> {
    let field = field.ok_or_else(|| CodecError::MalformedRequest(format!("missing {name}")))?;
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| CodecError::MalformedRequest(format!("bad {name}")))
}

async fn read_line<R>(reader: &mut BufReader<R>) -> Result<Vec<u8>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Err(CodecError::ConnectionClosed);
    }
    while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(line)
}

/// Write one response line (and, for `Value`, its data block) to the stream.
/// Does not flush — callers flush once per logical request after writing
/// all of its responses (possibly several, for a batched GET).
pub async fn write_response<W>(writer: &mut W, resp: &Response) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    match resp {
        Response::Stored => writer.write_all(b"STORED\r\n").await?,
        Response::NotStored => writer.write_all(b"NOT_STORED\r\n").await?,
        Response::Exists => writer.write_all(b"EXISTS\r\n").await?,
        Response::NotFound => writer.write_all(b"NOT_FOUND\r\n").await?,
        Response::Value(Item { key, flags, value }) => {
            writer
                .write_all(
                    format!("VALUE {} {} {}\r\n", String::from_utf8_lossy(key), flags, value.len())
                        .as_bytes(),
                )
                .await?;
            writer.write_all(value).await?;
            writer.write_all(CRLF).await?;
        }
        Response::End => writer.write_all(b"END\r\n").await?,
        Response::Deleted => writer.write_all(b"DELETED\r\n").await?,
        Response::Touched => writer.write_all(b"TOUCHED\r\n").await?,
        Response::Version(v) => writer.write_all(format!("VERSION {v}\r\n").as_bytes()).await?,
        Response::Ok => writer.write_all(b"OK\r\n").await?,
        Response::ClientError(msg) => {
            writer.write_all(format!("CLIENT_ERROR {msg}\r\n").as_bytes()).await?
        }
        Response::ServerError(msg) => {
            writer.write_all(format!("SERVER_ERROR {msg}\r\n").as_bytes()).await?
        }
        Response::Error => writer.write_all(b"ERROR\r\n").await?,
    }
    Ok(())
}
