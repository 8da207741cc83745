//! memcached binary protocol codec (magic `0x80`/`0x81`).
//!
//! Header layout and opcode/status constants are in `wire`. This module
//! only assembles/parses frames; it knows nothing about chunking.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::CodecError;
use crate::model::{Item, Request, Response, StoreOp};
use crate::wire::{opcode, status, validate_key, BinaryHeader, BINARY_REQUEST_MAGIC, BINARY_RESPONSE_MAGIC};

/// Read and parse exactly one binary request frame.
pub async fn read_request<R>(reader: &mut R) -> Result<Request, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; BinaryHeader::SIZE];
    match reader.read_exact(&mut header_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(CodecError::ConnectionClosed)
        }
        Err(e) => return Err(CodecError::Io(e)),
    }
    let header = BinaryHeader::from_bytes(&header_buf);

    if header.magic != BINARY_REQUEST_MAGIC {
        return Err(CodecError::MalformedRequest(format!(
            "bad request magic 0x{:02x}",
            header.magic
        )));
    }

    let key_len = header.key_len as usize;
    let extra_len = header.extra_len as usize;
    let total_body_len = header.total_body_len as usize;
    if extra_len + key_len > total_body_len {
        return Err(CodecError::MalformedRequest(
            "extras+key exceed body length".into(),
        ));
    }
    let value_len = total_body_len - extra_len - key_len;

    let mut extras = vec![0u8; extra_len];
    reader.read_exact(&mut extras).await?;
    let mut key = vec![0u8; key_len];
    reader.read_exact(&mut key).await?;
    let mut value = vec![0u8; value_len];
    reader.read_exact(&mut value).await?;

    if key_len > 0 && !validate_key(&key) {
        return Err(CodecError::MalformedRequest("bad key".into()));
    }

    let opaque = header.opaque;
    let key = Bytes::from(key);
    let value = Bytes::from(value);

    match header.opcode {
        opcode::SET | opcode::ADD | opcode::REPLACE => {
            if extras.len() != 8 {
                return Err(CodecError::MalformedRequest("store extras must be 8 bytes".into()));
            }
            let flags = u32::from_be_bytes(extras[0..4].try_into().unwrap());
            let exptime = u32::from_be_bytes(extras[4..8].try_into().unwrap());
            let op = match header.opcode {
                opcode::SET => StoreOp::Set,
                opcode::ADD => StoreOp::Add,
                _ => StoreOp::Replace,
            };
            Ok(Request::Store { op, key, flags, exptime, value, opaque, quiet: false })
        }
        opcode::GET | opcode::GETK => Ok(Request::Get { keys: vec![key], opaque, quiet: false }),
        opcode::GETQ | opcode::GETKQ => Ok(Request::Get { keys: vec![key], opaque, quiet: true }),
        opcode::GAT => {
            if extras.len() != 4 {
                return Err(CodecError::MalformedRequest("gat extras must be 4 bytes".into()));
            }
            let exptime = u32::from_be_bytes(extras[0..4].try_into().unwrap());
            Ok(Request::Gat { keys: vec![key], exptime, opaque })
        }
        opcode::TOUCH => {
            if extras.len() != 4 {
                return Err(CodecError::MalformedRequest("touch extras must be 4 bytes".into()));
            }
            let exptime = u32::from_be_bytes(extras[0..4].try_into().unwrap());
            Ok(Request::Touch { key, exptime, opaque, quiet: false })
        }
        opcode::DELETE => Ok(Request::Delete { key, opaque, quiet: false }),
        opcode::QUIT | opcode::QUITQ => Ok(Request::Quit { opaque }),
        opcode::VERSION => Ok(Request::Version { opaque }),
        opcode::NOOP => Ok(Request::Noop { opaque }),
        other => Err(CodecError::MalformedRequest(format!("unknown opcode 0x{other:02x}"))),
    }
}

/// Serialize one response frame for the given request opcode/opaque.
pub async fn write_response<W>(
    writer: &mut W,
    opcode: u8,
    opaque: u32,
    resp: &Response,
) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let (status_code, extras, key, value): (u16, Vec<u8>, Vec<u8>, Vec<u8>) = match resp {
        Response::Stored | Response::Deleted | Response::Touched | Response::Ok => {
            (status::NO_ERROR, vec![], vec![], vec![])
        }
        Response::Value(Item { key, flags, value }) => {
            let mut extras = Vec::with_capacity(4);
            extras.extend_from_slice(&flags.to_be_bytes());
            (status::NO_ERROR, extras, key.to_vec(), value.to_vec())
        }
        Response::End => (status::NO_ERROR, vec![], vec![], vec![]),
        Response::NotFound => (status::KEY_NOT_FOUND, vec![], vec![], vec![]),
        Response::Exists => (status::KEY_EXISTS, vec![], vec![], vec![]),
        Response::NotStored => (status::ITEM_NOT_STORED, vec![], vec![], vec![]),
        Response::Version(v) => (status::NO_ERROR, vec![], vec![], v.clone().into_bytes()),
        Response::ClientError(msg) => (status::INVALID_ARGUMENTS, vec![], vec![], msg.clone().into_bytes()),
        Response::ServerError(msg) => (status::INTERNAL_ERROR, vec![], vec![], msg.clone().into_bytes()),
        Response::Error => (status::UNKNOWN_COMMAND, vec![], vec![], b"Unknown command".to_vec()),
    };

    let body_len = extras.len() + key.len() + value.len();
    let header = BinaryHeader {
        magic: BINARY_RESPONSE_MAGIC,
        opcode,
        key_len: key.len() as u16,
        extra_len: extras.len() as u8,
        data_type: 0,
        status: status_code,
        total_body_len: body_len as u32,
        opaque,
        cas: 0,
    };

    writer.write_all(&header.to_bytes()).await?;
    writer.write_all(&extras).await?;
    writer.write_all(&key).await?;
    writer.write_all(&value).await?;
    Ok(())
}
