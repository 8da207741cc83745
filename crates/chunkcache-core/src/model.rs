//! The abstract request/response vocabulary both wire codecs parse into and
//! serialize out of. Neither codec's parser knows about chunking — they
//! only know memcached's wire grammar.

use bytes::Bytes;

/// A storage verb: SET, ADD, and REPLACE share an identical wire shape and
/// differ only in backend semantics ("always write" vs "only if absent" vs
/// "only if present").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Set,
    Add,
    Replace,
}

/// A parsed client request, independent of which wire protocol produced it.
#[derive(Debug, Clone)]
pub enum Request {
    Store {
        op: StoreOp,
        key: Bytes,
        flags: u32,
        exptime: u32,
        value: Bytes,
        /// Binary protocol only: opaque request id echoed back in the reply.
        opaque: u32,
        /// If true, no reply is sent on success (binary quiet ops / text `noreply`).
        quiet: bool,
    },
    Get {
        keys: Vec<Bytes>,
        opaque: u32,
        /// Binary GETQ/GETKQ: suppress the reply entirely on a miss.
        quiet: bool,
    },
    /// Get-and-touch. Binary GAT carries exactly one key; text `gat` takes
    /// `<exptime> <key>*` and reuses the same batched-GET reply shape.
    Gat {
        keys: Vec<Bytes>,
        exptime: u32,
        opaque: u32,
    },
    Delete {
        key: Bytes,
        opaque: u32,
        quiet: bool,
    },
    Touch {
        key: Bytes,
        exptime: u32,
        opaque: u32,
        quiet: bool,
    },
    Quit {
        opaque: u32,
    },
    Version {
        opaque: u32,
    },
    /// Binary-only no-op, used to terminate a quiet-get pipeline.
    Noop {
        opaque: u32,
    },
}

/// A value returned to the client: key, client-opaque flags, and payload.
#[derive(Debug, Clone)]
pub struct Item {
    pub key: Bytes,
    pub flags: u32,
    pub value: Bytes,
}

/// A response to a single logical request. One `Request::Get` with N keys
/// produces N `Response::Value` plus one terminating `Response::End`.
#[derive(Debug, Clone)]
pub enum Response {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Value(Item),
    End,
    Deleted,
    Touched,
    Version(String),
    Ok,
    /// Client sent something syntactically broken; connection stays open
    /// unless the codec decides otherwise.
    ClientError(String),
    /// Backend/transport failure; a short, non-leaking diagnostic.
    ServerError(String),
    /// Unrecognized command.
    Error,
}
