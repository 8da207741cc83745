//! Error taxonomy for wire codecs.
//!
//! Mirrors `summit_core::wire::WireError`'s shape (a small `thiserror` enum
//! with one variant per distinct failure the receiver must react to
//! differently) but for memcached's text/binary grammars instead of
//! Summit's Noise handshake frames.

use thiserror::Error;

/// Which wire protocol a connection was bound to after the first-byte peek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolKind {
    Text,
    Binary,
}

/// Errors a codec can raise while parsing a request or serializing a response.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Syntactically broken request. Unrecoverable on the current connection
    /// per §4.A — the caller replies `CLIENT_ERROR` (or binary equivalent)
    /// and closes.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    /// Underlying read/write failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Clean EOF on read — not an error condition, just a signal to stop.
    #[error("connection closed")]
    ConnectionClosed,
}
