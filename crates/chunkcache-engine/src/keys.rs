//! Derived-key scheme (§3). `meta(k) = k || "_meta"`,
//! `chunk(k, i) = k || "_" || decimal(i)`.
//!
//! This scheme is part of the persisted format; once an installation has
//! written chunked items it cannot change without orphaning them. There is
//! deliberately no trait/pluggability here — the spec says as much.

use bytes::Bytes;

pub fn meta_key(key: &[u8]) -> Bytes {
    let mut out = Vec::with_capacity(key.len() + 5);
    out.extend_from_slice(key);
    out.extend_from_slice(b"_meta");
    Bytes::from(out)
}

pub fn chunk_key(key: &[u8], index: i32) -> Bytes {
    let mut out = Vec::with_capacity(key.len() + 1 + 10);
    out.extend_from_slice(key);
    out.push(b'_');
    out.extend_from_slice(index.to_string().as_bytes());
    Bytes::from(out)
}
