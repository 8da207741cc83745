//! Chunking engine (component C, §4.C): translates one logical operation
//! into a bounded fan-out against a single `BackendHandler`. This is the
//! component that owns the metadata/chunk invariants — write order, delete
//! order, token coherence, and length truncation on read.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use chunkcache_core::wire::MetaRecord;
use chunkcache_core::token::TokenSource;

use crate::backend::{BackendError, BackendHandler, DeleteResult, GetResult, StoreResult, TouchResult};
use crate::keys::{chunk_key, meta_key};
use crate::metrics::Metrics;

#[derive(Debug, Error)]
pub enum ChunkingError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkSetResult {
    Stored,
    NotStored,
    Exists,
}

#[derive(Debug, Clone)]
pub enum ChunkGetResult {
    Hit { flags: u32, value: Bytes },
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkDeleteResult {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkTouchResult {
    Touched,
    NotFound,
}

/// Drives the §4.C algorithms against one backend handler and one fixed,
/// installation-wide chunk size. Holds no state of its own beyond the token
/// source, so it is cheap to construct per orchestrator tier.
pub struct ChunkingEngine {
    chunk_size: u32,
    tokens: TokenSource,
    metrics: Arc<Metrics>,
}

impl ChunkingEngine {
    pub fn new(chunk_size: u32, metrics: Arc<Metrics>) -> Self {
        Self { chunk_size, tokens: TokenSource::new(), metrics }
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// §7 `InvariantViolation`: metadata decoded cleanly but its own fields
    /// are inconsistent -- claims fewer bytes of chunk storage than its
    /// declared length. Treated as a `Miss`, not an error, but counted on a
    /// distinct metric so it's distinguishable from a cold cache.
    fn record_invariant_violation(&self) {
        self.metrics.invariant_violations.fetch_add(1, Relaxed);
    }

    /// SET(k, flags, exptime, v): write metadata first, then each chunk.
    /// Any sub-operation failure (transport error or a non-Stored chunk
    /// reply) aborts without rollback — partial writes are reclaimed by
    /// TTL, per §9's resolved open question.
    pub async fn set(
        &self,
        handler: &dyn BackendHandler,
        key: &[u8],
        flags: u32,
        exptime: u32,
        value: &[u8],
    ) -> Result<ChunkSetResult, ChunkingError> {
        let chunk_size = self.chunk_size as usize;
        let length = value.len() as i32;
        let num_chunks = value.len().div_ceil(chunk_size.max(1)) as i32;
        let token = self.tokens.next_token();

        let meta = MetaRecord::new(length, flags as i32, num_chunks, self.chunk_size as i32, token);
        match handler.set(&meta_key(key), 0, exptime, &meta.to_bytes()).await? {
            StoreResult::Stored => {}
            StoreResult::NotStored => return Ok(ChunkSetResult::NotStored),
            StoreResult::Exists => return Ok(ChunkSetResult::Exists),
        }

        for i in 0..num_chunks {
            let start = i as usize * chunk_size;
            let end = (start + chunk_size).min(value.len());
            let mut payload = BytesMut::with_capacity(16 + chunk_size);
            payload.extend_from_slice(&token);
            payload.extend_from_slice(&value[start..end]);
            payload.resize(16 + chunk_size, 0);

            match handler.set(&chunk_key(key, i), 0, exptime, &payload).await? {
                StoreResult::Stored => {}
                StoreResult::NotStored => return Ok(ChunkSetResult::NotStored),
                StoreResult::Exists => return Ok(ChunkSetResult::Exists),
            }
        }

        Ok(ChunkSetResult::Stored)
    }

    /// GET(k): read metadata, then exactly `num_chunks` chunks, verifying
    /// the token prefix on each before copying its slice into the
    /// reassembled buffer.
    pub async fn get(
        &self,
        handler: &dyn BackendHandler,
        key: &[u8],
    ) -> Result<ChunkGetResult, ChunkingError> {
        let meta = match handler.get(&meta_key(key)).await? {
            GetResult::Hit { payload, .. } => match MetaRecord::parse(&payload) {
                Some(m) => m,
                None => return Ok(ChunkGetResult::Miss),
            },
            GetResult::Miss => return Ok(ChunkGetResult::Miss),
        };
        if (meta.num_chunks as i64) * (meta.chunk_size as i64) < meta.length as i64 {
            self.record_invariant_violation();
            return Ok(ChunkGetResult::Miss);
        }

        let mut buffer = BytesMut::zeroed(meta.length as usize);
        for i in 0..meta.num_chunks {
            let chunk = match handler.get(&chunk_key(key, i)).await? {
                GetResult::Hit { payload, .. } => payload,
                GetResult::Miss => return Ok(ChunkGetResult::Miss),
            };
            if chunk.len() < 16 || chunk[..16] != meta.token[..] {
                return Ok(ChunkGetResult::Miss);
            }
            let start = i as usize * meta.chunk_size as usize;
            let end = (start + meta.chunk_size as usize).min(meta.length as usize);
            if start >= end {
                continue;
            }
            let take = end - start;
            buffer[start..end].copy_from_slice(&chunk[16..16 + take]);
        }

        Ok(ChunkGetResult::Hit { flags: meta.orig_flags as u32, value: buffer.freeze() })
    }

    /// GAT(k, exptime): same structure as GET, but every chunk fetch uses
    /// the backend's GAT, and metadata GAT runs last to preserve the
    /// write/delete-order invariant's read-side mirror.
    pub async fn gat(
        &self,
        handler: &dyn BackendHandler,
        key: &[u8],
        exptime: u32,
    ) -> Result<ChunkGetResult, ChunkingError> {
        // Metadata is read (not GAT'd) first so we know num_chunks/token
        // before touching chunks; it's GAT'd again at the end.
        let meta = match handler.get(&meta_key(key)).await? {
            GetResult::Hit { payload, .. } => match MetaRecord::parse(&payload) {
                Some(m) => m,
                None => return Ok(ChunkGetResult::Miss),
            },
            GetResult::Miss => return Ok(ChunkGetResult::Miss),
        };
        if (meta.num_chunks as i64) * (meta.chunk_size as i64) < meta.length as i64 {
            self.record_invariant_violation();
            return Ok(ChunkGetResult::Miss);
        }

        let mut buffer = BytesMut::zeroed(meta.length as usize);
        for i in 0..meta.num_chunks {
            let chunk = match handler.gat(&chunk_key(key, i), exptime).await? {
                GetResult::Hit { payload, .. } => payload,
                GetResult::Miss => return Ok(ChunkGetResult::Miss),
            };
            if chunk.len() < 16 || chunk[..16] != meta.token[..] {
                return Ok(ChunkGetResult::Miss);
            }
            let start = i as usize * meta.chunk_size as usize;
            let end = (start + meta.chunk_size as usize).min(meta.length as usize);
            if start >= end {
                continue;
            }
            let take = end - start;
            buffer[start..end].copy_from_slice(&chunk[16..16 + take]);
        }

        match handler.gat(&meta_key(key), exptime).await? {
            GetResult::Hit { .. } => {}
            GetResult::Miss => return Ok(ChunkGetResult::Miss),
        }

        Ok(ChunkGetResult::Hit { flags: meta.orig_flags as u32, value: buffer.freeze() })
    }

    /// DELETE(k): metadata first, then every chunk. A chunk `NotFound` is
    /// expected after a prior partial SET and is not an error.
    pub async fn delete(
        &self,
        handler: &dyn BackendHandler,
        key: &[u8],
    ) -> Result<ChunkDeleteResult, ChunkingError> {
        let meta = match handler.get(&meta_key(key)).await? {
            GetResult::Hit { payload, .. } => match MetaRecord::parse(&payload) {
                Some(m) => m,
                None => return Ok(ChunkDeleteResult::NotFound),
            },
            GetResult::Miss => return Ok(ChunkDeleteResult::NotFound),
        };

        handler.delete(&meta_key(key)).await?;
        for i in 0..meta.num_chunks {
            handler.delete(&chunk_key(key, i)).await?;
        }

        Ok(ChunkDeleteResult::Deleted)
    }

    /// TOUCH(k, exptime): chunks first, then metadata, so a reader that
    /// re-fetches metadata after the extension still finds chunks present.
    pub async fn touch(
        &self,
        handler: &dyn BackendHandler,
        key: &[u8],
        exptime: u32,
    ) -> Result<ChunkTouchResult, ChunkingError> {
        let meta = match handler.get(&meta_key(key)).await? {
            GetResult::Hit { payload, .. } => match MetaRecord::parse(&payload) {
                Some(m) => m,
                None => return Ok(ChunkTouchResult::NotFound),
            },
            GetResult::Miss => return Ok(ChunkTouchResult::NotFound),
        };

        for i in 0..meta.num_chunks {
            handler.touch(&chunk_key(key, i), exptime).await?;
        }

        match handler.touch(&meta_key(key), exptime).await? {
            TouchResult::Touched => Ok(ChunkTouchResult::Touched),
            TouchResult::NotFound => Ok(ChunkTouchResult::NotFound),
        }
    }
}
