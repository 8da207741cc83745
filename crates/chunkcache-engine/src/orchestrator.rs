//! Orchestrator (component D, §4.D): sequences one logical operation
//! across an L1 (local, fast) and an L2 (remote, authoritative) tier. It
//! knows nothing about chunking or wire formats — only the write-L2-first,
//! read-L1-first-populate-on-miss, delete-both, touch-both policy.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::BackendHandler;
use crate::chunking::{
    ChunkDeleteResult, ChunkGetResult, ChunkSetResult, ChunkTouchResult, ChunkingEngine, ChunkingError,
};
use crate::metrics::Metrics;

/// Coordinates L1 and L2 chunking engines for one logical request. Each
/// tier gets its own `ChunkingEngine` (same chunk size, independent token
/// sources) driving its own `BackendHandler`. A deployment may wire the
/// same handler to both slots for single-tier operation; the orchestrator
/// treats both as opaque per §4.B.
pub struct Orchestrator {
    l1_engine: Arc<ChunkingEngine>,
    l1_handler: Arc<dyn BackendHandler>,
    l2_engine: Arc<ChunkingEngine>,
    l2_handler: Arc<dyn BackendHandler>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        chunk_size: u32,
        l1_handler: Arc<dyn BackendHandler>,
        l2_handler: Arc<dyn BackendHandler>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            l1_engine: Arc::new(ChunkingEngine::new(chunk_size, Arc::clone(&metrics))),
            l1_handler,
            l2_engine: Arc::new(ChunkingEngine::new(chunk_size, Arc::clone(&metrics))),
            l2_handler,
            metrics,
        }
    }

    /// Write L2 first; an L1 failure after an L2 success still reports
    /// `Stored` since the next read repopulates L1 from L2.
    pub async fn set(
        &self,
        key: &[u8],
        flags: u32,
        exptime: u32,
        value: &[u8],
    ) -> Result<ChunkSetResult, ChunkingError> {
        let result = self.l2_engine.set(self.l2_handler.as_ref(), key, flags, exptime, value).await?;
        if result != ChunkSetResult::Stored {
            return Ok(result);
        }

        if let Err(err) = self.l1_engine.set(self.l1_handler.as_ref(), key, flags, exptime, value).await {
            warn!(error = %err, "L1 populate after L2 SET failed; next GET will repopulate");
            self.metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        Ok(ChunkSetResult::Stored)
    }

    /// Query L1 first; on miss -- or on an L1 backend error, which is
    /// translated into an L2 attempt rather than failing the request
    /// outright (§7) -- query L2 and, on hit, populate L1 fire-and-forget
    /// so the client isn't delayed by a slow L1 write.
    pub async fn get(&self, key: &[u8]) -> Result<ChunkGetResult, ChunkingError> {
        match self.l1_engine.get(self.l1_handler.as_ref(), key).await {
            Ok(ChunkGetResult::Hit { flags, value }) => {
                self.metrics.l1_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Ok(ChunkGetResult::Hit { flags, value });
            }
            Ok(ChunkGetResult::Miss) => {}
            Err(err) => {
                warn!(error = %err, "L1 GET failed; falling back to L2");
                self.metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        let l2_result = self.l2_engine.get(self.l2_handler.as_ref(), key).await?;
        match &l2_result {
            ChunkGetResult::Hit { flags, value } => {
                self.metrics.l2_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.spawn_l1_populate(key, *flags, value.clone());
            }
            ChunkGetResult::Miss => {
                self.metrics.misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
        Ok(l2_result)
    }

    /// Same structure as `get`, but extends TTL on every tier it touches
    /// via the chunking engine's GAT path instead of a plain read.
    pub async fn gat(&self, key: &[u8], exptime: u32) -> Result<ChunkGetResult, ChunkingError> {
        match self.l1_engine.gat(self.l1_handler.as_ref(), key, exptime).await {
            Ok(ChunkGetResult::Hit { flags, value }) => return Ok(ChunkGetResult::Hit { flags, value }),
            Ok(ChunkGetResult::Miss) => {}
            Err(err) => {
                warn!(error = %err, "L1 GAT failed; falling back to L2");
                self.metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        let l2_result = self.l2_engine.gat(self.l2_handler.as_ref(), key, exptime).await?;
        if let ChunkGetResult::Hit { flags, value } = &l2_result {
            self.spawn_l1_populate(key, *flags, value.clone());
        }
        Ok(l2_result)
    }

    /// Delete from both tiers; `Deleted` if either reports success. An L1
    /// error doesn't abort the request -- it's treated as "nothing to
    /// report from L1" and L2 is still attempted (§7).
    pub async fn delete(&self, key: &[u8]) -> Result<ChunkDeleteResult, ChunkingError> {
        let l1 = match self.l1_engine.delete(self.l1_handler.as_ref(), key).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "L1 DELETE failed; continuing to L2");
                self.metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                ChunkDeleteResult::NotFound
            }
        };
        let l2 = self.l2_engine.delete(self.l2_handler.as_ref(), key).await?;
        if l1 == ChunkDeleteResult::Deleted || l2 == ChunkDeleteResult::Deleted {
            Ok(ChunkDeleteResult::Deleted)
        } else {
            Ok(ChunkDeleteResult::NotFound)
        }
    }

    /// Apply to both tiers; `Touched` if at least L2 succeeds. An L1 error
    /// is logged and counted but doesn't prevent the L2 attempt (§7).
    pub async fn touch(&self, key: &[u8], exptime: u32) -> Result<ChunkTouchResult, ChunkingError> {
        let l1 = match self.l1_engine.touch(self.l1_handler.as_ref(), key, exptime).await {
            Ok(result) => result,
            Err(err) => {
                warn!(error = %err, "L1 TOUCH failed; continuing to L2");
                self.metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                ChunkTouchResult::NotFound
            }
        };
        let l2 = self.l2_engine.touch(self.l2_handler.as_ref(), key, exptime).await?;
        debug!(?l1, ?l2, "touch applied to both tiers");
        Ok(l2)
    }

    fn spawn_l1_populate(&self, key: &[u8], flags: u32, value: bytes::Bytes) {
        let key = key.to_vec();
        let l1_engine = Arc::clone(&self.l1_engine);
        let l1_handler = Arc::clone(&self.l1_handler);
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            if let Err(err) = l1_engine.set(l1_handler.as_ref(), &key, flags, 0, &value).await {
                warn!(error = %err, "fire-and-forget L1 populate failed");
                metrics.l1_errors.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        });
    }
}
