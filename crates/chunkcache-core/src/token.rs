//! Per-write token source (component F).
//!
//! Produces a 16-byte value unique within the metadata item's TTL window,
//! embedded in the metadata record and repeated as a prefix on every chunk
//! of the write it belongs to (§3 invariant 1). Secrecy is not required —
//! only uniqueness — so this uses the spec's second suggested scheme: a
//! per-process random prefix concatenated with a monotonic counter, rather
//! than calling a CSPRNG on every SET.

use std::sync::atomic::{AtomicU64, Ordering};

use rand::RngCore;

/// Produces unique 16-byte tokens: 8 random bytes fixed at construction,
/// 8 bytes from a process-wide monotonic counter.
pub struct TokenSource {
    prefix: [u8; 8],
    counter: AtomicU64,
}

impl TokenSource {
    pub fn new() -> Self {
        let mut prefix = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut prefix);
        Self { prefix, counter: AtomicU64::new(0) }
    }

    /// Generate the next token. Lock-free: a single atomic increment.
    pub fn next_token(&self) -> [u8; 16] {
        let count = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut token = [0u8; 16];
        token[..8].copy_from_slice(&self.prefix);
        token[8..].copy_from_slice(&count.to_le_bytes());
        token
    }
}

impl Default for TokenSource {
    fn default() -> Self {
        Self::new()
    }
}
