//! chunkcache-engine — the chunking engine (component C), the backend
//! handler contract and its concrete implementations (component B), the
//! L1/L2 orchestrator (component D), derived-key scheme, and the metric
//! surface.

pub mod backend;
pub mod chunking;
pub mod keys;
pub mod metrics;
pub mod orchestrator;

pub use backend::{BackendError, BackendFactory, BackendHandler, DeleteResult, GetResult, InMemoryBackendHandler, StoreResult, TcpBackendHandler, TouchResult};
pub use chunking::{ChunkingEngine, ChunkingError};
pub use metrics::Metrics;
pub use orchestrator::Orchestrator;
