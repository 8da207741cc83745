//! End-to-end integration tests: drive a real `chunkcached::server::serve`
//! listener over real TCP, speaking both wire protocols directly, against
//! in-memory L1/L2 backends.


mod binary_protocol;
mod chunking_invariants;
mod text_protocol;
mod tiering;
