//! chunkcache-core — shared wire types, protocol codecs, config, and the
//! per-write token source. Every other chunkcache crate depends on this one.

pub mod config;
pub mod error;
pub mod model;
pub mod text;
pub mod binary;
pub mod token;
pub mod wire;

pub use error::{CodecError, ProtocolKind};
pub use model::{Item, Request, Response};
pub use wire::MetaRecord;
