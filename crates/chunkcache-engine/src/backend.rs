//! Backend handler contract (component B) and its concrete implementations.
//!
//! `BackendHandler` is intentionally minimal — five verbs, each returning a
//! result enum that distinguishes a normal miss from a transport failure,
//! mirroring the shape of `summit-services::service::ChunkService`: a small
//! trait at the seam between "daemon logic" and "how bytes actually move."
//! The chunking engine and orchestrator are generic over this trait and
//! never know which implementation they're driving.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use dashmap::DashMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Transport-level failure talking to a backend tier. Distinct from a
/// logical `Miss`/`NotFound`, which are normal outcomes (§7).
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("backend protocol violation: {0}")]
    Protocol(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreResult {
    Stored,
    NotStored,
    Exists,
}

#[derive(Debug, Clone)]
pub enum GetResult {
    Hit { flags: u32, payload: Bytes },
    Miss,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchResult {
    Touched,
    NotFound,
}

/// A single-connection client to one backend tier (§4.B).
///
/// Implementations own their own transport; the chunking engine issues one
/// call per chunk/metadata item and never pipelines within one logical
/// operation, so implementations don't need internal request queuing.
#[async_trait::async_trait]
pub trait BackendHandler: Send + Sync {
    async fn set(
        &self,
        key: &[u8],
        flags: u32,
        exptime: u32,
        payload: &[u8],
    ) -> Result<StoreResult, BackendError>;

    async fn get(&self, key: &[u8]) -> Result<GetResult, BackendError>;

    async fn delete(&self, key: &[u8]) -> Result<DeleteResult, BackendError>;

    async fn touch(&self, key: &[u8], exptime: u32) -> Result<TouchResult, BackendError>;

    /// Get-and-touch: fetch the value while extending its expiration.
    async fn gat(&self, key: &[u8], exptime: u32) -> Result<GetResult, BackendError>;
}

// ── TCP backend: speaks memcached text protocol to a real backend ──────────

/// A single-connection client to a real memcached-compatible process,
/// speaking the memcached text protocol (the simplest reliable wire format
/// to generate/parse without a 3rd-party client dependency — sufficient
/// here since the proxy only ever issues single-item commands).
pub struct TcpBackendHandler {
    conn: Mutex<BufReader<TcpStream>>,
}

impl TcpBackendHandler {
    pub async fn connect(addr: &str) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self { conn: Mutex::new(BufReader::new(stream)) })
    }

    async fn read_line(reader: &mut BufReader<TcpStream>) -> Result<Vec<u8>, BackendError> {
        let mut line = Vec::new();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            return Err(BackendError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "backend closed connection",
            )));
        }
        while line.last() == Some(&b'\n') || line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(line)
    }
}

#[async_trait::async_trait]
impl BackendHandler for TcpBackendHandler {
    async fn set(
        &self,
        key: &[u8],
        flags: u32,
        exptime: u32,
        payload: &[u8],
    ) -> Result<StoreResult, BackendError> {
        let mut conn = self.conn.lock().await;
        let cmd = format!(
            "set {} {} {} {}\r\n",
            String::from_utf8_lossy(key),
            flags,
            exptime,
            payload.len()
        );
        conn.write_all(cmd.as_bytes()).await?;
        conn.write_all(payload).await?;
        conn.write_all(b"\r\n").await?;
        conn.flush().await?;

        let reply = Self::read_line(&mut conn).await?;
        match reply.as_slice() {
            b"STORED" => Ok(StoreResult::Stored),
            b"NOT_STORED" => Ok(StoreResult::NotStored),
            b"EXISTS" => Ok(StoreResult::Exists),
            other => Err(BackendError::Protocol(format!(
                "unexpected SET reply: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    async fn get(&self, key: &[u8]) -> Result<GetResult, BackendError> {
        let mut conn = self.conn.lock().await;
        let cmd = format!("get {}\r\n", String::from_utf8_lossy(key));
        conn.write_all(cmd.as_bytes()).await?;
        conn.flush().await?;
        read_value_reply(&mut conn).await
    }

    async fn delete(&self, key: &[u8]) -> Result<DeleteResult, BackendError> {
        let mut conn = self.conn.lock().await;
        let cmd = format!("delete {}\r\n", String::from_utf8_lossy(key));
        conn.write_all(cmd.as_bytes()).await?;
        conn.flush().await?;
        let reply = Self::read_line(&mut conn).await?;
        match reply.as_slice() {
            b"DELETED" => Ok(DeleteResult::Deleted),
            b"NOT_FOUND" => Ok(DeleteResult::NotFound),
            other => Err(BackendError::Protocol(format!(
                "unexpected DELETE reply: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    async fn touch(&self, key: &[u8], exptime: u32) -> Result<TouchResult, BackendError> {
        let mut conn = self.conn.lock().await;
        let cmd = format!("touch {} {}\r\n", String::from_utf8_lossy(key), exptime);
        conn.write_all(cmd.as_bytes()).await?;
        conn.flush().await?;
        let reply = Self::read_line(&mut conn).await?;
        match reply.as_slice() {
            b"TOUCHED" => Ok(TouchResult::Touched),
            b"NOT_FOUND" => Ok(TouchResult::NotFound),
            other => Err(BackendError::Protocol(format!(
                "unexpected TOUCH reply: {:?}",
                String::from_utf8_lossy(other)
            ))),
        }
    }

    async fn gat(&self, key: &[u8], exptime: u32) -> Result<GetResult, BackendError> {
        let mut conn = self.conn.lock().await;
        let cmd = format!("gat {} {}\r\n", exptime, String::from_utf8_lossy(key));
        conn.write_all(cmd.as_bytes()).await?;
        conn.flush().await?;
        read_value_reply(&mut conn).await
    }
}

async fn read_value_reply(conn: &mut BufReader<TcpStream>) -> Result<GetResult, BackendError> {
    let header = TcpBackendHandler::read_line(conn).await?;
    if header.as_slice() == b"END" {
        return Ok(GetResult::Miss);
    }
    let header_str = std::str::from_utf8(&header)
        .map_err(|_| BackendError::Protocol("non-utf8 VALUE header".into()))?;
    let mut parts = header_str.split(' ');
    match parts.next() {
        Some("VALUE") => {}
        _ => return Err(BackendError::Protocol(format!("unexpected GET reply: {header_str:?}"))),
    }
    let _key = parts.next().ok_or_else(|| BackendError::Protocol("VALUE missing key".into()))?;
    let flags: u32 = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BackendError::Protocol("VALUE missing flags".into()))?;
    let len: usize = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| BackendError::Protocol("VALUE missing length".into()))?;

    let mut payload = vec![0u8; len];
    conn.read_exact(&mut payload).await?;
    let mut trailer = [0u8; 2];
    conn.read_exact(&mut trailer).await?;

    // Consume the terminating END line.
    let end = TcpBackendHandler::read_line(conn).await?;
    if end.as_slice() != b"END" {
        return Err(BackendError::Protocol("missing END after VALUE".into()));
    }

    Ok(GetResult::Hit { flags, payload: Bytes::from(payload) })
}

// ── In-memory backend: DashMap-backed, for tests and embedded tiers ────────

struct Entry {
    flags: u32,
    payload: Bytes,
    /// Absolute unix expiration time in seconds. 0 = never.
    expires_at: u64,
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs()
}

/// Per spec §3: 0 = never, small values are relative seconds, large values
/// are absolute unix time. memcached's convention treats anything at or
/// above 30 days in seconds as absolute.
const RELATIVE_EXPTIME_CEILING: u32 = 60 * 60 * 24 * 30;

fn resolve_exptime(exptime: u32) -> u64 {
    if exptime == 0 {
        0
    } else if exptime < RELATIVE_EXPTIME_CEILING {
        now_secs() + exptime as u64
    } else {
        exptime as u64
    }
}

fn is_expired(expires_at: u64) -> bool {
    expires_at != 0 && expires_at <= now_secs()
}

/// In-process, `DashMap`-backed backend tier. Grounded in
/// `summitd::message_store::MessageStore` / `summitd::cache::ChunkCache` —
/// a cheaply `Clone`-able handle wrapping an `Arc<DashMap<..>>`. Used by the
/// test suite and by deployments that want an embedded tier instead of a
/// second network hop (§6: L1/L2 factories may both point at the same tier).
#[derive(Clone)]
pub struct InMemoryBackendHandler {
    store: Arc<DashMap<Bytes, Entry>>,
}

impl InMemoryBackendHandler {
    pub fn new() -> Self {
        Self { store: Arc::new(DashMap::new()) }
    }

    /// Test/fault-injection hook: overwrite a value's raw bytes directly,
    /// bypassing SET semantics. Used to simulate corruption (§8 scenario e).
    pub fn force_set_raw(&self, key: &[u8], flags: u32, payload: Bytes, exptime: u32) {
        self.store.insert(
            Bytes::copy_from_slice(key),
            Entry { flags, payload, expires_at: resolve_exptime(exptime) },
        );
    }

    /// Test hook: remove a key without going through DELETE semantics, to
    /// simulate a partial write (§8 scenario: miss on partial write).
    pub fn force_remove(&self, key: &[u8]) {
        self.store.remove(key.as_ref() as &[u8]);
    }

    /// Snapshot of all keys currently present (ignoring expiration), used
    /// by tests asserting on backend contents (§8 scenarios a/b).
    pub fn keys(&self) -> Vec<Bytes> {
        self.store.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for InMemoryBackendHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BackendHandler for InMemoryBackendHandler {
    async fn set(
        &self,
        key: &[u8],
        flags: u32,
        exptime: u32,
        payload: &[u8],
    ) -> Result<StoreResult, BackendError> {
        self.store.insert(
            Bytes::copy_from_slice(key),
            Entry {
                flags,
                payload: Bytes::copy_from_slice(payload),
                expires_at: resolve_exptime(exptime),
            },
        );
        Ok(StoreResult::Stored)
    }

    async fn get(&self, key: &[u8]) -> Result<GetResult, BackendError> {
        match self.store.get(key) {
            Some(entry) if !is_expired(entry.expires_at) => {
                Ok(GetResult::Hit { flags: entry.flags, payload: entry.payload.clone() })
            }
            Some(_) => Ok(GetResult::Miss),
            None => Ok(GetResult::Miss),
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<DeleteResult, BackendError> {
        match self.store.remove(key) {
            Some(_) => Ok(DeleteResult::Deleted),
            None => Ok(DeleteResult::NotFound),
        }
    }

    async fn touch(&self, key: &[u8], exptime: u32) -> Result<TouchResult, BackendError> {
        match self.store.get_mut(key) {
            Some(mut entry) if !is_expired(entry.expires_at) => {
                entry.expires_at = resolve_exptime(exptime);
                Ok(TouchResult::Touched)
            }
            _ => Ok(TouchResult::NotFound),
        }
    }

    async fn gat(&self, key: &[u8], exptime: u32) -> Result<GetResult, BackendError> {
        match self.store.get_mut(key) {
            Some(mut entry) if !is_expired(entry.expires_at) => {
                entry.expires_at = resolve_exptime(exptime);
                Ok(GetResult::Hit { flags: entry.flags, payload: entry.payload.clone() })
            }
            _ => Ok(GetResult::Miss),
        }
    }
}

/// Per-tier backend handler factory (§6: "a zero-argument constructor
/// producing a handler or an error"). Built once from configuration at
/// daemon startup; `connect` is called once per *accepted connection*
/// (§4.E, §5: "Each backend handler owns its own socket; handlers are not
/// shared between connections").
///
/// The in-memory variant has no socket to isolate per connection -- it
/// holds the one shared store built at startup, and `connect` just clones
/// the cheap `Arc`-backed handle, so every connection still observes the
/// same cache contents.
pub enum BackendFactory {
    Tcp(String),
    Unix(std::path::PathBuf),
    Memory(InMemoryBackendHandler),
}

impl BackendFactory {
    pub fn new(spec: &chunkcache_core::config::BackendSpec) -> Self {
        use chunkcache_core::config::BackendSpec;
        match spec {
            BackendSpec::Tcp { addr } => BackendFactory::Tcp(addr.clone()),
            BackendSpec::Unix { path } => BackendFactory::Unix(path.clone()),
            BackendSpec::Memory => BackendFactory::Memory(InMemoryBackendHandler::new()),
        }
    }

    /// Build the handler for one newly accepted connection.
    pub async fn connect(&self) -> anyhow::Result<Arc<dyn BackendHandler>> {
        match self {
            BackendFactory::Tcp(addr) => Ok(Arc::new(TcpBackendHandler::connect(addr).await?)),
            BackendFactory::Unix(path) => {
                // Unix-domain backend transport would share TcpBackendHandler's
                // text-protocol client logic over a UnixStream; not wired up.
                let _ = path;
                anyhow::bail!("unix-domain backend transport is not wired up in this build")
            }
            BackendFactory::Memory(handler) => Ok(Arc::new(handler.clone())),
        }
    }
}
