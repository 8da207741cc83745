//! Configuration for chunkcached.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CHUNKCACHED_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/chunkcached/config.toml
//!   3. ~/.config/chunkcached/config.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkcachedConfig {
    pub listener: ListenerConfig,
    pub chunking: ChunkingConfig,
    pub l1: BackendSpec,
    pub l2: BackendSpec,
    /// TCP/Unix status endpoint port. 0 disables it.
    pub status_port: u16,
}

/// Where the proxy accepts client connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ListenerConfig {
    Tcp { port: u16 },
    Unix { path: PathBuf },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Fixed installation-wide chunk size in bytes (§3). Commonly 1 KiB.
    pub chunk_size: u32,
}

/// Backend handler factory configuration (§6). `Tcp`/`Unix` construct a
/// `TcpBackendHandler` against a real memcached-compatible endpoint;
/// `Memory` constructs an in-process `InMemoryBackendHandler` — useful for
/// single-tier deployments or tests, wiring the same tier to both L1 and L2.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendSpec {
    Tcp { addr: String },
    Unix { path: PathBuf },
    Memory,
}

impl Default for ChunkcachedConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            chunking: ChunkingConfig::default(),
            l1: BackendSpec::Memory,
            l2: BackendSpec::Memory,
            status_port: 0,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        ListenerConfig::Tcp { port: 11211 }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { chunk_size: 1024 }
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ChunkcachedConfig {
    /// Load config: file → env var overrides → (defaults if no file).
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            ChunkcachedConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn file_path() -> PathBuf {
        std::env::var("CHUNKCACHED_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ChunkcachedConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CHUNKCACHED_* env var overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CHUNKCACHED_LISTENER__PORT") {
            if let Ok(p) = v.parse() {
                self.listener = ListenerConfig::Tcp { port: p };
            }
        }
        if let Ok(v) = std::env::var("CHUNKCACHED_CHUNKING__CHUNK_SIZE") {
            if let Ok(s) = v.parse() {
                self.chunking.chunk_size = s;
            }
        }
        if let Ok(v) = std::env::var("CHUNKCACHED_STATUS_PORT") {
            if let Ok(p) = v.parse() {
                self.status_port = p;
            }
        }
    }
}

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("chunkcached")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}
