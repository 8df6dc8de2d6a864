//! The knobs the core itself owns. Parsing a config *file* is a frontend
//! concern (CLI flag wiring is explicitly out of scope), but the struct a
//! frontend would parse one into is not, so it lives here with a `toml`
//! convenience loader.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::codec::DEFAULT_CHUNK_SIZE;
use crate::digest::DigestFunction;
use crate::error::{CacheError, CacheResult};

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_blob_size() -> u64 {
    // 4 GiB; a generous per-blob ceiling independent of the overall budget.
    4 * 1024 * 1024 * 1024
}

fn default_proxy_workers() -> usize {
    512
}

fn default_proxy_queue_depth() -> usize {
    2048
}

fn default_find_missing_batch() -> usize {
    20
}

fn default_digest_function() -> DigestFunction {
    DigestFunction::Sha256
}

/// Per-kind size budgets, in bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindLimits {
    pub cas_max_size: u64,
    pub ac_max_size: u64,
    pub raw_max_size: u64,
}

impl Default for KindLimits {
    fn default() -> Self {
        // 10 GiB CAS, 1 GiB AC, 1 GiB RAW — a reasonable single-host default.
        Self {
            cas_max_size: 10 * 1024 * 1024 * 1024,
            ac_max_size: 1024 * 1024 * 1024,
            raw_max_size: 1024 * 1024 * 1024,
        }
    }
}

/// Top-level configuration for a [`crate::disk_cache::DiskCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Filesystem root the cache owns exclusively.
    pub root: PathBuf,

    pub limits: KindLimits,

    /// Soft secondary ceiling (`currentSize + queuedEvictionsSize`) that
    /// throttles `Reserve` before the hard `maxSize` would be hit. Must be
    /// `>= limits.cas_max_size` (and so on per kind) to be meaningful; a
    /// value of `None` disables the throttle.
    pub disk_size_limit: Option<u64>,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    #[serde(default = "default_max_blob_size")]
    pub max_blob_size: u64,

    #[serde(default = "default_proxy_workers")]
    pub proxy_workers: usize,

    #[serde(default = "default_proxy_queue_depth")]
    pub proxy_queue_depth: usize,

    #[serde(default = "default_find_missing_batch")]
    pub find_missing_batch: usize,

    #[serde(default = "default_digest_function")]
    pub default_digest_function: DigestFunction,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            limits: KindLimits::default(),
            disk_size_limit: None,
            chunk_size: default_chunk_size(),
            max_blob_size: default_max_blob_size(),
            proxy_workers: default_proxy_workers(),
            proxy_queue_depth: default_proxy_queue_depth(),
            find_missing_batch: default_find_missing_batch(),
            default_digest_function: default_digest_function(),
        }
    }
}

impl CacheConfig {
    /// Convenience loader for frontends that keep their settings in a TOML
    /// file; the core itself never reads one on its own.
    pub async fn load_toml(path: &Path) -> CacheResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CacheError::Config(format!("reading {path:?}: {e}")))?;
        toml::from_str(&text).map_err(|e| CacheError::Config(format!("parsing {path:?}: {e}")))
    }

    pub fn max_size_for(&self, kind: crate::kind::EntryKind) -> u64 {
        match kind {
            crate::kind::EntryKind::Cas => self.limits.cas_max_size,
            crate::kind::EntryKind::Ac => self.limits.ac_max_size,
            crate::kind::EntryKind::Raw => self.limits.raw_max_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = CacheConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: CacheConfig = toml::from_str(&text).unwrap();
        assert_eq!(cfg.chunk_size, back.chunk_size);
        assert_eq!(cfg.limits.cas_max_size, back.limits.cas_max_size);
    }
}
