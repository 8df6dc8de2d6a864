//! rbcache-core: storage engine for a remote build cache.
//!
//! Implements the content-addressable store (CAS) and action cache (AC) that
//! a build-cache server sits on top of: a size-bounded LRU index, a chunked
//! zstd blob codec that supports offset reads without decompressing from the
//! start, an atomic write pipeline, and a `FindMissing` fan-out that
//! combines local lookups with an optional second-tier proxy. The wire
//! protocols, auth, and CLI plumbing that would call into this crate are out
//! of scope; see `DiskCache` for the public surface.

pub mod action_result;
pub mod codec;
pub mod config;
pub mod digest;
pub mod disk_cache;
pub mod error;
pub mod kind;
pub mod loader;
pub mod lru_index;
pub mod proxy;
pub mod tempfile_mint;
pub mod util;

pub use config::{CacheConfig, KindLimits};
pub use digest::{Digest, DigestFunction};
pub use disk_cache::{CacheStats, DiskCache, GetResult};
pub use error::{CacheError, CacheResult};
pub use kind::EntryKind;
pub use proxy::{NullProxy, Proxy, ProxyReader};
