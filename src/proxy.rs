//! The `Proxy` contract: a second-tier, network-attached cache the disk
//! cache consults on local misses and feeds asynchronously on commits.
//!
//! Concrete backends (S3, GCS, Azure, HTTP, gRPC) are out of scope here —
//! this module only carries the trait every such backend implements, plus
//! a no-op implementation useful in tests and in deployments that run with
//! no second tier at all.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::digest::DigestFunction;
use crate::error::CacheResult;
use crate::kind::EntryKind;

/// A proxy-reported size; `-1` means the proxy knows the blob exists but
/// not how large it is.
pub const UNKNOWN_SIZE: i64 = -1;

/// A boxed, owned byte stream, the shape a proxy hands back on a hit.
pub type ProxyReader = std::pin::Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// The second-tier cache contract consumed by the disk cache. Proxy errors
/// are never fatal to a caller: they're logged and treated as a miss.
#[async_trait]
pub trait Proxy: Send + Sync {
    /// Fire-and-forget upload: the disk cache does not wait on this: it
    /// spawns it onto a background task and moves on.
    async fn put(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        logical_size: u64,
        size_on_disk: u64,
        reader: ProxyReader,
    );

    /// Fetch a blob, if the proxy has it.
    async fn get(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
    ) -> CacheResult<Option<(ProxyReader, i64)>>;

    /// Existence check only, no bytes transferred.
    async fn contains(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
    ) -> CacheResult<Option<i64>>;
}

/// A proxy that never has anything. Used when no second tier is
/// configured, so the disk cache can hold a `Box<dyn Proxy>` unconditionally
/// rather than branching on `Option<Box<dyn Proxy>>` at every call site.
pub struct NullProxy;

#[async_trait]
impl Proxy for NullProxy {
    async fn put(
        &self,
        _kind: EntryKind,
        _digest_fn: DigestFunction,
        _hash: &str,
        _logical_size: u64,
        _size_on_disk: u64,
        _reader: ProxyReader,
    ) {
    }

    async fn get(
        &self,
        _kind: EntryKind,
        _digest_fn: DigestFunction,
        _hash: &str,
        _size: i64,
    ) -> CacheResult<Option<(ProxyReader, i64)>> {
        Ok(None)
    }

    async fn contains(
        &self,
        _kind: EntryKind,
        _digest_fn: DigestFunction,
        _hash: &str,
        _size: i64,
    ) -> CacheResult<Option<i64>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_proxy_always_misses() {
        let proxy = NullProxy;
        let found = proxy.contains(EntryKind::Cas, DigestFunction::Sha256, "abc", -1).await.unwrap();
        assert_eq!(found, None);
        let got = proxy.get(EntryKind::Cas, DigestFunction::Sha256, "abc", -1).await.unwrap();
        assert!(got.is_none());
    }
}
