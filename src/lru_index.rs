//! The sized, doubly-linked LRU index: a map from lookup key to entry, kept
//! in access order, bounded by byte accounting rather than entry count.
//!
//! The index itself is not thread-safe (per the design, the owning disk
//! cache serialises access under a single mutex) except for the eviction
//! queue and its atomic counters, which are meant to be read lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::{CacheError, CacheResult};
use crate::util::round_up_4k;

/// One entry in the LRU. Keys live in one of two observable states:
/// *committed* (a real file exists) or *reserved* (the key occupies budget
/// but has no backing file yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LruItem {
    /// Logical (uncompressed) size.
    pub size: u64,
    /// On-disk size, already rounded up to the accounting block size.
    pub size_on_disk: u64,
    /// Random suffix embedded in the canonical filename.
    pub random: String,
    /// Whether this is a legacy (pre-chunked-format) CAS blob.
    pub legacy: bool,
    /// No backing file exists yet; any concurrent Put/proxy-fetch sees the
    /// key as present but not retrievable.
    pub reserved: bool,
}

impl LruItem {
    pub fn reservation(n: u64) -> Self {
        Self { size: n, size_on_disk: round_up_4k(n), random: String::new(), legacy: false, reserved: true }
    }
}

/// A batch of entries evicted together, carried to the background remover.
pub type EvictedBatch = Vec<(String, LruItem)>;

/// Bytes pending unlink by the background eviction workers, plus the peak
/// value ever observed. Read lock-free by callers that want to expose a
/// gauge.
#[derive(Debug, Default)]
pub struct EvictionGauge {
    pub queued_size: AtomicU64,
    pub peak_size: AtomicU64,
}

impl EvictionGauge {
    fn add(&self, n: u64) {
        let new = self.queued_size.fetch_add(n, Ordering::SeqCst) + n;
        self.peak_size.fetch_max(new, Ordering::SeqCst);
    }

    fn sub(&self, n: u64) {
        self.queued_size.fetch_sub(n, Ordering::SeqCst);
    }
}

/// Size-bounded LRU index. `maxSize` governs committed+reserved bytes;
/// `disk_size_limit`, if set, is a softer secondary ceiling (including
/// bytes still queued for eviction) that throttles writes instead of
/// letting them race the filesystem toward `ENOSPC`.
pub struct LruIndex {
    map: LruCache<String, LruItem>,
    current_size: u64,
    /// Sum of logical (uncompressed) `size` over committed entries — a
    /// reporting-only counter, never consulted for eviction decisions.
    uncompressed_size: u64,
    reserved_size: u64,
    max_size: u64,
    disk_size_limit: Option<u64>,
    gauge: Arc<EvictionGauge>,
    evict_tx: mpsc::Sender<EvictedBatch>,
    pending_batch: EvictedBatch,
}

impl LruIndex {
    /// Build a new index plus the receiver half of its eviction queue; the
    /// caller spawns the background worker(s) that drain it and unlink
    /// files.
    pub fn new(max_size: u64, disk_size_limit: Option<u64>) -> (Self, Arc<EvictionGauge>, mpsc::Receiver<EvictedBatch>) {
        let (evict_tx, evict_rx) = mpsc::channel(1);
        let gauge = Arc::new(EvictionGauge::default());
        let index = Self {
            map: LruCache::unbounded(),
            current_size: 0,
            uncompressed_size: 0,
            reserved_size: 0,
            max_size,
            disk_size_limit,
            gauge: gauge.clone(),
            evict_tx,
            pending_batch: Vec::new(),
        };
        (index, gauge, evict_rx)
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    pub fn current_size(&self) -> u64 {
        self.current_size
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    pub fn reserved_size(&self) -> u64 {
        self.reserved_size
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Move `key` to the head (most-recently-used) and return its entry.
    pub fn get(&mut self, key: &str) -> Option<&LruItem> {
        self.map.get(key)
    }

    /// Look up `key` without disturbing its position in the access order.
    pub fn peek_item(&self, key: &str) -> Option<&LruItem> {
        self.map.peek(key)
    }

    /// Whether reserving `n` more bytes right now would trip the soft
    /// `disk_size_limit` throttle (distinct from the hard `maxSize` ceiling
    /// enforced by [`add`](Self::add)).
    pub fn would_soft_reject(&self, n: u64) -> bool {
        match self.disk_size_limit {
            Some(limit) => {
                let queued = self.gauge.queued_size.load(Ordering::SeqCst);
                self.current_size + queued + n > limit
            }
            None => false,
        }
    }

    /// Insert or replace `key`. Fails outright if the entry alone can never
    /// fit; otherwise evicts tail entries until it does.
    pub fn add(&mut self, key: String, entry: LruItem) -> CacheResult<bool> {
        if entry.size_on_disk > self.max_size {
            return Ok(false);
        }

        let (delta, uncompressed_delta): (i64, i64) = if let Some(old) = self.map.peek(&key) {
            (
                entry.size_on_disk as i64 - old.size_on_disk as i64,
                entry.size as i64 - old.size as i64,
            )
        } else {
            (entry.size_on_disk as i64, entry.size as i64)
        };

        if entry.reserved {
            let reserved_after = self.reserved_size as i64 + delta;
            if reserved_after < 0 || reserved_after as u64 > self.max_size {
                return Ok(false);
            }
        }

        if let Some(old) = self.map.put(key.clone(), entry.clone()) {
            if !old.reserved {
                self.queue_eviction(key.clone(), old);
            }
        }

        self.apply_delta(delta, entry.reserved);
        self.uncompressed_size = add_signed(self.uncompressed_size, uncompressed_delta);
        self.evict_to_fit();
        Ok(true)
    }

    /// Remove `key` outright, queuing its file (if any) for unlink.
    pub fn remove(&mut self, key: &str) {
        if let Some(old) = self.map.pop(key) {
            let delta = -(old.size_on_disk as i64);
            self.apply_delta(delta, old.reserved);
            self.uncompressed_size = add_signed(self.uncompressed_size, -(old.size as i64));
            self.queue_eviction(key.to_string(), old);
        }
    }

    /// Reserve `n` bytes ahead of a Put. Returns `Ok(true)` on success,
    /// `Ok(false)` on a soft load-shedding reject, `Err` if `n` alone can
    /// never fit.
    pub fn reserve(&mut self, n: u64) -> CacheResult<bool> {
        if n == 0 {
            return Ok(true);
        }
        if n > self.max_size {
            return Err(CacheError::CacheTooSmall { wanted: n, max: self.max_size });
        }
        if self.reserved_size + n > self.max_size {
            return Err(CacheError::CacheTooSmall { wanted: n, max: self.max_size });
        }
        if let Some(limit) = self.disk_size_limit {
            let queued = self.gauge.queued_size.load(Ordering::SeqCst);
            if self.current_size + queued + n > limit {
                return Ok(false);
            }
        }

        self.current_size += n;
        self.reserved_size += n;
        self.evict_to_fit();
        Ok(true)
    }

    /// Release a reservation of `n` bytes taken by [`reserve`](Self::reserve)
    /// that was never committed (e.g. the upload failed).
    pub fn unreserve(&mut self, n: u64) -> CacheResult<()> {
        if n > self.current_size || n > self.reserved_size {
            return Err(CacheError::Internal(format!(
                "unreserve({n}) would underflow current_size={} reserved_size={}",
                self.current_size, self.reserved_size
            )));
        }
        self.current_size -= n;
        self.reserved_size -= n;
        Ok(())
    }

    fn apply_delta(&mut self, delta: i64, reserved: bool) {
        self.current_size = add_signed(self.current_size, delta);
        if reserved {
            self.reserved_size = add_signed(self.reserved_size, delta);
        }
    }

    fn evict_to_fit(&mut self) {
        while self.current_size > self.max_size {
            let Some((key, entry)) = self.map.pop_lru() else { break };
            self.apply_delta(-(entry.size_on_disk as i64), entry.reserved);
            self.uncompressed_size = add_signed(self.uncompressed_size, -(entry.size as i64));
            self.queue_eviction(key, entry);
        }
    }

    fn queue_eviction(&mut self, key: String, entry: LruItem) {
        self.gauge.add(entry.size_on_disk);
        self.pending_batch.push((key, entry));
        self.flush_eviction_batch();
    }

    /// Hand the accumulated batch to the background remover without
    /// blocking: if the single-slot channel is full (a batch is already in
    /// flight), append to the currently-pending batch and try again on the
    /// next mutation. This is what keeps producers lock-free even under a
    /// burst of evictions.
    fn flush_eviction_batch(&mut self) {
        if self.pending_batch.is_empty() {
            return;
        }
        match self.evict_tx.try_send(std::mem::take(&mut self.pending_batch)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(batch)) => {
                self.pending_batch = batch;
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                warn!(dropped = batch.len(), "eviction receiver gone, dropping evicted batch");
            }
        }
    }
}

fn add_signed(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base + delta as u64
    } else {
        base.saturating_sub((-delta) as u64)
    }
}

/// Background worker: drains the eviction queue and unlinks the
/// corresponding canonical files. Tolerates files that are already gone
/// (crash recovery, or a pre-rename failure left nothing behind).
pub async fn run_eviction_worker(
    mut rx: mpsc::Receiver<EvictedBatch>,
    gauge: Arc<EvictionGauge>,
    root: std::path::PathBuf,
    path_for: impl Fn(&std::path::Path, &str, &LruItem) -> std::path::PathBuf + Send + Sync + 'static,
) {
    while let Some(batch) = rx.recv().await {
        for (key, entry) in batch {
            let path = path_for(&root, &key, &entry);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => trace!(?path, "evicted"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(?path, error = %e, "failed to unlink evicted entry"),
            }
            gauge.sub(entry.size_on_disk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(size_on_disk: u64) -> LruItem {
        LruItem { size: size_on_disk, size_on_disk, random: "r".into(), legacy: false, reserved: false }
    }

    #[test]
    fn add_and_get_roundtrip() {
        let (mut idx, _gauge, _rx) = LruIndex::new(10 * 4096, None);
        idx.add("cas/a".into(), item(4096)).unwrap();
        assert_eq!(idx.current_size(), 4096);
        assert_eq!(idx.len(), 1);
        assert!(idx.get("cas/a").is_some());
    }

    #[test]
    fn eviction_order_progression() {
        // Insert entries sized just over half the budget so each add evicts
        // exactly enough of the oldest entries to fit, in block multiples.
        let block = 4096u64;
        let (mut idx, _gauge, _rx) = LruIndex::new(10 * block, None);

        idx.add("k0".into(), LruItem { size: 0, size_on_disk: 0, random: "".into(), legacy: false, reserved: false }).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (0, 1));

        idx.add("k1".into(), item(block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (block, 2));

        idx.add("k2".into(), item(2 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (3 * block, 3));

        idx.add("k3".into(), item(3 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (6 * block, 4));

        idx.add("k4".into(), item(4 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (10 * block, 5));

        idx.add("k5".into(), item(5 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (9 * block, 2));
        assert!(idx.peek_item("k4").is_some() && idx.peek_item("k5").is_some());
        assert!(idx.peek_item("k0").is_none());
        assert!(idx.peek_item("k3").is_none());

        idx.add("k6".into(), item(6 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (6 * block, 1));

        idx.add("k7".into(), item(7 * block)).unwrap();
        assert_eq!((idx.current_size(), idx.len()), (7 * block, 1));
    }

    #[test]
    fn oversize_entry_refused() {
        let (mut idx, _gauge, _rx) = LruIndex::new(4096, None);
        let ok = idx.add("k".into(), item(8192)).unwrap();
        assert!(!ok);
        assert_eq!(idx.current_size(), 0);
    }

    #[test]
    fn reserve_then_commit() {
        let (mut idx, _gauge, _rx) = LruIndex::new(4096, None);
        assert!(idx.reserve(4096).unwrap());
        assert_eq!(idx.current_size(), 4096);
        assert_eq!(idx.reserved_size(), 4096);

        idx.add("k".into(), item(4096)).unwrap();
        idx.unreserve(4096).unwrap();
        assert_eq!(idx.reserved_size(), 0);
        assert_eq!(idx.current_size(), 4096);
    }

    #[test]
    fn unreserve_underflow_is_internal_error() {
        let (mut idx, _gauge, _rx) = LruIndex::new(4096, None);
        let err = idx.unreserve(1).unwrap_err();
        assert!(matches!(err, CacheError::Internal(_)));
    }

    #[test]
    fn disk_size_limit_soft_rejects() {
        let (mut idx, _gauge, _rx) = LruIndex::new(4096 * 10, Some(4096));
        assert!(!idx.reserve(8192).unwrap());
    }

    #[tokio::test]
    async fn remove_queues_eviction_and_worker_unlinks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob");
        tokio::fs::write(&path, b"x").await.unwrap();

        let (mut idx, gauge, rx) = LruIndex::new(4096, None);
        idx.add("cas/a".into(), item(4096)).unwrap();

        let root = dir.path().to_path_buf();
        let handle = tokio::spawn(run_eviction_worker(rx, gauge.clone(), root, {
            let path = path.clone();
            move |_root, _key, _entry| path.clone()
        }));

        idx.remove("cas/a");
        // give the worker a chance to drain the single-slot channel
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!path.exists());
        handle.abort();
    }
}
