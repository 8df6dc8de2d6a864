//! The orchestrator: ties the tempfile minter, codec, LRU index, and an
//! optional proxy together behind `Put`/`Get`/`Contains`/`FindMissing`.
//!
//! The index is protected by a single mutex; filesystem I/O (streaming,
//! fsync, rename, open, unlink) always happens outside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::action_result::ActionResult;
use crate::codec::{self, ChunkedWriter};
use crate::config::CacheConfig;
use crate::digest::{Digest, DigestFunction};
use crate::error::{CacheError, CacheResult};
use crate::kind::{lookup_key, EntryKind};
use crate::loader;
use crate::lru_index::{run_eviction_worker, LruIndex, LruItem};
use crate::proxy::{NullProxy, Proxy, ProxyReader};
use crate::tempfile_mint::TempfileMinter;
use crate::util::round_up_4k;

/// A point-in-time snapshot of the cache's size accounting.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub current_size: u64,
    pub uncompressed_size: u64,
    pub reserved_size: u64,
    pub num_items: usize,
    pub max_size: u64,
    pub server_uptime: std::time::Duration,
}

/// Outcome of a `Get`: the requested view plus its total (uncompressed)
/// size, for callers that want to set a `Content-Length`-style header.
pub struct GetResult {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub size: u64,
}

struct KindState {
    index: Mutex<LruIndex>,
}

/// Owns one `LruIndex` per kind (each kind has its own byte budget), the
/// root directory, the codec's defaults, the temp minter, and an optional
/// second-tier proxy.
pub struct DiskCache {
    root: PathBuf,
    config: CacheConfig,
    kinds: std::collections::HashMap<EntryKind, Arc<KindState>>,
    minter: TempfileMinter,
    proxy: Arc<dyn Proxy>,
    proxy_semaphore: Arc<Semaphore>,
    start_time: Instant,
}

impl DiskCache {
    /// Build a disk cache rooted at `config.root`, creating the directory
    /// skeleton and migrating/loading whatever is already there.
    pub async fn open(config: CacheConfig, proxy: Option<Arc<dyn Proxy>>) -> CacheResult<Self> {
        let root = config.root.clone();
        tokio::fs::create_dir_all(&root).await?;

        let mut kinds = std::collections::HashMap::new();
        for &kind in &[EntryKind::Cas, EntryKind::Ac, EntryKind::Raw] {
            loader::create_skeleton(&root, kind).await?;
            let migrated = loader::migrate_legacy_layout(&root, kind).await?;
            if migrated > 0 {
                debug!(%kind, migrated, "migrated legacy entries");
            }

            let max_size = config.max_size_for(kind);
            let (mut index, gauge, rx) = LruIndex::new(max_size, config.disk_size_limit);

            let scanned = loader::scan_kind(&root, kind).await?;
            let mut rejected = 0usize;
            for entry in scanned {
                let key = lookup_key(kind, &entry.hash);
                match index.add(key, entry.item) {
                    Ok(true) => {}
                    Ok(false) | Err(_) => {
                        rejected += 1;
                        if let Err(e) = tokio::fs::remove_file(&entry.path).await {
                            warn!(path = ?entry.path, error = %e, "failed unlinking rejected entry");
                        }
                    }
                }
            }
            if rejected > 0 {
                debug!(%kind, rejected, "rejected stale entries over budget during load");
            }

            let kind_root = root.clone();
            tokio::spawn(run_eviction_worker(rx, gauge, kind_root, move |root, key, item| {
                canonical_path_for_key(root, key, item)
            }));

            kinds.insert(kind, Arc::new(KindState { index: Mutex::new(index) }));
        }

        let proxy: Arc<dyn Proxy> = proxy.unwrap_or_else(|| Arc::new(NullProxy));
        let proxy_semaphore = Arc::new(Semaphore::new(config.proxy_workers));

        Ok(Self {
            root,
            minter: TempfileMinter::new(),
            kinds,
            proxy,
            proxy_semaphore,
            start_time: Instant::now(),
            config,
        })
    }

    fn state(&self, kind: EntryKind) -> &Arc<KindState> {
        self.kinds.get(&kind).expect("all three kinds are always present")
    }

    fn bucket_dir(&self, kind: EntryKind, hash: &str) -> PathBuf {
        self.root.join(kind.dir_name()).join(crate::util::bucket(hash))
    }

    fn canonical_path(&self, kind: EntryKind, hash: &str, item: &LruItem) -> PathBuf {
        self.bucket_dir(kind, hash).join(filename_for(hash, item))
    }

    /// Configured budget for one kind's subtree.
    pub fn max_size_for(&self, kind: EntryKind) -> u64 {
        self.config.max_size_for(kind)
    }

    /// The total budget managed across all three kinds' independent
    /// subtrees.
    pub fn max_size(&self) -> u64 {
        [EntryKind::Cas, EntryKind::Ac, EntryKind::Raw]
            .iter()
            .map(|&k| self.config.max_size_for(k))
            .sum()
    }

    /// Per-kind accounting snapshot, for callers that want the breakdown.
    pub fn stats_for(&self, kind: EntryKind) -> CacheStats {
        let idx = self.state(kind).index.lock();
        CacheStats {
            current_size: idx.current_size(),
            uncompressed_size: idx.uncompressed_size(),
            reserved_size: idx.reserved_size(),
            num_items: idx.len(),
            max_size: idx.max_size(),
            server_uptime: self.start_time.elapsed(),
        }
    }

    /// Totals across all three kinds.
    pub fn stats(&self) -> CacheStats {
        let mut total = CacheStats {
            current_size: 0,
            uncompressed_size: 0,
            reserved_size: 0,
            num_items: 0,
            max_size: 0,
            server_uptime: self.start_time.elapsed(),
        };
        for &kind in &[EntryKind::Cas, EntryKind::Ac, EntryKind::Raw] {
            let s = self.stats_for(kind);
            total.current_size += s.current_size;
            total.uncompressed_size += s.uncompressed_size;
            total.reserved_size += s.reserved_size;
            total.num_items += s.num_items;
            total.max_size += s.max_size;
        }
        total
    }

    /// Stream `reader` into the cache under `(kind, hash, size)`.
    pub async fn put(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: u64,
        mut reader: impl AsyncRead + Unpin + Send,
    ) -> CacheResult<()> {
        if size > self.config.max_blob_size {
            return Err(CacheError::Oversize(format!(
                "blob of {size} bytes exceeds the configured per-blob limit of {}",
                self.config.max_blob_size
            )));
        }

        let digest = Digest::new(hash.to_string(), size as i64);
        if size == 0 && digest.is_empty_blob(digest_fn) {
            let mut sink = Vec::new();
            reader.read_to_end(&mut sink).await?;
            return Ok(());
        }

        let key = lookup_key(kind, hash);
        let state = self.state(kind).clone();

        let sizing_size_on_disk = round_up_4k(size);

        // A fresh key reserves its full estimated on-disk size up front
        // (the only case the soft `disk_size_limit` throttle applies to).
        // Overwriting an already-committed entry leaves that entry in the
        // index untouched and retrievable for the whole upload — `put_inner`
        // writes the new blob under a fresh random suffix alongside the old
        // one, so only the extra budget beyond what the old entry already
        // occupies needs reserving, and only the final `add` (once the new
        // blob exists) replaces the old entry and queues its file for
        // eviction. This is what keeps a failed overwrite from losing the
        // still-valid original, as opposed to reserving the full size and
        // racing the old entry out of the index before the new one is ready.
        let reserved_extra = {
            let mut idx = state.index.lock();
            match idx.get(&key).cloned() {
                Some(existing) if !existing.reserved => {
                    let extra = sizing_size_on_disk.saturating_sub(existing.size_on_disk);
                    match idx.reserve(extra) {
                        Ok(true) => extra,
                        Ok(false) => return Err(CacheError::LoadShedding),
                        Err(e) => return Err(e),
                    }
                }
                Some(_) => {
                    // A placeholder already occupies this key (another
                    // upload in flight, or a Get's proxy-miss marker);
                    // drain and discard this duplicate body rather than
                    // racing it.
                    drop(idx);
                    return drain_and_discard(&mut reader).await;
                }
                None => match idx.reserve(sizing_size_on_disk) {
                    Ok(true) => sizing_size_on_disk,
                    Ok(false) => return Err(CacheError::LoadShedding),
                    Err(e) => return Err(e),
                },
            }
        };

        let result = self.put_inner(kind, digest_fn, hash, size, &mut reader).await;

        match result {
            Ok((random, size_on_disk)) => {
                let item = LruItem { size, size_on_disk, random, legacy: false, reserved: false };
                {
                    let mut idx = state.index.lock();
                    idx.add(key.clone(), item)?;
                    idx.unreserve(reserved_extra)?;
                }
                self.spawn_proxy_upload(kind, digest_fn, hash, size, size_on_disk);
                Ok(())
            }
            Err(e) => {
                let mut idx = state.index.lock();
                let _ = idx.unreserve(reserved_extra);
                Err(e)
            }
        }
    }

    async fn put_inner(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: u64,
        reader: &mut (impl AsyncRead + Unpin + Send),
    ) -> CacheResult<(String, u64)> {
        let bucket_dir = self.bucket_dir(kind, hash);
        tokio::fs::create_dir_all(&bucket_dir).await?;
        let base = bucket_dir.join(hash);
        let (file, temp_path, random) = self.minter.mint(&base).await?;

        let size_on_disk = if kind.is_compressible() {
            let mut writer = ChunkedWriter::create(
                file,
                size,
                self.config.chunk_size,
                true,
                digest_fn,
                Some(hash.to_string()),
            )
            .await?;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                writer.write(&buf[..n]).await?;
            }
            let result = writer.finish().await;
            let result = match result {
                Ok(r) => r,
                Err(e) => {
                    let _ = tokio::fs::remove_file(&temp_path).await;
                    return Err(e);
                }
            };
            result.size_on_disk
        } else {
            // AC and RAW are the unchecked keyspaces (spec.md §3): the hash
            // is only ever a lookup key here, never verified against content.
            let mut file = file;
            let mut written = 0u64;
            let mut buf = vec![0u8; 64 * 1024];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                file.write_all(&buf[..n]).await?;
                written += n as u64;
            }
            if written != size {
                let _ = tokio::fs::remove_file(&temp_path).await;
                return Err(CacheError::IntegrityFailure(format!(
                    "declared size {size} but received {written} bytes"
                )));
            }
            file.sync_all().await?;
            written
        };

        TempfileMinter::clear_wip_bit(&temp_path).await?;

        // Embed the logical size in the filename so a restart can recover
        // it without decoding the codec header of every compressed CAS blob
        // just to rebuild the LRU.
        let final_name = format!("{hash}-{size}-{random}");
        let final_path = bucket_dir.join(final_name);
        if let Err(e) = tokio::fs::rename(&temp_path, &final_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(CacheError::Io(e));
        }

        Ok((random, round_up_4k(size_on_disk)))
    }

    /// Read `(kind, hash, size)` starting at `offset`. `size < 0` means
    /// "don't check, whatever's on disk".
    pub async fn get(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
        offset: u64,
    ) -> CacheResult<Option<GetResult>> {
        let digest = Digest::new(hash.to_string(), size.max(0));
        if size == 0 && digest.is_empty_blob(digest_fn) {
            return Ok(Some(GetResult { reader: Box::new(codec::MemReader::new(Vec::new())), size: 0 }));
        }

        let key = lookup_key(kind, hash);
        let state = self.state(kind).clone();

        enum Plan {
            LocalHit(LruItem),
            /// A committed entry exists under this key but its recorded
            /// size doesn't match what the caller asked for; try the proxy
            /// without disturbing the existing (differently-sized) entry.
            TryProxyKeepExisting,
            TryProxy,
            Miss,
        }

        let plan = {
            let mut idx = state.index.lock();
            match idx.get(&key) {
                Some(item) if !item.reserved => {
                    if size >= 0 && item.size != size as u64 {
                        Plan::TryProxyKeepExisting
                    } else {
                        Plan::LocalHit(item.clone())
                    }
                }
                _ => {
                    // Reserve a placeholder so concurrent readers see this
                    // key as in flight while we try the proxy. `NullProxy`
                    // makes this branch a cheap miss when no second tier is
                    // configured, rather than requiring a special case here.
                    idx.add(key.clone(), LruItem::reservation(0))?;
                    Plan::TryProxy
                }
            }
        };

        match plan {
            Plan::LocalHit(item) => {
                let path = self.canonical_path(kind, hash, &item);
                // AC/RAW blobs are written verbatim (no chunk header) by
                // `put_inner`'s non-compressible branch; only CAS goes
                // through the chunked codec, so any non-CAS kind must take
                // the raw-seek route regardless of its (always-false)
                // `legacy` flag.
                let (reader, total) = codec::open_uncompressed(
                    &path,
                    offset,
                    if kind.is_compressible() { Some(item.size) } else { None },
                    item.legacy || !kind.is_compressible(),
                )
                .await?;
                Ok(Some(GetResult { reader: Box::new(reader), size: total }))
            }
            Plan::TryProxyKeepExisting => match self.try_proxy_get(kind, digest_fn, hash, size).await {
                Ok(Some(bytes)) => {
                    let total = bytes.len() as u64;
                    if let Err(e) = self.commit_from_proxy(kind, digest_fn, hash, &bytes).await {
                        warn!(%kind, hash, error = %e, "failed to commit proxy-fetched blob locally");
                    }
                    Ok(Some(GetResult { reader: Box::new(codec::MemReader::new(bytes)), size: total }))
                }
                Ok(None) => Ok(None),
                Err(e) => {
                    warn!(%kind, hash, error = %e, "proxy get failed, treating as miss");
                    Ok(None)
                }
            },
            Plan::TryProxy => match self.try_proxy_get(kind, digest_fn, hash, size).await {
                Ok(Some(bytes)) => {
                    let total = bytes.len() as u64;
                    if let Err(e) = self.commit_from_proxy(kind, digest_fn, hash, &bytes).await {
                        warn!(%kind, hash, error = %e, "failed to commit proxy-fetched blob locally");
                    }
                    Ok(Some(GetResult { reader: Box::new(codec::MemReader::new(bytes)), size: total }))
                }
                Ok(None) => {
                    let mut idx = state.index.lock();
                    idx.remove(&key);
                    Ok(None)
                }
                Err(e) => {
                    let mut idx = state.index.lock();
                    idx.remove(&key);
                    warn!(%kind, hash, error = %e, "proxy get failed, treating as miss");
                    Ok(None)
                }
            },
            Plan::Miss => Ok(None),
        }
    }

    /// CAS-only variant of [`get`](Self::get) that returns the on-disk
    /// zstd-framed stream rather than decompressed bytes, for peers that
    /// want to forward the compressed wire format without a
    /// decompress/recompress round trip. Local hits only: a miss here
    /// does not fall through to the proxy, since the proxy contract is
    /// defined in terms of plain bytes, not our on-disk frame layout.
    pub async fn get_zstd(
        &self,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
        offset: u64,
    ) -> CacheResult<Option<GetResult>> {
        let digest = Digest::new(hash.to_string(), size.max(0));
        if size == 0 && digest.is_empty_blob(digest_fn) {
            return Ok(Some(GetResult { reader: Box::new(codec::MemReader::new(Vec::new())), size: 0 }));
        }

        let key = lookup_key(EntryKind::Cas, hash);
        let item = {
            let mut idx = self.state(EntryKind::Cas).index.lock();
            match idx.get(&key) {
                Some(item) if !item.reserved && (size < 0 || item.size == size as u64) => item.clone(),
                _ => return Ok(None),
            }
        };

        let path = self.canonical_path(EntryKind::Cas, hash, &item);
        let (reader, total) = codec::open_compressed(&path, offset).await?;
        Ok(Some(GetResult { reader: Box::new(reader), size: total }))
    }

    async fn try_proxy_get(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
    ) -> CacheResult<Option<Vec<u8>>> {
        match self.proxy.get(kind, digest_fn, hash, size).await? {
            Some((mut reader, _proxy_size)) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf).await?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }

    async fn commit_from_proxy(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        bytes: &[u8],
    ) -> CacheResult<()> {
        let size = bytes.len() as u64;
        let mut reader = codec::MemReader::new(bytes.to_vec());
        let (random, size_on_disk) = self.put_inner(kind, digest_fn, hash, size, &mut reader).await?;
        let key = lookup_key(kind, hash);
        let mut idx = self.state(kind).index.lock();
        idx.add(key, LruItem { size, size_on_disk, random, legacy: false, reserved: false })?;
        Ok(())
    }

    fn spawn_proxy_upload(&self, kind: EntryKind, digest_fn: DigestFunction, hash: &str, logical_size: u64, size_on_disk: u64) {
        let permit = self.proxy_semaphore.clone().try_acquire_owned();
        let Ok(permit) = permit else {
            warn!(%kind, hash, "proxy upload queue full, dropping");
            return;
        };
        let path = self.canonical_path_best_effort(kind, hash);
        let proxy = self.proxy.clone();
        let hash = hash.to_string();
        tokio::spawn(async move {
            let _permit = permit;
            let file = match tokio::fs::File::open(&path).await {
                Ok(f) => f,
                Err(e) => {
                    warn!(?path, error = %e, "proxy upload: could not reopen committed file");
                    return;
                }
            };
            let reader: ProxyReader = Box::pin(file);
            proxy.put(kind, digest_fn, &hash, logical_size, size_on_disk, reader).await;
        });
    }

    fn canonical_path_best_effort(&self, kind: EntryKind, hash: &str) -> PathBuf {
        let idx = self.state(kind).index.lock();
        let key = lookup_key(kind, hash);
        if let Some(item) = idx.peek_item(&key) {
            self.canonical_path(kind, hash, item)
        } else {
            self.bucket_dir(kind, hash)
        }
    }

    /// Existence check with no bytes transferred.
    pub async fn contains(
        &self,
        kind: EntryKind,
        digest_fn: DigestFunction,
        hash: &str,
        size: i64,
    ) -> CacheResult<(bool, i64)> {
        let digest = Digest::new(hash.to_string(), size.max(0));
        if size == 0 && digest.is_empty_blob(digest_fn) {
            return Ok((true, 0));
        }

        let key = lookup_key(kind, hash);
        {
            let mut idx = self.state(kind).index.lock();
            if let Some(item) = idx.get(&key) {
                if !item.reserved {
                    return Ok((true, item.size as i64));
                }
            }
        }
        match self.proxy.contains(kind, digest_fn, hash, size).await {
            Ok(Some(known_size)) => Ok((true, known_size)),
            Ok(None) => Ok((false, -1)),
            Err(e) => {
                warn!(%kind, hash, error = %e, "proxy contains failed, treating as miss");
                Ok((false, -1))
            }
        }
    }

    /// Batched fan-out: mark every digest already present locally as found,
    /// then dispatch the rest to a bounded worker pool that consults the
    /// proxy. Returns the subset still missing after both passes. This is
    /// always the non-fail-fast variant: a proxy miss never short-circuits
    /// the remaining checks.
    ///
    /// `cancel` is checked between local-lookup batches and between proxy
    /// dispatches; once cancelled, no further batches are scanned and no
    /// further proxy checks are dispatched, and the call returns
    /// [`CacheError::Cancelled`].
    pub async fn find_missing_cas(
        &self,
        digest_fn: DigestFunction,
        digests: Vec<Digest>,
        cancel: &CancellationToken,
    ) -> CacheResult<Vec<Digest>> {
        let mut slots: Vec<Option<Digest>> = digests.into_iter().map(Some).collect();

        for batch in slots.chunks_mut(self.config.find_missing_batch) {
            if cancel.is_cancelled() {
                return Err(CacheError::Cancelled);
            }
            let idx = self.state(EntryKind::Cas).index.lock();
            for slot in batch.iter_mut() {
                if let Some(d) = slot {
                    if d.is_empty_blob(digest_fn) {
                        *slot = None;
                        continue;
                    }
                    let key = lookup_key(EntryKind::Cas, &d.hash);
                    if let Some(item) = idx.peek_item(&key) {
                        if !item.reserved {
                            *slot = None;
                        }
                    }
                }
            }
        }

        let (tx, mut rx) = mpsc::channel::<(usize, Option<Digest>)>(self.config.proxy_queue_depth);
        let remaining: Vec<(usize, Digest)> = slots
            .iter()
            .enumerate()
            .filter_map(|(i, d)| d.clone().map(|d| (i, d)))
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.proxy_workers.max(1)));
        let mut join_set = tokio::task::JoinSet::new();
        let mut cancelled = false;
        for (i, digest) in remaining {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let proxy = self.proxy.clone();
            let tx = tx.clone();
            let sem = semaphore.clone();
            join_set.spawn(async move {
                let _permit = sem.acquire_owned().await;
                let result = proxy.contains(EntryKind::Cas, digest_fn, &digest.hash, digest.size).await;
                let keep = match result {
                    Ok(Some(_)) => None,
                    Ok(None) => Some(digest),
                    Err(e) => {
                        warn!(hash = %digest.hash, error = %e, "proxy contains failed during FindMissing");
                        Some(digest)
                    }
                };
                let _ = tx.send((i, keep)).await;
            });
        }
        drop(tx);
        while let Some((i, keep)) = rx.recv().await {
            slots[i] = keep;
        }
        while join_set.join_next().await.is_some() {}

        if cancelled {
            return Err(CacheError::Cancelled);
        }

        Ok(slots.into_iter().flatten().collect())
    }

    /// Decode an AC entry and validate every CAS reference it transitively
    /// makes — output files, each output directory's `Tree` and everything
    /// nested in it, and stdout/stderr — is still present. A stale entry
    /// (any missing reference) is reported as not found rather than
    /// returned. Uses the internal fail-fast check (first miss aborts the
    /// rest), which is only reachable from here: `FindMissingCAS` itself
    /// stays non-fail-fast per its public contract.
    pub async fn get_validated_action_result(
        &self,
        digest_fn: DigestFunction,
        hash: &str,
    ) -> CacheResult<Option<(ActionResult, Vec<u8>)>> {
        let Some(result) = self.get(EntryKind::Ac, digest_fn, hash, -1, 0).await? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        let mut reader = result.reader;
        reader.read_to_end(&mut bytes).await?;

        let action_result = match ActionResult::decode(&bytes) {
            Ok(r) => r,
            Err(_) => return Ok(None),
        };

        for digest in action_result.referenced_digests() {
            if !self.cas_present_fail_fast(digest_fn, &digest).await? {
                return Ok(None);
            }
        }

        for output_dir in &action_result.output_directories {
            let Some(tree) = self.fetch_tree(digest_fn, &output_dir.tree_digest).await? else {
                return Ok(None);
            };
            for digest in ActionResult::tree_referenced_digests(&tree) {
                if !self.cas_present_fail_fast(digest_fn, &digest).await? {
                    return Ok(None);
                }
            }
        }

        Ok(Some((action_result, bytes)))
    }

    /// `Contains`, but treats proxy/I/O errors the same as a miss and stops
    /// at the first `false` — a fail-fast variant used only by
    /// [`get_validated_action_result`](Self::get_validated_action_result),
    /// where one missing reference already dooms the whole entry.
    async fn cas_present_fail_fast(&self, digest_fn: DigestFunction, digest: &Digest) -> CacheResult<bool> {
        let (found, _) = self.contains(EntryKind::Cas, digest_fn, &digest.hash, digest.size).await?;
        Ok(found)
    }

    /// Fetch and decode a `Tree` referenced by an output directory's digest.
    async fn fetch_tree(
        &self,
        digest_fn: DigestFunction,
        tree_digest: &Digest,
    ) -> CacheResult<Option<crate::action_result::Tree>> {
        let Some(result) = self.get(EntryKind::Cas, digest_fn, &tree_digest.hash, tree_digest.size, 0).await? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        let mut reader = result.reader;
        reader.read_to_end(&mut bytes).await?;
        match serde_json::from_slice(&bytes) {
            Ok(tree) => Ok(Some(tree)),
            Err(_) => Ok(None),
        }
    }
}

fn filename_for(hash: &str, item: &LruItem) -> String {
    if item.legacy {
        // Legacy entries predate logical-size tracking in the filename;
        // the loader falls back to `stat().len()` for these.
        format!("{hash}-{}.v1", item.random)
    } else {
        format!("{hash}-{}-{}", item.size, item.random)
    }
}

fn canonical_path_for_key(root: &Path, key: &str, item: &LruItem) -> PathBuf {
    let (kind_str, hash) = key.split_once('/').expect("lookup keys are always \"<kind>/<hash>\"");
    let kind = match kind_str {
        "cas" => EntryKind::Cas,
        "ac" => EntryKind::Ac,
        _ => EntryKind::Raw,
    };
    root.join(kind.dir_name()).join(crate::util::bucket(hash)).join(filename_for(hash, item))
}

/// Read `reader` to exhaustion without keeping any of it, for the duplicate-
/// upload case in [`DiskCache::put`](DiskCache::put) where a key is already
/// reserved by another in-flight Put and the body has nowhere to go.
async fn drain_and_discard(reader: &mut (impl AsyncRead + Unpin + Send)) -> CacheResult<()> {
    let mut sink = [0u8; 8192];
    loop {
        let n = reader.read(&mut sink).await?;
        if n == 0 {
            break;
        }
    }
    Ok(())
}
