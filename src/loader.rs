//! Startup directory-skeleton creation, legacy-layout migration, and the
//! parallel scan that rebuilds the LRU from whatever is already on disk.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CacheResult;
use crate::kind::EntryKind;
use crate::lru_index::LruItem;
use crate::util::{bucket, round_up_4k};

const HEX_CHARS: &str = "0123456789abcdef";

fn filename_regex() -> Regex {
    // `<hash>(-<logicalSize>)?-<rand>(\.v1)?`
    Regex::new(r"^(?P<hash>[0-9a-f]+)(?:-(?P<size>\d+))?-(?P<rand>[0-9a-f]+)(?P<legacy>\.v1)?$").unwrap()
}

/// Create the 256 two-hex-character bucket subdirectories for `kind` under
/// `root`, if they don't already exist.
pub async fn create_skeleton(root: &Path, kind: EntryKind) -> CacheResult<()> {
    let base = root.join(kind.dir_name());
    tokio::fs::create_dir_all(&base).await?;
    for a in HEX_CHARS.chars() {
        for b in HEX_CHARS.chars() {
            let dir = base.join(format!("{a}{b}"));
            tokio::fs::create_dir_all(&dir).await?;
        }
    }
    Ok(())
}

/// Rename-only migration from the v0 (flat) or v1 (bucketed, unsuffixed)
/// layouts into the current `<kind>.v2/<bucket>/<hash>-<rand>[.v1]` layout.
/// No data is rewritten; CAS files migrated this way are legacy
/// (uncompressed) blobs, so they're suffixed `.v1`.
pub async fn migrate_legacy_layout(root: &Path, kind: EntryKind) -> CacheResult<usize> {
    let legacy_dir = root.join(kind.legacy_dir_name());
    if !legacy_dir.is_dir() {
        return Ok(0);
    }

    // v0 is flat (`<kind>/<hash>`) and v1 is one level of hash-prefix
    // buckets (`<kind>/<hash[:2]>/<hash>`); either way every regular file
    // under the legacy root, at whatever depth, is a blob to migrate.
    // `WalkDir` (rather than hand-rolled recursion) doesn't follow symlinks
    // by default, so a symlink left behind by an older layout is skipped
    // rather than migrated twice.
    let files: Vec<PathBuf> = tokio::task::spawn_blocking({
        let legacy_dir = legacy_dir.clone();
        move || {
            WalkDir::new(&legacy_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .collect()
        }
    })
    .await
    .map_err(|e| crate::error::CacheError::Internal(format!("migration walk task panicked: {e}")))?;

    let mut migrated = 0usize;
    for path in files {
        let meta = tokio::fs::metadata(&path).await?;
        migrated += migrate_one(root, kind, &path, &meta).await?;
    }

    Ok(migrated)
}

async fn migrate_one(
    root: &Path,
    kind: EntryKind,
    path: &Path,
    meta: &std::fs::Metadata,
) -> CacheResult<usize> {
    if !meta.is_file() {
        return Ok(0);
    }
    let Some(hash) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(0);
    };
    if hash == "lost+found" {
        return Ok(0);
    }

    let rand = random_suffix();
    let suffix = if kind.is_compressible() { ".v1" } else { "" };
    let dest_name = format!("{hash}-{rand}{suffix}");
    let dest_dir = root.join(kind.dir_name()).join(bucket(hash));
    tokio::fs::create_dir_all(&dest_dir).await?;
    let dest = dest_dir.join(dest_name);

    match tokio::fs::rename(path, &dest).await {
        Ok(()) => Ok(1),
        Err(e) => {
            warn!(?path, ?dest, error = %e, "failed to migrate legacy entry");
            Ok(0)
        }
    }
}

fn random_suffix() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// One file discovered during the startup scan.
#[derive(Debug, Clone)]
pub struct ScannedEntry {
    pub kind: EntryKind,
    pub hash: String,
    pub item: LruItem,
    pub atime: SystemTime,
    pub path: PathBuf,
}

/// Walk `<kind>.v2/??/` in parallel, parsing filenames and collecting
/// `(entry, atime)` tuples. Worker count is `min(16, max(4, numCPUs))`.
pub async fn scan_kind(root: &Path, kind: EntryKind) -> CacheResult<Vec<ScannedEntry>> {
    let base = root.join(kind.dir_name());
    if !base.is_dir() {
        return Ok(Vec::new());
    }

    let buckets: Vec<PathBuf> = {
        let mut entries = tokio::fs::read_dir(&base).await?;
        let mut v = Vec::new();
        while let Some(e) = entries.next_entry().await? {
            if e.metadata().await?.is_dir() {
                v.push(e.path());
            }
        }
        v
    };

    let workers = (num_cpus::get().max(4)).min(16).max(1);
    let re = std::sync::Arc::new(filename_regex());
    let results = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));

    let chunk_size = buckets.len().div_ceil(workers).max(1);
    let mut handles = Vec::new();
    for chunk in buckets.chunks(chunk_size) {
        let chunk = chunk.to_vec();
        let re = re.clone();
        let results = results.clone();
        handles.push(tokio::spawn(async move {
            let mut local = Vec::new();
            for dir in chunk {
                if let Err(e) = scan_bucket(&dir, kind, &re, &mut local).await {
                    warn!(?dir, error = %e, "failed scanning bucket");
                }
            }
            results.lock().await.extend(local);
        }));
    }
    for h in handles {
        let _ = h.await;
    }

    let mut out = std::sync::Arc::try_unwrap(results).unwrap().into_inner();
    out.sort_by_key(|e: &ScannedEntry| e.atime);
    Ok(out)
}

async fn scan_bucket(
    dir: &Path,
    kind: EntryKind,
    re: &Regex,
    out: &mut Vec<ScannedEntry>,
) -> CacheResult<()> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if name == "lost+found" {
            continue;
        }
        let Some(caps) = re.captures(name) else {
            debug!(?path, "skipping unparseable filename");
            continue;
        };
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }

        let hash = caps["hash"].to_string();
        let legacy = caps.name("legacy").is_some();
        let size_on_disk = round_up_4k(meta.len());
        let logical_size = caps
            .name("size")
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(meta.len());
        let random = caps["rand"].to_string();
        let atime = meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH);

        out.push(ScannedEntry {
            kind,
            hash,
            item: LruItem { size: logical_size, size_on_disk, random, legacy, reserved: false },
            atime,
            path,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_skeleton_makes_256_buckets() {
        let dir = tempfile::tempdir().unwrap();
        create_skeleton(dir.path(), EntryKind::Cas).await.unwrap();
        let base = dir.path().join("cas.v2");
        let mut count = 0;
        let mut entries = tokio::fs::read_dir(&base).await.unwrap();
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 256);
    }

    #[tokio::test]
    async fn migrate_v0_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("cas");
        tokio::fs::create_dir_all(&legacy).await.unwrap();
        tokio::fs::write(legacy.join("abcdef0123"), b"data").await.unwrap();

        let n = migrate_legacy_layout(dir.path(), EntryKind::Cas).await.unwrap();
        assert_eq!(n, 1);

        let bucket_dir = dir.path().join("cas.v2").join("ab");
        tokio::fs::create_dir_all(&bucket_dir).await.unwrap();
        let mut found = false;
        let mut entries = tokio::fs::read_dir(&bucket_dir).await.unwrap();
        while let Some(e) = entries.next_entry().await.unwrap() {
            let name = e.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("abcdef0123-") && name.ends_with(".v1") {
                found = true;
            }
        }
        assert!(found);
    }

    #[tokio::test]
    async fn scan_parses_committed_and_legacy_filenames() {
        let dir = tempfile::tempdir().unwrap();
        create_skeleton(dir.path(), EntryKind::Cas).await.unwrap();
        let bucket_dir = dir.path().join("cas.v2").join("ab");
        tokio::fs::write(bucket_dir.join("abcdef01-4-00000001"), b"abcd").await.unwrap();
        tokio::fs::write(bucket_dir.join("abcdef02-00000002.v1"), b"xy").await.unwrap();

        let scanned = scan_kind(dir.path(), EntryKind::Cas).await.unwrap();
        assert_eq!(scanned.len(), 2);
        let legacy_entry = scanned.iter().find(|e| e.hash == "abcdef02").unwrap();
        assert!(legacy_entry.item.legacy);
        let sized_entry = scanned.iter().find(|e| e.hash == "abcdef01").unwrap();
        assert_eq!(sized_entry.item.size, 4);
    }
}
