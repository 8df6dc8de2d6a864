//! Produces unique sibling temp paths next to a canonical blob path, and
//! marks them in-progress via a mode bit so a crash mid-upload leaves behind
//! an unambiguous "still being written" marker rather than a file that looks
//! committed.
//!
//! We borrow the setgid bit as the work-in-progress sentinel, same as the
//! design calls for: it's a bit nothing else in this subtree ever sets, and
//! clearing it is a single `chmod` the caller issues once the upload is
//! fully flushed to disk.

use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use rand::{Rng, SeedableRng};
use tokio::fs::File;

use crate::error::{CacheError, CacheResult};

/// The setgid bit, used as the in-progress sentinel on minted temp files.
const WIP_MODE_BIT: u32 = 0o2000;

const MAX_ATTEMPTS: u32 = 10_000;

/// A cheap, non-cryptographic linear congruential generator. We don't need
/// unpredictability here, only a fast, low-allocation stream of suffixes
/// that's vanishingly unlikely to collide with a concurrent uploader's.
/// Constants are the classic Numerical Recipes LCG parameters.
struct Lcg {
    state: u64,
}

impl Lcg {
    fn seeded() -> Self {
        let seed = rand::rngs::StdRng::from_entropy().gen::<u64>();
        Self { state: seed | 1 }
    }

    fn next(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.state
    }

    fn next_suffix(&mut self) -> String {
        format!("{:016x}", self.next())
    }
}

/// Mints unique sibling temp files next to a canonical CAS/AC/RAW path.
pub struct TempfileMinter {
    lcg: std::sync::Mutex<Lcg>,
}

impl Default for TempfileMinter {
    fn default() -> Self {
        Self::new()
    }
}

impl TempfileMinter {
    pub fn new() -> Self {
        Self { lcg: std::sync::Mutex::new(Lcg::seeded()) }
    }

    /// Produce a writable temp file sibling to `base`, returning the open
    /// handle, its path, and the random suffix used (callers embed the
    /// suffix in the final canonical filename on commit).
    ///
    /// `legacy` only affects the suffix the caller later uses to build the
    /// canonical name (`.v1` for uncompressed legacy CAS); the minter itself
    /// doesn't care about the distinction.
    pub async fn mint(&self, base: &Path) -> CacheResult<(File, PathBuf, String)> {
        let dir = base.parent().ok_or_else(|| {
            CacheError::Internal(format!("temp path {base:?} has no parent directory"))
        })?;
        let stem = base
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CacheError::Internal(format!("temp path {base:?} has no filename")))?;

        for _ in 0..MAX_ATTEMPTS {
            let suffix = {
                let mut lcg = self.lcg.lock().unwrap();
                lcg.next_suffix()
            };
            let candidate = dir.join(format!("{stem}-{suffix}.tmp"));
            let opened = tokio::task::spawn_blocking({
                let candidate = candidate.clone();
                move || {
                    std::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .mode(0o600 | WIP_MODE_BIT)
                        .open(&candidate)
                }
            })
            .await
            .map_err(|e| CacheError::Internal(format!("mint task panicked: {e}")))?;

            match opened {
                Ok(std_file) => {
                    let file = File::from_std(std_file);
                    return Ok((file, candidate, suffix));
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(CacheError::Io(e)),
            }
        }

        Err(CacheError::Internal(format!(
            "exhausted {MAX_ATTEMPTS} attempts minting a temp file next to {base:?}"
        )))
    }

    /// Clear the work-in-progress bit on a file, making it observably
    /// complete. Must be called after the caller has fsynced the file's
    /// contents and before it is renamed to its canonical path.
    pub async fn clear_wip_bit(path: &Path) -> CacheResult<()> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let meta = std::fs::metadata(&path)?;
            let mut perms = meta.permissions();
            perms.set_mode(perms.mode() & !WIP_MODE_BIT);
            std::fs::set_permissions(&path, perms)
        })
        .await
        .map_err(|e| CacheError::Internal(format!("chmod task panicked: {e}")))??;
        Ok(())
    }

    /// Whether a file at `path` still carries the in-progress sentinel.
    pub fn is_work_in_progress(meta: &std::fs::Metadata) -> bool {
        meta.permissions().mode() & WIP_MODE_BIT != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mints_unique_siblings_and_clears_wip_bit() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("ab").join("abcdef-123-0000000000000000");
        tokio::fs::create_dir_all(base.parent().unwrap()).await.unwrap();

        let minter = TempfileMinter::new();
        let (file, path, suffix1) = minter.mint(&base).await.unwrap();
        drop(file);
        let (file2, path2, suffix2) = minter.mint(&base).await.unwrap();
        drop(file2);

        assert_ne!(path, path2);
        assert_ne!(suffix1, suffix2);

        let meta = tokio::fs::metadata(&path).await.unwrap();
        assert!(TempfileMinter::is_work_in_progress(&meta));

        TempfileMinter::clear_wip_bit(&path).await.unwrap();
        let meta = tokio::fs::metadata(&path).await.unwrap();
        assert!(!TempfileMinter::is_work_in_progress(&meta));
    }
}
