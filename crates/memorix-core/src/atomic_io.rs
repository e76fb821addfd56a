//! Cross-process advisory locking and atomic writes (§4.A). No teacher file
//! implements cross-process locking directly — the teacher is single-process
//! per vault — so this is built from primitives the teacher already uses
//! elsewhere: `tokio::fs` for async I/O and a temp-then-rename write, the
//! pattern `sync-daemon/persistence.rs` uses synchronously, generalized here
//! to async and to a same-directory, pid-qualified temp name.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::error::{MemorixError, MemorixResult};

const RETRY_DELAY: Duration = Duration::from_millis(50);
const MAX_ATTEMPTS: u32 = 60;
const STALE_AFTER: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct LockContents {
    pid: u32,
    time: String,
}

/// Acquire the advisory lock at `lock_path`, retrying past stale or
/// contended locks, per §4.A's timing budget (≈3s across 60 retries).
pub async fn acquire(lock_path: &Path) -> MemorixResult<()> {
    for attempt in 0..MAX_ATTEMPTS {
        match try_create(lock_path).await {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                if is_stale(lock_path).await {
                    warn!(path = %lock_path.display(), "removing stale lock");
                    let _ = tokio::fs::remove_file(lock_path).await;
                    continue;
                }
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                return Err(MemorixError::io("acquire lock", lock_path, err));
            }
        }
        let _ = attempt;
    }

    // Final force-unlink-then-create attempt.
    let _ = tokio::fs::remove_file(lock_path).await;
    match try_create(lock_path).await {
        Ok(()) => Ok(()),
        Err(_) => Err(MemorixError::LockTimeout {
            path: lock_path.to_path_buf(),
            attempts: MAX_ATTEMPTS,
        }),
    }
}

/// Best-effort release; a missing lock is not an error.
pub async fn release(lock_path: &Path) {
    let _ = tokio::fs::remove_file(lock_path).await;
}

/// Run `action` while holding the lock at `<dir>/.memorix.lock`, releasing on
/// every exit path including the action returning an error.
pub async fn with_lock<F, Fut, T>(dir: &Path, action: F) -> MemorixResult<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = MemorixResult<T>>,
{
    let lock_path = dir.join(".memorix.lock");
    acquire(&lock_path).await?;
    let result = action().await;
    release(&lock_path).await;
    result
}

/// Write `data` atomically: write to a pid-qualified temp file in the same
/// directory, then rename. Callers must not use this across filesystems.
pub async fn atomic_write(path: &Path, data: &[u8]) -> MemorixResult<()> {
    let pid = std::process::id();
    let tmp_path = append_extension(path, &format!("tmp.{pid}"));
    tokio::fs::write(&tmp_path, data)
        .await
        .map_err(|e| MemorixError::io("write temp file", &tmp_path, e))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| MemorixError::io("rename into place", path, e))?;
    Ok(())
}

async fn try_create(lock_path: &Path) -> io::Result<()> {
    let contents = LockContents {
        pid: std::process::id(),
        time: chrono::Utc::now().to_rfc3339(),
    };
    let bytes = serde_json::to_vec(&contents).unwrap_or_default();
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
        .await?;
    use tokio::io::AsyncWriteExt;
    file.write_all(&bytes).await?;
    Ok(())
}

async fn is_stale(lock_path: &Path) -> bool {
    match tokio::fs::metadata(lock_path).await {
        Ok(meta) => match meta.modified() {
            Ok(mtime) => mtime.elapsed().map(|age| age > STALE_AFTER).unwrap_or(false),
            Err(_) => false,
        },
        Err(_) => true,
    }
}

fn append_extension(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn acquire_then_release_allows_reacquisition() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join(".memorix.lock");
        acquire(&lock).await.unwrap();
        assert!(lock.exists());
        release(&lock).await;
        assert!(!lock.exists());
        acquire(&lock).await.unwrap();
        release(&lock).await;
    }

    #[tokio::test]
    async fn with_lock_releases_on_error() {
        let dir = TempDir::new().unwrap();
        let result: MemorixResult<()> = with_lock(dir.path(), || async {
            Err(MemorixError::Conflict("boom".into()))
        })
        .await;
        assert!(result.is_err());
        assert!(!dir.path().join(".memorix.lock").exists());
    }

    #[tokio::test]
    async fn is_stale_is_false_for_a_freshly_created_lock() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join(".memorix.lock");
        tokio::fs::write(&lock, b"{}").await.unwrap();
        assert!(!is_stale(&lock).await);
    }

    #[tokio::test]
    async fn is_stale_is_true_for_a_missing_lock() {
        let dir = TempDir::new().unwrap();
        let lock = dir.path().join("nonexistent.lock");
        assert!(is_stale(&lock).await);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_temp_file_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("observations.json");
        atomic_write(&path, b"[]").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"[]");
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name());
        }
        assert_eq!(names, vec![std::ffi::OsString::from("observations.json")]);
    }
}
