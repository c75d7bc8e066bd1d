use crate::{Result, RollupError};
use fs2::FileExt;
use std::path::{Path, PathBuf};
use std::time::Instant;

const LOCK_FILE: &str = "rollup.lock";

/// Advisory cross-process lock held while rollup files are rewritten. Released on drop.
pub(crate) struct RollupWriteLock {
    file: std::fs::File,
}

impl Drop for RollupWriteLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

pub(crate) fn lock_path(dir: &Path) -> PathBuf {
    dir.join(LOCK_FILE)
}

pub(crate) async fn acquire_rollup_write_lock(dir: &Path) -> Result<RollupWriteLock> {
    tokio::fs::create_dir_all(dir).await?;
    let path = lock_path(dir);

    tokio::task::spawn_blocking(move || -> Result<RollupWriteLock> {
        use std::fs::OpenOptions;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| RollupError::Lock(format!("open {}: {err}", path.display())))?;

        let start = Instant::now();
        file.lock_exclusive()
            .map_err(|err| RollupError::Lock(format!("acquire {}: {err}", path.display())))?;
        let waited = start.elapsed();
        if waited.as_millis() > 0 {
            log::debug!("waited {}ms for {}", waited.as_millis(), path.display());
        }

        Ok(RollupWriteLock { file })
    })
    .await
    .map_err(|err| RollupError::Lock(format!("join lock task: {err}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn lock_is_reacquirable_after_drop() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("rollups");
        let first = acquire_rollup_write_lock(&dir).await.unwrap();
        assert!(lock_path(&dir).exists());
        drop(first);
        let _second = acquire_rollup_write_lock(&dir).await.unwrap();
    }
}
