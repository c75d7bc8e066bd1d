use crate::{Result, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to a uniquely named `.tmp` sibling and rename it over `path`, so readers never
/// observe a partially written file. Concurrent writers of one path each get their own tmp file.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, bytes).await?;
    if let Err(err) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(err.into());
    }
    Ok(())
}

pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}

/// Strict read: `Ok(None)` when absent, `CacheReadCorrupt` when unparsable.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| StoreError::CacheReadCorrupt {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Tolerant read used for caches and indexes: absent or corrupt files degrade to the default
/// value. Corruption is logged; the next successful write repairs the file.
pub async fn read_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match read_json(path).await {
        Ok(value) => Ok(value.unwrap_or_default()),
        Err(err @ StoreError::CacheReadCorrupt { .. }) => {
            log::warn!("{err}; treating it as empty");
            Ok(T::default())
        }
        Err(err) => Err(err),
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("state");
    let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{name}.tmp-{}-{seq}", std::process::id()))
}

/// Readable, collision-free file stem for an arbitrary key.
#[must_use]
pub fn file_stem_for_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    let short: String = digest
        .iter()
        .take(6)
        .map(|b| format!("{b:02x}"))
        .collect();
    let mut safe: String = key
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if safe.is_empty() {
        safe.push('_');
    }
    format!("{safe}-{short}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[tokio::test]
    async fn atomic_write_leaves_no_tmp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.json");
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1u64);

        write_json_atomic(&path, &map).await.unwrap();

        let loaded: BTreeMap<String, u64> = read_json_or_default(&path).await.unwrap();
        assert_eq!(loaded, map);
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path().join("nested"))
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_of_one_path_all_succeed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shared.json");
        let payload = "x".repeat(64 * 1024);

        let mut tasks = tokio::task::JoinSet::new();
        for writer in 0..16u64 {
            let path = path.clone();
            let payload = payload.clone();
            tasks.spawn(async move {
                let mut map = BTreeMap::new();
                map.insert(format!("w{writer}"), payload);
                write_json_atomic(&path, &map).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        let stored: BTreeMap<String, String> = read_json(&path).await.unwrap().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored.values().next().unwrap().len(), payload.len());
    }

    #[tokio::test]
    async fn corrupt_file_reads_as_default_and_strict_read_reports_it() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let loaded: BTreeMap<String, u64> = read_json_or_default(&path).await.unwrap();
        assert!(loaded.is_empty());

        let strict = read_json::<BTreeMap<String, u64>>(&path).await;
        assert!(matches!(strict, Err(StoreError::CacheReadCorrupt { .. })));
    }

    #[tokio::test]
    async fn missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let loaded = read_json::<BTreeMap<String, u64>>(&tmp.path().join("absent.json"))
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn file_stems_are_safe_and_distinct() {
        let a = file_stem_for_key("USA/Econ/Tax");
        let b = file_stem_for_key("USA_Econ_Tax");
        assert!(a.starts_with("USA_Econ_Tax-"));
        assert_ne!(a, b);
        assert!(!file_stem_for_key("").is_empty());
    }
}
