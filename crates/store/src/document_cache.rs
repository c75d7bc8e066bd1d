use crate::json_io::{file_stem_for_key, read_json_or_default, write_json_atomic};
use crate::{Result, StoreError, SyncConfig};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

type NamespaceMap = BTreeMap<String, serde_json::Value>;

/// Keyed JSON cache: one file per namespace, mapping id -> previously computed summary.
///
/// Writes rewrite the whole namespace file (tmp + rename). Rewrites through one cache (and its
/// clones) are serialized, so concurrent puts to a namespace keep each other's entries.
/// Separate processes are not coordinated; cached values are deterministic, so the last
/// writer wins.
#[derive(Clone, Debug)]
pub struct DocumentCache {
    dir: PathBuf,
    writer: Arc<TokioMutex<()>>,
}

impl DocumentCache {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            dir: config.document_cache_dir(),
            writer: Arc::new(TokioMutex::new(())),
        }
    }

    #[must_use]
    pub fn namespace_path(&self, namespace: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", file_stem_for_key(namespace)))
    }

    async fn load(&self, namespace: &str) -> Result<NamespaceMap> {
        read_json_or_default(&self.namespace_path(namespace)).await
    }

    /// All decodable entries of a namespace.
    pub async fn entries<T: DeserializeOwned>(&self, namespace: &str) -> Result<BTreeMap<String, T>> {
        let map = self.load(namespace).await?;
        Ok(map
            .into_iter()
            .filter_map(|(key, value)| decode_entry(namespace, &key, value).map(|v| (key, v)))
            .collect())
    }

    pub async fn get<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<T>> {
        let mut map = self.load(namespace).await?;
        Ok(map
            .remove(key)
            .and_then(|value| decode_entry(namespace, key, value)))
    }

    pub async fn put<T: Serialize>(&self, namespace: &str, key: &str, value: &T) -> Result<()> {
        self.put_batch(namespace, [(key.to_string(), value)]).await
    }

    /// Merge `entries` into the namespace with a single file rewrite.
    pub async fn put_batch<'a, T, I>(&self, namespace: &str, entries: I) -> Result<()>
    where
        T: Serialize + 'a,
        I: IntoIterator<Item = (String, &'a T)>,
    {
        let mut fresh = Vec::new();
        for (key, value) in entries {
            fresh.push((key, serde_json::to_value(value)?));
        }
        if fresh.is_empty() {
            return Ok(());
        }
        let added = fresh.len();

        let _writer = self.writer.lock().await;
        let mut map = self.load(namespace).await?;
        map.extend(fresh);
        write_json_atomic(&self.namespace_path(namespace), &map).await?;
        log::debug!("document cache {namespace}: wrote {added} entries ({} total)", map.len());
        Ok(())
    }

    /// Read-through lookup: on a miss run `compute` and persist its result.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        namespace: &str,
        key: &str,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        E: From<StoreError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(namespace, key).await? {
            return Ok(hit);
        }
        let value = compute().await?;
        self.put(namespace, key, &value).await?;
        Ok(value)
    }

    pub async fn remove_namespace(&self, namespace: &str) -> Result<()> {
        match tokio::fs::remove_file(self.namespace_path(namespace)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

fn decode_entry<T: DeserializeOwned>(namespace: &str, key: &str, value: serde_json::Value) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(err) => {
            log::warn!("document cache {namespace}: entry {key} does not decode ({err}); ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Summary {
        title: String,
        total: f64,
    }

    fn cache(tmp: &TempDir) -> DocumentCache {
        DocumentCache::new(&SyncConfig::with_home(tmp.path()))
    }

    #[tokio::test]
    async fn put_batch_merges_into_existing_namespace() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let a = Summary {
            title: "a".into(),
            total: 1.0,
        };
        let b = Summary {
            title: "b".into(),
            total: 2.0,
        };
        cache.put("USA/Econ", "p1", &a).await.unwrap();
        cache
            .put_batch("USA/Econ", [("p2".to_string(), &b)])
            .await
            .unwrap();

        let entries: BTreeMap<String, Summary> = cache.entries("USA/Econ").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries["p1"], a);
        assert_eq!(cache.get::<Summary>("USA/Econ", "p2").await.unwrap(), Some(b));
        assert_eq!(cache.get::<Summary>("USA/Other", "p2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_namespace_is_a_miss_and_is_repaired_by_put() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        let path = cache.namespace_path("ns");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, b"[[[").await.unwrap();

        assert_eq!(cache.get::<Summary>("ns", "k").await.unwrap(), None);

        let value = Summary {
            title: "fixed".into(),
            total: 3.0,
        };
        cache.put("ns", "k", &value).await.unwrap();
        assert_eq!(cache.get::<Summary>("ns", "k").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn undecodable_entry_is_treated_as_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = cache(&tmp);
        cache.put("ns", "k", &serde_json::json!({"title": 5})).await.unwrap();
        assert_eq!(cache.get::<Summary>("ns", "k").await.unwrap(), None);
    }
}
