use crate::json_io::{file_stem_for_key, read_json, write_atomic, write_json_atomic};
use crate::limits::FetchLimiter;
use crate::{Result, StoreError, SyncConfig};
use govsync_protocol::{Chunk, ChunkRef, Ledger};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinSet;

/// One fetched chunk persisted while its document is being reassembled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ScratchChunk {
    /// Reference the chunk was read from; a mismatch marks the file as stale.
    reference: ChunkRef,
    chunk: Chunk,
}

/// Reassembles chunked ledger documents and keeps a byte-identical copy on disk per root.
///
/// A root is read from the ledger at most once: completed documents are served from
/// `chunks/documents`, and an interrupted fetch resumes from the per-chunk scratch files in
/// `chunks/scratch/<root>/`.
pub struct ChunkStore {
    ledger: Arc<dyn Ledger>,
    scratch_dir: PathBuf,
    document_dir: PathBuf,
    max_chunks: usize,
    limiter: FetchLimiter,
    in_flight: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
}

/// Releases the per-root in-flight entry, even when the fetching future is dropped.
struct InFlightGuard<'a> {
    store: &'a ChunkStore,
    key: String,
    gate: Arc<TokioMutex<()>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut map = self
            .store
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // One reference lives in the map, one in this guard.
        if Arc::strong_count(&self.gate) <= 2 {
            map.remove(&self.key);
        }
    }
}

impl ChunkStore {
    pub fn new(config: &SyncConfig, ledger: Arc<dyn Ledger>) -> Self {
        Self::with_limiter(config, ledger, FetchLimiter::new(config.fetch_concurrency))
    }

    /// Share a fetch budget with other components.
    pub fn with_limiter(config: &SyncConfig, ledger: Arc<dyn Ledger>, limiter: FetchLimiter) -> Self {
        Self {
            ledger,
            scratch_dir: config.chunk_scratch_dir(),
            document_dir: config.chunk_document_dir(),
            max_chunks: config.max_chunks,
            limiter,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn limiter(&self) -> &FetchLimiter {
        &self.limiter
    }

    #[must_use]
    pub fn document_path(&self, root: &ChunkRef) -> PathBuf {
        self.document_dir
            .join(format!("{}.bin", file_stem_for_key(root.as_str())))
    }

    fn scratch_root(&self, root: &ChunkRef) -> PathBuf {
        self.scratch_dir.join(file_stem_for_key(root.as_str()))
    }

    fn scratch_path(&self, root: &ChunkRef, index: usize) -> PathBuf {
        self.scratch_root(root).join(format!("{index}.json"))
    }

    /// The cached document, without touching the ledger.
    pub async fn cached_document(&self, root: &ChunkRef) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.document_path(root)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Full document bytes for the chain starting at `root`.
    pub async fn fetch_document(&self, root: &ChunkRef) -> Result<Vec<u8>> {
        if root.is_empty() {
            return Err(StoreError::CorruptChunkChain {
                root: String::new(),
                reason: "empty root reference".to_string(),
            });
        }
        if let Some(bytes) = self.cached_document(root).await? {
            return Ok(bytes);
        }

        let guard = self.enter(root);
        let _lock = guard.gate.lock().await;
        // A concurrent caller may have finished the same root while we waited.
        if let Some(bytes) = self.cached_document(root).await? {
            log::debug!("document {root} completed by a concurrent fetch");
            return Ok(bytes);
        }
        self.fetch_chain(root).await
    }

    /// Fetch several documents in parallel, bounded by the configured concurrency. Results keep
    /// the input order; one failing root does not affect the others.
    pub async fn fetch_many(
        self: &Arc<Self>,
        roots: Vec<ChunkRef>,
    ) -> Vec<(ChunkRef, Result<Vec<u8>>)> {
        let mut tasks = JoinSet::new();
        for (position, root) in roots.iter().cloned().enumerate() {
            let store = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = store.limiter.acquire().await;
                let result = store.fetch_document(&root).await;
                (position, result)
            });
        }

        let mut results: Vec<Option<Result<Vec<u8>>>> = roots.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, result)) => results[position] = Some(result),
                Err(err) => log::error!("document fetch task failed: {err}"),
            }
        }

        roots
            .into_iter()
            .zip(results)
            .map(|(root, result)| {
                let result = result.unwrap_or_else(|| {
                    Err(StoreError::Other(format!("fetch task for {root} did not complete")))
                });
                (root, result)
            })
            .collect()
    }

    /// Drop scratch files for `root`, forcing the next fetch to start over.
    pub async fn purge_scratch(&self, root: &ChunkRef) -> Result<()> {
        remove_dir_if_present(&self.scratch_root(root)).await
    }

    fn enter(&self, root: &ChunkRef) -> InFlightGuard<'_> {
        let mut map = self
            .in_flight
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let gate = map
            .entry(root.as_str().to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone();
        InFlightGuard {
            store: self,
            key: root.as_str().to_string(),
            gate,
        }
    }

    async fn fetch_chain(&self, root: &ChunkRef) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut seen: HashSet<ChunkRef> = HashSet::new();
        let mut current = Some(root.clone());
        let mut index = 0usize;
        let mut ledger_reads = 0usize;

        while let Some(chunk_ref) = current {
            if index >= self.max_chunks {
                return self
                    .corrupt(root, format!("chain exceeds {} chunks", self.max_chunks))
                    .await;
            }
            if !seen.insert(chunk_ref.clone()) {
                return self
                    .corrupt(root, format!("chunk {chunk_ref} repeats at index {index}"))
                    .await;
            }

            let scratch = self.scratch_path(root, index);
            let chunk = match read_scratch(&scratch, &chunk_ref).await {
                Some(chunk) => chunk,
                None => {
                    let chunk = self.ledger.read_chunk(&chunk_ref).await.map_err(|source| {
                        StoreError::ChunkFetchFailed {
                            root: root.to_string(),
                            index,
                            source,
                        }
                    })?;
                    ledger_reads += 1;
                    let entry = ScratchChunk {
                        reference: chunk_ref.clone(),
                        chunk,
                    };
                    write_json_atomic(&scratch, &entry).await?;
                    entry.chunk
                }
            };

            buffer.extend_from_slice(&chunk.content);
            current = chunk.next_ref().cloned();
            index += 1;
        }

        write_atomic(&self.document_path(root), &buffer).await?;
        remove_dir_if_present(&self.scratch_root(root)).await?;
        log::info!(
            "reassembled document {root}: {index} chunks, {} bytes, {ledger_reads} ledger reads",
            buffer.len()
        );
        Ok(buffer)
    }

    async fn corrupt(&self, root: &ChunkRef, reason: String) -> Result<Vec<u8>> {
        log::warn!("abandoning document {root}: {reason}");
        remove_dir_if_present(&self.scratch_root(root)).await?;
        Err(StoreError::CorruptChunkChain {
            root: root.to_string(),
            reason,
        })
    }
}

async fn remove_dir_if_present(path: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// A scratch chunk is reused only when it decodes and belongs to the expected reference.
async fn read_scratch(path: &Path, expected: &ChunkRef) -> Option<Chunk> {
    match read_json::<ScratchChunk>(path).await {
        Ok(Some(entry)) if entry.reference == *expected => Some(entry.chunk),
        Ok(None) => None,
        Ok(Some(entry)) => {
            log::debug!(
                "ignoring scratch chunk {}: holds {} instead of {expected}",
                path.display(),
                entry.reference
            );
            None
        }
        Err(err) => {
            log::debug!("ignoring unreadable scratch chunk: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use govsync_protocol::MemoryLedger;
    use tempfile::TempDir;

    fn store(tmp: &TempDir, ledger: &Arc<MemoryLedger>) -> ChunkStore {
        ChunkStore::new(&SyncConfig::with_home(tmp.path()), ledger.clone())
    }

    #[tokio::test]
    async fn scratch_chunk_keeps_reference_next_and_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.json");
        let entry = ScratchChunk {
            reference: ChunkRef::new("this-hash"),
            chunk: Chunk {
                content: b"payload".to_vec(),
                next: Some(ChunkRef::new("next-hash")),
            },
        };
        write_json_atomic(&path, &entry).await.unwrap();

        let chunk = read_scratch(&path, &ChunkRef::new("this-hash")).await.unwrap();
        assert_eq!(chunk, entry.chunk);
        assert!(read_scratch(&path, &ChunkRef::new("other-hash")).await.is_none());
    }

    #[tokio::test]
    async fn garbage_scratch_is_refetched_from_the_ledger() {
        let tmp = TempDir::new().unwrap();
        let ledger = Arc::new(MemoryLedger::new());
        let root = ledger.insert_document("doc", &[b"AB", b"CD"]);
        let store = store(&tmp, &ledger);

        let scratch = store.scratch_path(&root, 0);
        tokio::fs::create_dir_all(scratch.parent().unwrap()).await.unwrap();
        tokio::fs::write(&scratch, b"CK01\x00garbage").await.unwrap();

        let bytes = store.fetch_document(&root).await.unwrap();
        assert_eq!(bytes, b"ABCD".to_vec());
        assert_eq!(ledger.chunk_reads("doc"), 1);
        assert!(!store.scratch_root(&root).exists());
    }
}
