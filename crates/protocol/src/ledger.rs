use crate::{Chunk, ChunkRef, LedgerError, LedgerResult, RecordId, RecordKind};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Read-only access to the governance ledger.
///
/// Implementations are expected to be slow; callers cache aggressively.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn read_chunk(&self, chunk: &ChunkRef) -> LedgerResult<Chunk>;

    /// Raw record fields, `None` when the id does not resolve.
    async fn get_record(&self, kind: RecordKind, id: &str)
        -> LedgerResult<Option<serde_json::Value>>;

    async fn contract_version(&self, kind: RecordKind) -> LedgerResult<u32>;

    /// One page of record indices for a contract version. An empty page means there are no
    /// more records.
    async fn query_indices_by_cursor(
        &self,
        kind: RecordKind,
        cursor: u64,
        limit: u64,
        version: u32,
    ) -> LedgerResult<Vec<u64>>;

    /// Indices of proposals filed under `topic` in one proposal contract version.
    async fn proposal_indices_for_topic(&self, topic: &str, version: u32)
        -> LedgerResult<Vec<u64>>;
}

/// Fetch and decode a record, surfacing an unresolved id as [`LedgerError::MissingRecord`].
pub async fn fetch_record<T: DeserializeOwned>(
    ledger: &dyn Ledger,
    kind: RecordKind,
    id: &str,
) -> LedgerResult<T> {
    let value = ledger
        .get_record(kind, id)
        .await?
        .ok_or_else(|| LedgerError::missing(kind, id))?;
    serde_json::from_value(value).map_err(|err| LedgerError::Malformed {
        id: id.to_string(),
        reason: err.to_string(),
    })
}

/// Enumerate every record id of `kind` across all contract versions, newest version first.
///
/// Each version is paged until the ledger returns an empty page. A ledger error is returned as
/// an error; it never silently ends the enumeration.
pub async fn list_record_ids(
    ledger: &dyn Ledger,
    kind: RecordKind,
    page_size: u64,
) -> LedgerResult<Vec<RecordId>> {
    let page_size = page_size.max(1);
    let mut ids = Vec::new();
    let mut version = ledger.contract_version(kind).await?;
    while version > 0 {
        let mut cursor = 0u64;
        loop {
            let page = ledger
                .query_indices_by_cursor(kind, cursor, page_size, version)
                .await?;
            if page.is_empty() {
                break;
            }
            log::debug!(
                "listed {} {kind} indices (version {version}, cursor {cursor})",
                page.len()
            );
            ids.extend(page.into_iter().map(|index| RecordId::new(kind, version, index)));
            cursor = cursor.saturating_add(page_size);
        }
        version -= 1;
    }
    Ok(ids)
}
