use std::future::Future;
use std::path::Path;

use crate::error::HarvestError;
use crate::record::Record;

/// Persists and retrieves record checkpoints.
///
/// The engine only ever writes the full merged sequence, so re-running a
/// write with the same ledger state must produce identical output.
pub trait RecordStore: Send + Sync {
    fn load_prior(&self, path: &Path)
    -> impl Future<Output = Result<Vec<Record>, HarvestError>> + Send;

    fn write(
        &self,
        path: &Path,
        records: &[Record],
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;
}

/// JSON-file record store: one pretty-printed array per checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStore;

impl RecordStore for JsonStore {
    async fn load_prior(&self, path: &Path) -> Result<Vec<Record>, HarvestError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarvestError::Checkpoint(format!("read {}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn write(&self, path: &Path, records: &[Record]) -> Result<(), HarvestError> {
        let json = serde_json::to_string_pretty(records)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|e| HarvestError::Checkpoint(format!("write {}: {e}", path.display())))
    }
}

/// Load the prior-results seed, degrading a missing or malformed file to
/// an empty seed. Resuming is best-effort; a bad file is logged, not fatal.
pub async fn load_prior_or_empty<S: RecordStore>(store: &S, path: Option<&Path>) -> Vec<Record> {
    let Some(path) = path else {
        return Vec::new();
    };
    match store.load_prior(path).await {
        Ok(records) => {
            tracing::info!(path = %path.display(), count = records.len(), "Loaded prior records");
            records
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "Prior records unavailable, starting with an empty ledger");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn record(time: &str, author: &str, body: &str) -> Record {
        Record::new(time.parse::<DateTime<Utc>>().unwrap(), author, body)
    }

    #[tokio::test]
    async fn test_write_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = JsonStore;

        let records = vec![
            record("2024-01-01T00:00:00Z", "alice", "hello"),
            record("2024-01-02T00:00:00Z", "bob", "world"),
        ];
        store.write(&path, &records).await.unwrap();

        let loaded = store.load_prior(&path).await.unwrap();
        assert_eq!(loaded, records);
    }

    #[tokio::test]
    async fn test_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = JsonStore;
        let records = vec![record("2024-01-01T00:00:00Z", "alice", "hello")];

        store.write(&path, &records).await.unwrap();
        let first = tokio::fs::read(&path).await.unwrap();
        store.write(&path, &records).await.unwrap();
        let second = tokio::fs::read(&path).await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_missing_prior_degrades_to_empty() {
        let store = JsonStore;
        let seed = load_prior_or_empty(&store, Some(Path::new("/nonexistent/prior.json"))).await;
        assert!(seed.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_prior_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let seed = load_prior_or_empty(&JsonStore, Some(path.as_path())).await;
        assert!(seed.is_empty());
    }

    #[tokio::test]
    async fn test_no_prior_path_is_empty_seed() {
        let seed = load_prior_or_empty(&JsonStore, None).await;
        assert!(seed.is_empty());
    }
}
