//! State store backed by a single JSON document.
//!
//! The whole document is read on every access and rewritten on every mutation.
//! Writes go to a sibling temporary file that is renamed over the document, so
//! readers only ever see a complete, committed version.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::StateStore;
use crate::errors::StateError;
use crate::models::DeploymentRecord;

type StateDocument = BTreeMap<String, DeploymentRecord>;

/// JSON-document state store.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check that the document is readable, creating parent directories.
    ///
    /// A corrupt document is reported, never repaired.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StateError> {
        let store = Self::new(path);
        if let Some(parent) = store.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let records = store.load().await?;
        tracing::info!(
            "Loaded deployment state with {} records from {:?}",
            records.len(),
            store.path
        );
        Ok(store)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn load(&self) -> Result<StateDocument, StateError> {
        match fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(StateDocument::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StateDocument::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(&self, document: &StateDocument) -> Result<(), StateError> {
        let contents = serde_json::to_vec_pretty(document)?;
        let temp_path = self.temp_path();

        // Write to temp file
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);

        // Rename to target
        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn get(&self, task_id: &str) -> Result<Option<DeploymentRecord>, StateError> {
        let mut document = self.load().await?;
        Ok(document.remove(task_id))
    }

    async fn put(&self, task_id: &str, record: DeploymentRecord) -> Result<(), StateError> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.load().await?;
        document.insert(task_id.to_string(), record);
        self.commit(&document).await?;
        tracing::debug!(task = task_id, "Committed deployment record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record(repo_name: &str, round: u32) -> DeploymentRecord {
        let now = Utc::now();
        DeploymentRecord {
            repo_name: repo_name.to_string(),
            round,
            commit_sha: Some("abc123".to_string()),
            repo_url: Some(format!("https://github.com/octocat/{}", repo_name)),
            pages_url: Some(format!("https://octocat.github.io/{}/", repo_name)),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_put_then_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).await.unwrap();

        let written = record("hello-world-1", 1);
        store.put("hello-world", written.clone()).await.unwrap();

        let read = store.get("hello-world").await.unwrap();
        assert_eq!(read, Some(written));
        assert_eq!(store.get("unknown").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let written = record("persisted-1", 2);
        JsonFileStore::open(&path)
            .await
            .unwrap()
            .put("persisted", written.clone())
            .await
            .unwrap();

        let reopened = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("persisted").await.unwrap(), Some(written));
    }

    #[tokio::test]
    async fn test_put_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).await.unwrap();

        store.put("task", record("task-1", 1)).await.unwrap();
        store.put("other", record("other-1", 1)).await.unwrap();
        store.put("task", record("task-1", 2)).await.unwrap();

        assert_eq!(store.get("task").await.unwrap().unwrap().round, 2);
        assert_eq!(store.get("other").await.unwrap().unwrap().round, 1);
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_last_commit() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("state.json")).await.unwrap();

        let committed = record("task-1", 1);
        store.put("task", committed.clone()).await.unwrap();

        // A crash mid-write leaves a truncated temp file behind
        std::fs::write(store.temp_path(), b"{\"task\": {\"repo_na").unwrap();

        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert!(document.get("task").is_some());
        assert_eq!(store.get("task").await.unwrap(), Some(committed));

        // The next write replaces the stale temp file
        store.put("task", record("task-1", 2)).await.unwrap();
        assert_eq!(store.get("task").await.unwrap().unwrap().round, 2);
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn test_missing_and_empty_documents_are_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");
        let store = JsonFileStore::open(&path).await.unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(store.get("anything").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_document_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileStore::open(&path).await,
            Err(StateError::Corrupt(_))
        ));

        let store = JsonFileStore::new(&path);
        assert!(matches!(
            store.get("task").await,
            Err(StateError::Corrupt(_))
        ));
        assert!(store.put("task", record("task-1", 1)).await.is_err());
        // Never repaired
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }
}
