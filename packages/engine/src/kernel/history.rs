//! Durable history of terminal analysis outcomes.
//!
//! Independent lifecycle from the live result cache: entries are created on
//! successful completion, survive process restarts, and are only ever
//! deleted wholesale by explicit user action.

use std::path::PathBuf;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::common::types::HistoryEntry;
use crate::kernel::traits::BaseHistoryStore;

/// JSON-lines file store: one entry per line. Append is a single write;
/// remove rewrites the file.
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).context("failed to read history file"),
        };
        let mut entries = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(line).context("corrupt history line")?);
        }
        Ok(entries)
    }

    async fn write_all(&self, entries: &[HistoryEntry]) -> Result<()> {
        let mut out = String::new();
        for entry in entries {
            out.push_str(&serde_json::to_string(entry)?);
            out.push('\n');
        }
        fs::write(&self.path, out)
            .await
            .context("failed to write history file")
    }
}

#[async_trait]
impl BaseHistoryStore for FileHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .context("failed to open history file")?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.read_all().await?;
        entries.sort_by_key(|entry| entry.recorded_at);
        Ok(entries)
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut entries = self.read_all().await?;
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        if entries.len() == before {
            return Ok(false);
        }
        self.write_all(&entries).await?;
        Ok(true)
    }
}

/// In-memory history store for tests and ephemeral sessions.
#[derive(Default)]
pub struct InMemoryHistoryStore {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaseHistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: HistoryEntry) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<HistoryEntry>> {
        let mut entries = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        entries.sort_by_key(|entry| entry.recorded_at);
        Ok(entries)
    }

    async fn remove(&self, id: Uuid) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        Ok(entries.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{AnalysisResult, Complexity, JobKey, Verdict};

    fn entry(number: u64) -> HistoryEntry {
        HistoryEntry::new(
            JobKey::issue(number),
            AnalysisResult::builder()
                .verdict(Verdict::Confirmed)
                .confidence(90u8)
                .complexity(Complexity::Trivial)
                .reasoning("r")
                .build(),
        )
    }

    #[tokio::test]
    async fn in_memory_append_list_remove() {
        let store = InMemoryHistoryStore::new();
        let a = entry(1);
        let b = entry(2);
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        assert!(store.remove(a.id).await.unwrap());
        assert!(!store.remove(a.id).await.unwrap());

        let remaining = store.list().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b.id);
    }

    #[tokio::test]
    async fn file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = FileHistoryStore::new(&path);

        let a = entry(1);
        store.append(a.clone()).await.unwrap();
        store.append(entry(2)).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, a.id);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");

        {
            let store = FileHistoryStore::new(&path);
            store.append(entry(7)).await.unwrap();
        }

        let reopened = FileHistoryStore::new(&path);
        let listed = reopened.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key, JobKey::issue(7));
    }

    #[tokio::test]
    async fn file_store_remove_rewrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.jsonl");
        let store = FileHistoryStore::new(&path);

        let a = entry(1);
        let b = entry(2);
        store.append(a.clone()).await.unwrap();
        store.append(b.clone()).await.unwrap();

        assert!(store.remove(a.id).await.unwrap());
        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, b.id);
    }

    #[tokio::test]
    async fn missing_file_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileHistoryStore::new(dir.path().join("absent.jsonl"));
        assert!(store.list().await.unwrap().is_empty());
        assert!(!store.remove(Uuid::new_v4()).await.unwrap());
    }
}
