//! Transcript entities and storage.
//!
//! Transcripts are produced upstream (by a transcription pipeline) and are
//! read-only to the QA engine. The engine accesses them through the
//! [`TranscriptStore`] trait so the library can sit behind any host.

use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, RwLock};
use tracing::{info, instrument};

/// A transcript of one recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Stable transcript ID.
    pub id: String,
    /// Full transcript text.
    pub text: String,
    /// ISO-639-1 language code, if known.
    pub language: Option<String>,
    /// Free-form metadata (original filename, tags, ...).
    pub metadata: HashMap<String, String>,
    /// When the transcript was registered.
    pub created_at: DateTime<Utc>,
}

impl Transcript {
    /// Create a new transcript.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            language: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the language code.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// Read access to the transcript library.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Fetch a transcript by ID.
    async fn get(&self, id: &str) -> Result<Option<Transcript>>;

    /// Check whether a transcript exists.
    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// List all transcript IDs, newest first.
    async fn list_ids(&self) -> Result<Vec<String>>;
}

/// In-memory transcript store, used in tests and embedded hosts.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    transcripts: RwLock<HashMap<String, Transcript>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a transcript, replacing any previous text for the same ID.
    pub fn insert(&self, transcript: Transcript) {
        let mut map = self.transcripts.write().unwrap();
        map.insert(transcript.id.clone(), transcript);
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn get(&self, id: &str) -> Result<Option<Transcript>> {
        let map = self.transcripts.read().unwrap();
        Ok(map.get(id).cloned())
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let map = self.transcripts.read().unwrap();
        let mut entries: Vec<&Transcript> = map.values().collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries.iter().map(|t| t.id.clone()).collect())
    }
}

/// SQLite-backed transcript library used by the CLI.
pub struct SqliteTranscriptStore {
    conn: Mutex<Connection>,
}

impl SqliteTranscriptStore {
    /// Open (or create) the transcript library at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;

        info!("Opened transcript library at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory transcript library (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS transcripts (
                id TEXT PRIMARY KEY,
                text TEXT NOT NULL,
                language TEXT,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Register or replace a transcript.
    pub fn upsert(&self, transcript: &Transcript) -> Result<()> {
        let conn = self.lock()?;
        let metadata_json = serde_json::to_string(&transcript.metadata)?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO transcripts (id, text, language, metadata_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                transcript.id,
                transcript.text,
                transcript.language,
                metadata_json,
                transcript.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Remove a transcript from the library.
    pub fn delete(&self, id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM transcripts WHERE id = ?1", params![id])?;
        Ok(deleted)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SvarError::Storage(format!("Failed to acquire lock: {}", e)))
    }

    fn row_to_transcript(row: &rusqlite::Row<'_>) -> rusqlite::Result<Transcript> {
        let metadata_json: String = row.get(3)?;
        let created_at_str: String = row.get(4)?;
        Ok(Transcript {
            id: row.get(0)?,
            text: row.get(1)?,
            language: row.get(2)?,
            metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl TranscriptStore for SqliteTranscriptStore {
    async fn get(&self, id: &str) -> Result<Option<Transcript>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, text, language, metadata_json, created_at FROM transcripts WHERE id = ?1",
            params![id],
            Self::row_to_transcript,
        );

        match result {
            Ok(t) => Ok(Some(t)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id FROM transcripts ORDER BY created_at DESC, id ASC")?;
        let ids = stmt.query_map([], |row| row.get(0))?;
        Ok(ids.filter_map(|r| r.ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_transcript_roundtrip() {
        let store = SqliteTranscriptStore::in_memory().unwrap();

        let mut transcript = Transcript::new("meeting-1", "Alice proposed a deadline.");
        transcript.metadata.insert("filename".to_string(), "meeting.wav".to_string());
        store.upsert(&transcript).unwrap();

        let loaded = store.get("meeting-1").await.unwrap().unwrap();
        assert_eq!(loaded.text, "Alice proposed a deadline.");
        assert_eq!(loaded.metadata.get("filename").unwrap(), "meeting.wav");

        assert!(store.exists("meeting-1").await.unwrap());
        assert!(!store.exists("missing").await.unwrap());

        assert_eq!(store.delete("meeting-1").unwrap(), 1);
        assert!(store.get("meeting-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_lists_newest_first() {
        let store = MemoryTranscriptStore::new();
        let mut older = Transcript::new("a", "first");
        older.created_at = Utc::now() - chrono::Duration::seconds(10);
        store.insert(older);
        store.insert(Transcript::new("b", "second"));

        let ids = store.list_ids().await.unwrap();
        assert_eq!(ids, vec!["b".to_string(), "a".to_string()]);
    }
}
