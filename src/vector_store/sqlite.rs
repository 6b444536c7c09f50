//! SQLite-based vector store implementation.
//!
//! Uses SQLite with cosine similarity computed in Rust for simplicity.
//! Collections are rows in a `collections` table keyed by embedding
//! model; points carry their model so dimension routing survives a
//! provider failover.

use super::{cosine_similarity, ChunkPoint, IndexedTranscript, ScoredPoint, VectorStore};
use crate::chunking::Chunk;
use crate::error::{Result, SvarError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// SQLite-based vector store.
pub struct SqliteVectorStore {
    conn: Mutex<Connection>,
}

impl SqliteVectorStore {
    /// Create a new SQLite vector store.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for better concurrent read behavior.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;

        info!("Initialized SQLite vector store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite vector store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS collections (
                model_id TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS points (
                id TEXT PRIMARY KEY,
                transcript_id TEXT NOT NULL,
                model_id TEXT NOT NULL,
                text TEXT NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                sequence_index INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                indexed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_points_transcript_id ON points(transcript_id);
            CREATE INDEX IF NOT EXISTS idx_points_model_id ON points(model_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SvarError::VectorStore(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| {
                let arr: [u8; 4] = chunk.try_into().unwrap_or_default();
                f32::from_le_bytes(arr)
            })
            .collect()
    }

    fn collection_dimension(conn: &Connection, model_id: &str) -> Result<Option<usize>> {
        let result = conn.query_row(
            "SELECT dimension FROM collections WHERE model_id = ?1",
            params![model_id],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(dim) => Ok(Some(dim as usize)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
        Ok(Chunk {
            id: row.get(0)?,
            transcript_id: row.get(1)?,
            text: row.get(2)?,
            start_offset: row.get::<_, i64>(3)? as usize,
            end_offset: row.get::<_, i64>(4)? as usize,
            sequence_index: row.get::<_, i64>(5)? as usize,
        })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    #[instrument(skip(self))]
    async fn ensure_collection(&self, model_id: &str, dimension: usize) -> Result<()> {
        let conn = self.lock()?;
        match Self::collection_dimension(&conn, model_id)? {
            Some(existing) if existing != dimension => Err(SvarError::DimensionMismatch {
                expected: existing,
                actual: dimension,
            }),
            Some(_) => Ok(()),
            None => {
                conn.execute(
                    "INSERT INTO collections (model_id, dimension, created_at) VALUES (?1, ?2, ?3)",
                    params![model_id, dimension as i64, Utc::now().to_rfc3339()],
                )?;
                info!("Created collection {} (dimension {})", model_id, dimension);
                Ok(())
            }
        }
    }

    #[instrument(skip(self, points), fields(count = points.len()))]
    async fn upsert_batch(&self, model_id: &str, points: &[ChunkPoint]) -> Result<usize> {
        let conn = self.lock()?;

        let dimension = Self::collection_dimension(&conn, model_id)?
            .ok_or_else(|| SvarError::VectorStore(format!("Unknown collection: {}", model_id)))?;

        for point in points {
            if point.vector.len() != dimension {
                return Err(SvarError::DimensionMismatch {
                    expected: dimension,
                    actual: point.vector.len(),
                });
            }
        }

        let tx = conn.unchecked_transaction()?;
        for point in points {
            let embedding_bytes = Self::embedding_to_bytes(&point.vector);
            tx.execute(
                r#"
                INSERT OR REPLACE INTO points
                (id, transcript_id, model_id, text, start_offset, end_offset,
                 sequence_index, embedding, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
                params![
                    point.chunk.id,
                    point.chunk.transcript_id,
                    model_id,
                    point.chunk.text,
                    point.chunk.start_offset as i64,
                    point.chunk.end_offset as i64,
                    point.chunk.sequence_index as i64,
                    embedding_bytes,
                    point.indexed_at.to_rfc3339(),
                ],
            )?;
        }
        tx.commit()?;

        debug!("Upserted {} points into {}", points.len(), model_id);
        Ok(points.len())
    }

    #[instrument(skip(self, query))]
    async fn search(
        &self,
        model_id: &str,
        query: &[f32],
        limit: usize,
        transcript_filter: Option<&[String]>,
    ) -> Result<Vec<ScoredPoint>> {
        let conn = self.lock()?;

        let dimension = match Self::collection_dimension(&conn, model_id)? {
            Some(d) => d,
            None => return Ok(Vec::new()),
        };
        if query.len() != dimension {
            return Err(SvarError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut stmt = conn.prepare(
            r#"
            SELECT id, transcript_id, text, start_offset, end_offset, sequence_index, embedding
            FROM points
            WHERE model_id = ?1
            "#,
        )?;

        let rows = stmt.query_map(params![model_id], |row| {
            let chunk = Self::row_to_chunk(row)?;
            let embedding_bytes: Vec<u8> = row.get(6)?;
            Ok((chunk, Self::bytes_to_embedding(&embedding_bytes)))
        })?;

        let mut results: Vec<ScoredPoint> = rows
            .filter_map(|r| r.ok())
            .filter(|(chunk, _)| match transcript_filter {
                Some(ids) => ids.iter().any(|id| *id == chunk.transcript_id),
                None => true,
            })
            .map(|(chunk, embedding)| ScoredPoint {
                score: cosine_similarity(query, &embedding),
                chunk,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
        });
        results.truncate(limit);

        debug!("Found {} matching points", results.len());
        Ok(results)
    }

    #[instrument(skip(self))]
    async fn delete_by_transcript(&self, transcript_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM points WHERE transcript_id = ?1",
            params![transcript_id],
        )?;
        info!("Deleted {} points for transcript {}", deleted, transcript_id);
        Ok(deleted)
    }

    #[instrument(skip(self))]
    async fn delete_stale(&self, transcript_id: &str, keep_below: usize) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM points WHERE transcript_id = ?1 AND sequence_index >= ?2",
            params![transcript_id, keep_below as i64],
        )?;
        if deleted > 0 {
            debug!(
                "Deleted {} stale points for transcript {}",
                deleted, transcript_id
            );
        }
        Ok(deleted)
    }

    async fn chunks_for_transcript(&self, transcript_id: &str) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, transcript_id, text, start_offset, end_offset, sequence_index
            FROM points
            WHERE transcript_id = ?1
            ORDER BY sequence_index
            "#,
        )?;
        let chunks = stmt.query_map(params![transcript_id], Self::row_to_chunk)?;
        Ok(chunks.filter_map(|c| c.ok()).collect())
    }

    async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, transcript_id, text, start_offset, end_offset, sequence_index
            FROM points
            ORDER BY transcript_id, sequence_index
            "#,
        )?;
        let chunks = stmt.query_map([], Self::row_to_chunk)?;
        Ok(chunks.filter_map(|c| c.ok()).collect())
    }

    async fn chunk_count(&self, transcript_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE transcript_id = ?1",
            params![transcript_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    async fn total_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM points", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    async fn model_for_transcript(&self, transcript_id: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            r#"
            SELECT model_id FROM points
            WHERE transcript_id = ?1
            GROUP BY model_id
            ORDER BY COUNT(*) DESC
            LIMIT 1
            "#,
            params![transcript_id],
            |row| row.get(0),
        );
        match result {
            Ok(model) => Ok(Some(model)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn active_models(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT model_id, MAX(indexed_at) AS latest
            FROM points
            GROUP BY model_id
            ORDER BY latest DESC
            "#,
        )?;
        let models = stmt.query_map([], |row| row.get(0))?;
        Ok(models.filter_map(|m| m.ok()).collect())
    }

    async fn list_indexed(&self) -> Result<Vec<IndexedTranscript>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT transcript_id, COUNT(*) AS chunk_count, model_id, MAX(indexed_at) AS indexed_at
            FROM points
            GROUP BY transcript_id
            ORDER BY indexed_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let indexed_at_str: String = row.get(3)?;
            Ok(IndexedTranscript {
                transcript_id: row.get(0)?,
                chunk_count: row.get::<_, i64>(1)? as usize,
                model_id: row.get(2)?,
                indexed_at: DateTime::parse_from_rfc3339(&indexed_at_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            })
        })?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    async fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(transcript_id: &str, index: usize, text: &str) -> Chunk {
        Chunk {
            id: Chunk::derive_id(transcript_id, index),
            transcript_id: transcript_id.to_string(),
            text: text.to_string(),
            start_offset: 0,
            end_offset: text.len(),
            sequence_index: index,
        }
    }

    #[tokio::test]
    async fn test_sqlite_vector_store_roundtrip() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.ensure_collection("m", 3).await.unwrap();

        store
            .upsert_batch(
                "m",
                &[ChunkPoint::new(
                    chunk("t1", 0, "This is test content"),
                    "m",
                    vec![1.0, 0.0, 0.0],
                )],
            )
            .await
            .unwrap();

        let indexed = store.list_indexed().await.unwrap();
        assert_eq!(indexed.len(), 1);
        assert_eq!(indexed[0].transcript_id, "t1");
        assert_eq!(indexed[0].chunk_count, 1);
        assert_eq!(indexed[0].model_id, "m");

        let results = store.search("m", &[1.0, 0.0, 0.0], 10, None).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert_eq!(results[0].chunk.text, "This is test content");

        let deleted = store.delete_by_transcript("t1").await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.list_indexed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reindex_overwrites_instead_of_duplicating() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.ensure_collection("m", 2).await.unwrap();

        let points: Vec<ChunkPoint> = (0..3)
            .map(|i| ChunkPoint::new(chunk("t1", i, "text"), "m", vec![1.0, 0.0]))
            .collect();
        store.upsert_batch("m", &points).await.unwrap();
        assert_eq!(store.chunk_count("t1").await.unwrap(), 3);

        // Second indexing pass produces fewer chunks: same ids overwrite,
        // the stale tail is deleted afterwards.
        let points: Vec<ChunkPoint> = (0..2)
            .map(|i| ChunkPoint::new(chunk("t1", i, "new text"), "m", vec![0.0, 1.0]))
            .collect();
        store.upsert_batch("m", &points).await.unwrap();
        store.delete_stale("t1", 2).await.unwrap();

        assert_eq!(store.chunk_count("t1").await.unwrap(), 2);
        let chunks = store.chunks_for_transcript("t1").await.unwrap();
        assert!(chunks.iter().all(|c| c.text == "new text"));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_detected() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.ensure_collection("m", 3).await.unwrap();

        let err = store.ensure_collection("m", 384).await.unwrap_err();
        assert!(matches!(err, SvarError::DimensionMismatch { .. }));

        let err = store.search("m", &[1.0, 0.0], 5, None).await.unwrap_err();
        assert!(matches!(err, SvarError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_transcript_filter() {
        let store = SqliteVectorStore::in_memory().unwrap();
        store.ensure_collection("m", 2).await.unwrap();
        store
            .upsert_batch(
                "m",
                &[
                    ChunkPoint::new(chunk("t1", 0, "a"), "m", vec![1.0, 0.0]),
                    ChunkPoint::new(chunk("t2", 0, "b"), "m", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let filter = vec!["t2".to_string()];
        let results = store
            .search("m", &[1.0, 0.0], 10, Some(&filter))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.transcript_id, "t2");
    }

    #[tokio::test]
    async fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");

        {
            let store = SqliteVectorStore::new(&path).unwrap();
            store.ensure_collection("m", 2).await.unwrap();
            store
                .upsert_batch(
                    "m",
                    &[ChunkPoint::new(chunk("t1", 0, "persisted"), "m", vec![1.0, 0.0])],
                )
                .await
                .unwrap();
        }

        let store = SqliteVectorStore::new(&path).unwrap();
        assert_eq!(store.total_count().await.unwrap(), 1);
        let chunks = store.all_chunks().await.unwrap();
        assert_eq!(chunks[0].text, "persisted");
        assert_eq!(store.active_models().await.unwrap(), vec!["m".to_string()]);
    }
}
