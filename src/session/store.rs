//! SQLite persistence for sessions, messages, and feedback.

use super::{Feedback, FeedbackKind, Message, MessageStatus, Session};
use crate::error::{Result, SvarError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, instrument};
use uuid::Uuid;

/// SQLite-backed session store.
pub struct SqliteSessionStore {
    conn: Mutex<Connection>,
}

impl SqliteSessionStore {
    /// Open (or create) the session store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init_schema(&conn)?;

        info!("Opened session store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory session store (useful for testing).
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
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                name TEXT,
                transcript_ids_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                retrieved_json TEXT NOT NULL,
                quality_score REAL,
                metrics_json TEXT,
                status TEXT NOT NULL,
                error TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id);

            CREATE TABLE IF NOT EXISTS feedback (
                message_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                comment TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_feedback_message_id ON feedback(message_id);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| SvarError::Storage(format!("Failed to acquire lock: {}", e)))
    }

    /// Persist a new session.
    pub fn create_session(&self, session: &Session) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (id, name, transcript_ids_json, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id.to_string(),
                session.name,
                serde_json::to_string(&session.transcript_ids)?,
                session.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a session by ID.
    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            "SELECT id, name, transcript_ids_json, created_at FROM sessions WHERE id = ?1",
            params![id.to_string()],
            Self::row_to_session,
        );
        match result {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all sessions, newest first.
    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, transcript_ids_json, created_at FROM sessions ORDER BY created_at DESC",
        )?;
        let sessions = stmt.query_map([], Self::row_to_session)?;
        Ok(sessions.filter_map(|s| s.ok()).collect())
    }

    /// Delete a session, cascading to its messages and their feedback.
    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            r#"
            DELETE FROM feedback WHERE message_id IN
                (SELECT id FROM messages WHERE session_id = ?1)
            "#,
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![id.to_string()],
        )?;
        let deleted = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;

        if deleted == 0 {
            return Err(SvarError::SessionNotFound(id.to_string()));
        }
        info!("Deleted session {}", id);
        Ok(())
    }

    /// Append a finalized message to its session. Messages are immutable
    /// once written.
    pub fn append_message(&self, message: &Message) -> Result<()> {
        let session_id = message
            .session_id
            .ok_or_else(|| SvarError::InvalidInput("message has no session".to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO messages
            (id, session_id, question, answer, retrieved_json, quality_score, metrics_json, status, error, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                message.id.to_string(),
                session_id.to_string(),
                message.question,
                message.answer,
                serde_json::to_string(&message.retrieved_chunks)?,
                message.quality_score,
                message
                    .quality_metrics
                    .map(|m| serde_json::to_string(&m))
                    .transpose()?,
                message.status.to_string(),
                message.error,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one message.
    pub fn get_message(&self, id: Uuid) -> Result<Option<Message>> {
        let conn = self.lock()?;
        let result = conn.query_row(
            r#"
            SELECT id, session_id, question, answer, retrieved_json, quality_score,
                   metrics_json, status, error, created_at
            FROM messages WHERE id = ?1
            "#,
            params![id.to_string()],
            Self::row_to_message,
        );
        match result {
            Ok(m) => Ok(Some(m)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All messages of a session in chronological order.
    pub fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, session_id, question, answer, retrieved_json, quality_score,
                   metrics_json, status, error, created_at
            FROM messages
            WHERE session_id = ?1
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;
        let messages = stmt.query_map(params![session_id.to_string()], Self::row_to_message)?;
        Ok(messages.filter_map(|m| m.ok()).collect())
    }

    /// Record feedback for an existing message.
    pub fn add_feedback(&self, feedback: &Feedback) -> Result<()> {
        {
            let conn = self.lock()?;
            let exists: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE id = ?1",
                params![feedback.message_id.to_string()],
                |row| row.get(0),
            )?;
            if exists == 0 {
                return Err(SvarError::MessageNotFound(feedback.message_id.to_string()));
            }

            conn.execute(
                "INSERT INTO feedback (message_id, kind, comment, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    feedback.message_id.to_string(),
                    feedback.kind.to_string(),
                    feedback.comment,
                    feedback.created_at.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    /// All feedback for a message, oldest first.
    pub fn list_feedback(&self, message_id: Uuid) -> Result<Vec<Feedback>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, kind, comment, created_at FROM feedback WHERE message_id = ?1 ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let message_id_str: String = row.get(0)?;
            let kind_str: String = row.get(1)?;
            let created_at_str: String = row.get(3)?;
            Ok(Feedback {
                message_id: Uuid::parse_str(&message_id_str).unwrap_or_default(),
                kind: kind_str
                    .parse::<FeedbackKind>()
                    .unwrap_or(FeedbackKind::Positive),
                comment: row.get(2)?,
                created_at: parse_timestamp(&created_at_str),
            })
        })?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
        let id_str: String = row.get(0)?;
        let ids_json: String = row.get(2)?;
        let created_at_str: String = row.get(3)?;
        Ok(Session {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            name: row.get(1)?,
            transcript_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
        let id_str: String = row.get(0)?;
        let session_id_str: String = row.get(1)?;
        let retrieved_json: String = row.get(4)?;
        let metrics_json: Option<String> = row.get(6)?;
        let status_str: String = row.get(7)?;
        let created_at_str: String = row.get(9)?;
        Ok(Message {
            id: Uuid::parse_str(&id_str).unwrap_or_default(),
            session_id: Uuid::parse_str(&session_id_str).ok(),
            question: row.get(2)?,
            answer: row.get(3)?,
            retrieved_chunks: serde_json::from_str(&retrieved_json).unwrap_or_default(),
            quality_score: row.get(5)?,
            quality_metrics: metrics_json.and_then(|j| serde_json::from_str(&j).ok()),
            status: status_str.parse().unwrap_or(MessageStatus::Failed),
            error: row.get(8)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
