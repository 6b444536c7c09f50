//! Question/answer sessions, messages, and feedback.
//!
//! Sessions are append-only: messages are never edited or deleted on
//! their own, preserving an audit trail of what was asked and answered.
//! Deleting a session cascades to its messages and their feedback.

mod store;

pub use store::SqliteSessionStore;

use crate::grading::QualityMetrics;
use crate::retrieval::RetrievedChunk;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A scoped, ordered sequence of question/answer turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub name: Option<String>,
    /// Transcript scope; empty means search all transcripts.
    pub transcript_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(name: Option<String>, transcript_ids: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            transcript_ids,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Retrieval/generation in flight.
    Pending,
    /// The composer produced an answer.
    Answered,
    /// Retrieval or generation errored; the caller re-issues the ask.
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Pending => write!(f, "pending"),
            MessageStatus::Answered => write!(f, "answered"),
            MessageStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MessageStatus::Pending),
            "answered" => Ok(MessageStatus::Answered),
            "failed" => Ok(MessageStatus::Failed),
            _ => Err(format!("Unknown message status: {}", s)),
        }
    }
}

/// One question/answer turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    /// Absent for ephemeral single-turn asks until feedback anchors them.
    pub session_id: Option<Uuid>,
    pub question: String,
    pub answer: String,
    /// Snapshot of the retrieved context, not live references.
    pub retrieved_chunks: Vec<RetrievedChunk>,
    /// 0-5 display-scale quality score.
    pub quality_score: Option<f32>,
    pub quality_metrics: Option<QualityMetrics>,
    pub status: MessageStatus,
    /// Why the message failed, when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Start a pending message for a question.
    pub fn pending(session_id: Option<Uuid>, question: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            question: question.to_string(),
            answer: String::new(),
            retrieved_chunks: Vec::new(),
            quality_score: None,
            quality_metrics: None,
            status: MessageStatus::Pending,
            error: None,
            created_at: Utc::now(),
        }
    }
}

/// User feedback on a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl std::str::FromStr for FeedbackKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "positive" | "+" | "up" => Ok(FeedbackKind::Positive),
            "negative" | "-" | "down" => Ok(FeedbackKind::Negative),
            _ => Err(format!("feedback must be 'positive' or 'negative', got: {}", s)),
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackKind::Positive => write!(f, "positive"),
            FeedbackKind::Negative => write!(f, "negative"),
        }
    }
}

/// A feedback record, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
    pub message_id: Uuid,
    pub kind: FeedbackKind,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(message_id: Uuid, kind: FeedbackKind, comment: Option<String>) -> Self {
        Self {
            message_id,
            kind,
            comment,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_kind_parsing() {
        assert_eq!("positive".parse::<FeedbackKind>(), Ok(FeedbackKind::Positive));
        assert_eq!("NEGATIVE".parse::<FeedbackKind>(), Ok(FeedbackKind::Negative));
        assert!("meh".parse::<FeedbackKind>().is_err());
    }

    #[test]
    fn test_message_status_roundtrip() {
        for status in [MessageStatus::Pending, MessageStatus::Answered, MessageStatus::Failed] {
            let parsed: MessageStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
