//! Svar - Transcript Question Answering
//!
//! A retrieval-augmented question-answering engine for transcripts.
//!
//! The name "Svar" comes from the Norwegian/Scandinavian word for "answer."
//!
//! # Overview
//!
//! Svar allows you to:
//! - Index transcript text into a hybrid (lexical + semantic) search index
//! - Ask questions and get grounded answers with numbered citations
//! - Score every answer for groundedness, completeness, and relevance
//! - Keep multi-turn question sessions scoped to a set of transcripts
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration management
//! - `transcript` - Transcript entities and storage
//! - `chunking` - Splitting transcripts into overlapping passages
//! - `embedding` - Embedding generation with provider fallback
//! - `index` - In-process BM25 lexical index
//! - `vector_store` - Vector database abstraction
//! - `generation` - Chat model abstraction
//! - `retrieval` - Hybrid retrieval with fusion, expansion, and reranking
//! - `answer` - Grounded answer composition
//! - `grading` - Answer quality scoring
//! - `session` - Question/answer sessions and feedback
//! - `engine` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use svar::config::Settings;
//! use svar::engine::{AskOptions, QaEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let engine = QaEngine::new(settings)?;
//!
//!     engine.index_transcript("standup-2024-03-01").await?;
//!     let message = engine
//!         .ask("When is the deadline?", AskOptions::default(), None)
//!         .await?;
//!     println!("{}", message.answer);
//!
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generation;
pub mod grading;
pub mod index;
pub mod openai;
pub mod progress;
pub mod retrieval;
pub mod retry;
pub mod session;
pub mod transcript;
pub mod vector_store;

pub use error::{Result, SvarError};
