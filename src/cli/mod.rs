//! CLI module for Svar.

pub mod commands;
mod output;

pub use output::{BarSink, Output};

use clap::{Parser, Subcommand};

/// Svar - Transcript Question Answering
///
/// A retrieval-augmented question-answering engine for transcripts.
/// The name "Svar" comes from the Norwegian/Scandinavian word for "answer."
#[derive(Parser, Debug)]
#[command(name = "svar")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Svar data directories and default configuration
    Init,

    /// Register a transcript and index it for search
    Index {
        /// Path to a UTF-8 transcript text file, or '-' for stdin
        file: String,

        /// Transcript ID (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,

        /// ISO-639-1 language code of the transcript
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Reindex an already registered transcript
    Reindex {
        /// Transcript ID to reindex
        transcript_id: String,
    },

    /// Ask a question and get a grounded, cited answer
    Ask {
        /// The question to ask
        question: String,

        /// Session to ask within (keeps conversation history)
        #[arg(short, long)]
        session: Option<String>,

        /// Restrict the search to these transcript IDs
        #[arg(short, long)]
        transcripts: Vec<String>,

        /// Number of context chunks to retrieve
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// Generation model override
        #[arg(short, long)]
        model: Option<String>,

        /// Sampling temperature (0.0 - 2.0)
        #[arg(long)]
        temperature: Option<f32>,

        /// Disable model-based reranking of retrieved chunks
        #[arg(long)]
        no_rerank: bool,

        /// Disable query expansion
        #[arg(long)]
        no_expand: bool,

        /// Enable one extra retrieval hop informed by the first pass
        #[arg(long)]
        multi_hop: bool,

        /// Disable BM25 fusion (semantic search only)
        #[arg(long)]
        no_hybrid: bool,

        /// Grade the answer with a judge model instead of heuristics
        #[arg(long)]
        advanced_grading: bool,
    },

    /// Search indexed transcripts without generating an answer
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Restrict the search to these transcript IDs
        #[arg(short, long)]
        transcripts: Vec<String>,
    },

    /// List indexed transcripts
    List,

    /// Delete a transcript and its index entries
    Delete {
        /// Transcript ID to delete
        transcript_id: String,
    },

    /// Show backend reachability and index size
    Status,

    /// Manage question/answer sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Submit feedback on an answer
    Feedback {
        /// Message ID the feedback refers to
        message_id: String,

        /// 'positive' or 'negative'
        kind: String,

        /// Optional free-form comment
        #[arg(long)]
        comment: Option<String>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum SessionAction {
    /// List all sessions
    List,

    /// Create a new session
    Create {
        /// Session name
        #[arg(short, long)]
        name: Option<String>,

        /// Transcript IDs the session is scoped to (empty = all)
        #[arg(short, long)]
        transcripts: Vec<String>,
    },

    /// Show a session and its messages
    Show {
        /// Session ID
        session_id: String,
    },

    /// Delete a session and its messages
    Delete {
        /// Session ID
        session_id: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "generation.model")
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show configuration file path
    Path,
}
