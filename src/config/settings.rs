//! Configuration settings for Svar.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub storage: StorageSettings,
    pub chunking: ChunkingSettings,
    pub embedding: EmbeddingSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub grading: GradingSettings,
    pub indexing: IndexingSettings,
    pub prompts: PromptSettings,
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.svar".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Storage paths for the SQLite databases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Path to the vector store database.
    pub vectors_path: String,
    /// Path to the transcript library database.
    pub transcripts_path: String,
    /// Path to the session/message/feedback database.
    pub sessions_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            vectors_path: "~/.svar/vectors.db".to_string(),
            transcripts_path: "~/.svar/transcripts.db".to_string(),
            sessions_path: "~/.svar/sessions.db".to_string(),
        }
    }
}

/// Transcript chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Target chunk size in characters.
    pub target_size: usize,
    /// Overlap between neighboring chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            target_size: 1000,
            overlap: 200,
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Primary embedding model.
    pub model: String,
    /// Primary embedding dimensions.
    pub dimensions: u32,
    /// Enable the local fallback embedder when the primary API fails.
    pub local_fallback: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            local_fallback: true,
        }
    }
}

/// Hybrid retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Default number of chunks to retrieve.
    pub top_k: usize,
    /// Weight applied to normalized vector scores during fusion.
    pub vector_weight: f32,
    /// Weight applied to normalized BM25 scores during fusion.
    pub bm25_weight: f32,
    /// Each branch over-fetches `top_k * fusion_multiplier` candidates
    /// so fusion has something to reorder.
    pub fusion_multiplier: usize,
    /// Maximum number of expanded query variants (in addition to the
    /// original question).
    pub max_expansions: usize,
    /// Minimum cosine similarity for a vector hit to count as a
    /// candidate. Keeps barely-related chunks out of scoped searches.
    pub min_vector_score: f32,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            vector_weight: 0.5,
            bm25_weight: 0.5,
            fusion_multiplier: 2,
            max_expansions: 3,
            min_vector_score: 0.25,
        }
    }
}

/// Answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Default chat model for answers, expansion, reranking, and judging.
    pub model: String,
    /// Default sampling temperature.
    pub temperature: f32,
    /// Maximum output tokens per answer.
    pub max_tokens: u32,
    /// Character budget for prior session turns included in the prompt.
    pub history_budget: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
            history_budget: 6000,
        }
    }
}

/// Quality grading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
    /// Weight of groundedness in the overall score.
    pub groundedness_weight: f32,
    /// Weight of completeness in the overall score.
    pub completeness_weight: f32,
    /// Weight of relevance in the overall score.
    pub relevance_weight: f32,
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            groundedness_weight: 1.0,
            completeness_weight: 1.0,
            relevance_weight: 1.0,
        }
    }
}

/// Indexing pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingSettings {
    /// Maximum transcripts indexed concurrently in a batch.
    pub max_concurrent: usize,
}

impl Default for IndexingSettings {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::SvarError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svar")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded vector store database path.
    pub fn vectors_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.vectors_path)
    }

    /// Get the expanded transcript library database path.
    pub fn transcripts_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.transcripts_path)
    }

    /// Get the expanded session database path.
    pub fn sessions_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.sessions_path)
    }

    /// Reject configurations the engine cannot run with.
    fn validate(&self) -> crate::error::Result<()> {
        if self.chunking.target_size == 0 {
            return Err(crate::error::SvarError::Config(
                "chunking.target_size must be greater than zero".to_string(),
            ));
        }
        if self.chunking.overlap >= self.chunking.target_size {
            return Err(crate::error::SvarError::Config(format!(
                "chunking.overlap ({}) must be smaller than chunking.target_size ({})",
                self.chunking.overlap, self.chunking.target_size
            )));
        }
        if self.retrieval.vector_weight < 0.0 || self.retrieval.bm25_weight < 0.0 {
            return Err(crate::error::SvarError::Config(
                "retrieval fusion weights must be non-negative".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(crate::error::SvarError::Config(format!(
                "generation.temperature ({}) must be within [0, 2]",
                self.generation.temperature
            )));
        }
        Ok(())
    }
}
