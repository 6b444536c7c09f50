//! Configuration management for Svar.

mod prompts;
mod settings;

pub use prompts::{ExpansionPrompts, GradingPrompts, Prompts, QaPrompts, RerankPrompts};
pub use settings::{
    ChunkingSettings, EmbeddingSettings, GeneralSettings, GenerationSettings, GradingSettings,
    IndexingSettings, PromptSettings, RetrievalSettings, Settings, StorageSettings,
};
