//! Init command implementation.

use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

/// Create data directories and write the default configuration file.
pub fn run_init(settings: &Settings) -> Result<()> {
    std::fs::create_dir_all(settings.data_dir())?;

    let config_path = Settings::default_config_path();
    if config_path.exists() {
        Output::info(&format!("Configuration already exists at {:?}", config_path));
    } else {
        settings.save()?;
        Output::success(&format!("Wrote default configuration to {:?}", config_path));
    }

    Output::kv("data dir", &settings.data_dir().display().to_string());
    Output::kv("vector store", &settings.vectors_path().display().to_string());
    Output::kv("embedding model", &settings.embedding.model);
    Output::kv("generation model", &settings.generation.model);

    if std::env::var("OPENAI_API_KEY").is_err() {
        Output::warning("OPENAI_API_KEY is not set; embedding and generation calls will fail");
    }

    Output::success("Svar is ready. Index a transcript with: svar index <file>");
    Ok(())
}
