//! Config command implementation.

use crate::cli::{ConfigAction, Output};
use crate::config::Settings;
use anyhow::{anyhow, Result};

pub fn run_config(action: &ConfigAction, mut settings: Settings) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml_str = toml::to_string_pretty(&settings)?;
            println!("{}", toml_str);
        }

        ConfigAction::Set { key, value } => {
            set_key(&mut settings, key, value)?;
            settings.save()?;
            Output::success(&format!("Set {} = {}", key, value));
        }

        ConfigAction::Path => {
            println!("{}", Settings::default_config_path().display());
        }
    }

    Ok(())
}

/// Apply a dotted-key assignment to the settings.
fn set_key(settings: &mut Settings, key: &str, value: &str) -> Result<()> {
    match key {
        "general.data_dir" => settings.general.data_dir = value.to_string(),
        "general.log_level" => settings.general.log_level = value.to_string(),
        "chunking.target_size" => settings.chunking.target_size = value.parse()?,
        "chunking.overlap" => settings.chunking.overlap = value.parse()?,
        "embedding.model" => settings.embedding.model = value.to_string(),
        "embedding.dimensions" => settings.embedding.dimensions = value.parse()?,
        "embedding.local_fallback" => settings.embedding.local_fallback = value.parse()?,
        "retrieval.top_k" => settings.retrieval.top_k = value.parse()?,
        "retrieval.vector_weight" => settings.retrieval.vector_weight = value.parse()?,
        "retrieval.bm25_weight" => settings.retrieval.bm25_weight = value.parse()?,
        "retrieval.min_vector_score" => settings.retrieval.min_vector_score = value.parse()?,
        "generation.model" => settings.generation.model = value.to_string(),
        "generation.temperature" => settings.generation.temperature = value.parse()?,
        "generation.max_tokens" => settings.generation.max_tokens = value.parse()?,
        "indexing.max_concurrent" => settings.indexing.max_concurrent = value.parse()?,
        _ => return Err(anyhow!("Unknown configuration key: {}", key)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_known_keys() {
        let mut settings = Settings::default();
        set_key(&mut settings, "generation.model", "gpt-4o").unwrap();
        assert_eq!(settings.generation.model, "gpt-4o");

        set_key(&mut settings, "retrieval.top_k", "8").unwrap();
        assert_eq!(settings.retrieval.top_k, 8);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut settings = Settings::default();
        assert!(set_key(&mut settings, "nope.nothing", "1").is_err());
    }
}
