//! Status command implementation.

use super::build_engine;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

pub async fn run_status(settings: Settings) -> Result<()> {
    let engine = build_engine(settings).await?;
    let status = engine.status().await;

    Output::header("System status");
    Output::kv(
        "vector store",
        if status.vector_store_available {
            "available"
        } else {
            "unavailable (lexical-only retrieval)"
        },
    );
    Output::kv(
        "embedding provider",
        &format!(
            "{} (primary {}, fallback {})",
            status.embedding.active_model,
            if status.embedding.primary_available {
                "available"
            } else {
                "disabled"
            },
            if status.embedding.fallback_available {
                "configured"
            } else {
                "none"
            },
        ),
    );
    Output::kv("indexed transcripts", &status.indexed_transcripts.to_string());
    Output::kv("vector points", &status.total_chunks.to_string());
    Output::kv("lexical documents", &status.lexical_documents.to_string());

    Ok(())
}
