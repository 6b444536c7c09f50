//! Search command implementation.

use super::build_engine;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

pub async fn run_search(
    query: &str,
    limit: usize,
    transcripts: Vec<String>,
    settings: Settings,
) -> Result<()> {
    let engine = build_engine(settings).await?;

    let spinner = Output::spinner("Searching...");
    let results = engine.search(query, limit, transcripts).await?;
    spinner.finish_and_clear();

    if results.is_empty() {
        Output::info("No matching passages found.");
        return Ok(());
    }

    for result in &results {
        Output::chunk_result(
            &result.chunk.transcript_id,
            result.chunk.sequence_index + 1,
            result.score,
            &result.source.to_string(),
            &result.chunk.text,
        );
    }

    Ok(())
}
