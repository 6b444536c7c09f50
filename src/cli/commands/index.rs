//! Index, reindex, list, and delete command implementations.

use super::build_engine;
use crate::cli::{BarSink, Output};
use crate::config::Settings;
use crate::transcript::Transcript;
use anyhow::{anyhow, Result};
use std::io::Read;
use std::path::Path;

/// Register a transcript from a file (or stdin) and index it.
pub async fn run_index(
    file: &str,
    id: Option<String>,
    language: Option<String>,
    settings: Settings,
) -> Result<()> {
    let (text, default_id) = if file == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        (text, "stdin".to_string())
    } else {
        let path = Path::new(file);
        let text = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("transcript")
            .to_string();
        (text, stem)
    };

    let transcript_id = id.unwrap_or(default_id);

    let engine = build_engine(settings).await?;
    let library = engine
        .library()
        .ok_or_else(|| anyhow!("No transcript library configured"))?;

    let mut transcript = Transcript::new(transcript_id.clone(), text);
    transcript.language = language;
    transcript
        .metadata
        .insert("source".to_string(), file.to_string());
    library.upsert(&transcript)?;

    let bar = Output::progress_bar(0, "Indexing");
    let record = engine
        .index_transcript_with_progress(&transcript_id, &BarSink(bar.clone()))
        .await?;
    bar.finish_and_clear();

    if record.indexed {
        Output::success(&format!(
            "Indexed '{}' ({} chunks)",
            transcript_id, record.chunk_count
        ));
    } else {
        Output::warning(&format!(
            "'{}' was not indexed: {}",
            transcript_id,
            record.reason.as_deref().unwrap_or("unknown reason")
        ));
    }

    Ok(())
}

/// Reindex an already registered transcript.
pub async fn run_reindex(transcript_id: &str, settings: Settings) -> Result<()> {
    let engine = build_engine(settings).await?;

    let bar = Output::progress_bar(0, "Reindexing");
    let record = engine
        .index_transcript_with_progress(transcript_id, &BarSink(bar.clone()))
        .await?;
    bar.finish_and_clear();

    if record.indexed {
        Output::success(&format!(
            "Reindexed '{}' ({} chunks)",
            transcript_id, record.chunk_count
        ));
    } else {
        Output::warning(&format!(
            "'{}' was not indexed: {}",
            transcript_id,
            record.reason.as_deref().unwrap_or("unknown reason")
        ));
    }

    Ok(())
}

/// List indexed transcripts.
pub async fn run_list(settings: Settings) -> Result<()> {
    let engine = build_engine(settings).await?;
    let indexed = engine.list_indexed().await?;

    if indexed.is_empty() {
        Output::info("No transcripts indexed yet. Use: svar index <file>");
        return Ok(());
    }

    Output::header("Indexed transcripts");
    for entry in indexed {
        Output::list_item(&format!(
            "{} ({} chunks, {}, indexed {})",
            entry.transcript_id,
            entry.chunk_count,
            entry.model_id,
            entry.indexed_at.format("%Y-%m-%d %H:%M"),
        ));
    }

    Ok(())
}

/// Delete a transcript and its index entries.
pub async fn run_delete(transcript_id: &str, settings: Settings) -> Result<()> {
    let engine = build_engine(settings).await?;

    let deleted = engine.delete_transcript_index(transcript_id).await?;
    if let Some(library) = engine.library() {
        library.delete(transcript_id)?;
    }

    Output::success(&format!(
        "Deleted '{}' ({} index entries removed)",
        transcript_id, deleted
    ));
    Ok(())
}
