//! Ask command implementation.

use super::{build_engine, parse_uuid};
use crate::cli::Output;
use crate::config::Settings;
use crate::engine::AskOptions;
use crate::session::MessageStatus;
use anyhow::Result;

#[allow(clippy::too_many_arguments)]
pub async fn run_ask(
    question: &str,
    session: Option<String>,
    transcripts: Vec<String>,
    top_k: usize,
    model: Option<String>,
    temperature: Option<f32>,
    no_rerank: bool,
    no_expand: bool,
    multi_hop: bool,
    no_hybrid: bool,
    advanced_grading: bool,
    settings: Settings,
) -> Result<()> {
    let session_id = session
        .as_deref()
        .map(|s| parse_uuid(s, "session"))
        .transpose()?;

    let engine = build_engine(settings).await?;

    let options = AskOptions {
        top_k,
        model,
        temperature,
        reranking: !no_rerank,
        query_expansion: !no_expand,
        multi_hop,
        hybrid_search: !no_hybrid,
        advanced_grading,
        transcript_ids: transcripts,
    };

    let spinner = Output::spinner("Searching transcripts...");
    let message = engine.ask(question, options, session_id).await;
    spinner.finish_and_clear();

    let message = match message {
        Ok(message) => message,
        Err(e) => {
            Output::error(&format!("Failed to answer question: {}", e));
            return Err(e.into());
        }
    };

    match message.status {
        MessageStatus::Answered => {
            println!("\n{}\n", message.answer);

            if !message.retrieved_chunks.is_empty() {
                Output::header("Sources");
                for (i, chunk) in message.retrieved_chunks.iter().enumerate() {
                    Output::list_item(&format!(
                        "[{}] {} passage {} (score: {:.2}, {})",
                        i + 1,
                        chunk.chunk.transcript_id,
                        chunk.chunk.sequence_index + 1,
                        chunk.score,
                        chunk.source,
                    ));
                }
            }

            if let Some(metrics) = &message.quality_metrics {
                Output::header("Quality");
                Output::kv("score", &format!("{:.1} / 5.0", metrics.display_score()));
                Output::kv(
                    "metrics",
                    &format!(
                        "groundedness {:.2}, completeness {:.2}, relevance {:.2}",
                        metrics.groundedness, metrics.completeness, metrics.relevance
                    ),
                );
            }

            Output::kv("message", &message.id.to_string());
            Output::info("Record feedback with: svar feedback <message-id> <positive|negative>");
        }
        MessageStatus::Failed => {
            Output::error(&format!(
                "Answer generation failed: {}",
                message.error.as_deref().unwrap_or("unknown error")
            ));
        }
        MessageStatus::Pending => {
            // finalize_message never leaves a message pending.
            Output::warning("Message is still pending");
        }
    }

    Ok(())
}
