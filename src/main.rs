//! Svar CLI entry point.

use anyhow::Result;
use clap::Parser;
use svar::cli::{commands, Cli, Commands};
use svar::config::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("svar={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Ensure the data directory exists
    std::fs::create_dir_all(settings.data_dir())?;

    // Execute command
    match &cli.command {
        Commands::Init => {
            commands::run_init(&settings)?;
        }

        Commands::Index { file, id, language } => {
            commands::run_index(file, id.clone(), language.clone(), settings).await?;
        }

        Commands::Reindex { transcript_id } => {
            commands::run_reindex(transcript_id, settings).await?;
        }

        Commands::Ask {
            question,
            session,
            transcripts,
            top_k,
            model,
            temperature,
            no_rerank,
            no_expand,
            multi_hop,
            no_hybrid,
            advanced_grading,
        } => {
            commands::run_ask(
                question,
                session.clone(),
                transcripts.clone(),
                *top_k,
                model.clone(),
                *temperature,
                *no_rerank,
                *no_expand,
                *multi_hop,
                *no_hybrid,
                *advanced_grading,
                settings,
            )
            .await?;
        }

        Commands::Search {
            query,
            limit,
            transcripts,
        } => {
            commands::run_search(query, *limit, transcripts.clone(), settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Delete { transcript_id } => {
            commands::run_delete(transcript_id, settings).await?;
        }

        Commands::Status => {
            commands::run_status(settings).await?;
        }

        Commands::Session { action } => {
            commands::run_session(action, settings).await?;
        }

        Commands::Feedback {
            message_id,
            kind,
            comment,
        } => {
            commands::run_feedback(message_id, kind, comment.clone(), settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, settings)?;
        }
    }

    Ok(())
}
