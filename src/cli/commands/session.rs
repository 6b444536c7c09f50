//! Session and feedback command implementations.

use super::{build_engine, parse_uuid};
use crate::cli::{Output, SessionAction};
use crate::config::Settings;
use crate::session::FeedbackKind;
use anyhow::Result;

pub async fn run_session(action: &SessionAction, settings: Settings) -> Result<()> {
    let engine = build_engine(settings).await?;

    match action {
        SessionAction::List => {
            let sessions = engine.list_sessions()?;
            if sessions.is_empty() {
                Output::info("No sessions yet. Create one with: svar session create");
                return Ok(());
            }

            Output::header("Sessions");
            for session in sessions {
                let scope = if session.transcript_ids.is_empty() {
                    "all transcripts".to_string()
                } else {
                    session.transcript_ids.join(", ")
                };
                Output::list_item(&format!(
                    "{} {} ({}, created {})",
                    session.id,
                    session.name.as_deref().unwrap_or("(unnamed)"),
                    scope,
                    session.created_at.format("%Y-%m-%d %H:%M"),
                ));
            }
        }

        SessionAction::Create { name, transcripts } => {
            let session = engine
                .create_session(name.clone(), transcripts.clone())
                .await?;
            Output::success(&format!("Created session {}", session.id));
        }

        SessionAction::Show { session_id } => {
            let id = parse_uuid(session_id, "session")?;
            let session = engine
                .get_session(id)?
                .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;

            Output::header(session.name.as_deref().unwrap_or("(unnamed session)"));
            Output::kv("id", &session.id.to_string());
            Output::kv(
                "scope",
                &if session.transcript_ids.is_empty() {
                    "all transcripts".to_string()
                } else {
                    session.transcript_ids.join(", ")
                },
            );

            let messages = engine.list_messages(id)?;
            if messages.is_empty() {
                Output::info("No messages yet.");
            }
            for message in messages {
                println!(
                    "\n{} {}",
                    console::style("Q:").bold(),
                    message.question
                );
                match message.status {
                    crate::session::MessageStatus::Answered => {
                        println!("{} {}", console::style("A:").bold(), message.answer);
                        if let Some(score) = message.quality_score {
                            Output::kv("quality", &format!("{:.1} / 5.0", score));
                        }
                    }
                    status => {
                        Output::kv("status", &status.to_string());
                        if let Some(error) = &message.error {
                            Output::kv("error", error);
                        }
                    }
                }
                Output::kv("message", &message.id.to_string());
            }
        }

        SessionAction::Delete { session_id } => {
            let id = parse_uuid(session_id, "session")?;
            engine.delete_session(id)?;
            Output::success(&format!("Deleted session {}", session_id));
        }
    }

    Ok(())
}

pub async fn run_feedback(
    message_id: &str,
    kind: &str,
    comment: Option<String>,
    settings: Settings,
) -> Result<()> {
    let id = parse_uuid(message_id, "message")?;
    let kind: FeedbackKind = kind
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let engine = build_engine(settings).await?;
    engine.submit_feedback(id, kind, comment).await?;

    Output::success("Feedback recorded. Thanks!");
    Ok(())
}
