//! Grounded answer composition.
//!
//! Builds the QA prompt from retrieved chunks and prior session turns and
//! calls the generation model. An empty context never reaches the model:
//! it short-circuits to a fixed insufficient-information answer.

use crate::config::{GenerationSettings, Prompts};
use crate::error::Result;
use crate::generation::{ChatTurn, GenerationRequest, Generator};
use crate::retrieval::RetrievedChunk;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One prior turn of a session, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub question: String,
    pub answer: String,
}

/// Per-question generation options.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Composes grounded answers from retrieved context.
pub struct AnswerComposer {
    generator: Arc<dyn Generator>,
    prompts: Prompts,
    settings: GenerationSettings,
}

impl AnswerComposer {
    pub fn new(
        generator: Arc<dyn Generator>,
        prompts: Prompts,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            generator,
            prompts,
            settings,
        }
    }

    /// The fixed answer used when retrieval produced no context.
    pub fn insufficient_answer(&self) -> String {
        self.prompts.qa.insufficient.clone()
    }

    /// Compose an answer for a question from retrieved chunks and prior
    /// session turns.
    #[instrument(skip(self, retrieved, history), fields(chunks = retrieved.len()))]
    pub async fn compose(
        &self,
        question: &str,
        retrieved: &[RetrievedChunk],
        history: &[HistoryTurn],
        options: &ComposeOptions,
    ) -> Result<String> {
        if retrieved.is_empty() {
            debug!("No context retrieved, returning insufficient-information answer");
            return Ok(self.insufficient_answer());
        }

        let context = format_context(retrieved);

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context);

        let user_prompt = self.prompts.render_with_custom(&self.prompts.qa.user, &vars);

        let mut messages = vec![ChatTurn::system(self.prompts.qa.system.clone())];
        messages.extend(truncate_history(history, self.settings.history_budget));
        messages.push(ChatTurn::user(user_prompt));

        let answer = self
            .generator
            .complete(GenerationRequest {
                model: options.model.clone(),
                messages,
                temperature: options.temperature.clamp(0.0, 2.0),
                max_tokens: Some(options.max_tokens),
            })
            .await?;

        debug!("Composed answer from {} chunks", retrieved.len());
        Ok(answer)
    }
}

/// Format retrieved chunks as a numbered context block, each labeled with
/// its transcript origin so citations can be traced back.
pub fn format_context(retrieved: &[RetrievedChunk]) -> String {
    retrieved
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "[{}] (transcript {}, passage {}) {}",
                i + 1,
                r.chunk.transcript_id,
                r.chunk.sequence_index + 1,
                r.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Convert prior turns into chat messages, dropping the oldest turns
/// first until the remaining text fits the character budget.
fn truncate_history(history: &[HistoryTurn], budget: usize) -> Vec<ChatTurn> {
    let mut kept: Vec<&HistoryTurn> = Vec::new();
    let mut used = 0usize;

    for turn in history.iter().rev() {
        let cost = turn.question.len() + turn.answer.len();
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(turn);
    }

    kept.iter()
        .rev()
        .flat_map(|turn| {
            [
                ChatTurn::user(turn.question.clone()),
                ChatTurn::assistant(turn.answer.clone()),
            ]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::Chunk;
    use crate::error::SvarError;
    use crate::generation::Role;
    use crate::retrieval::RetrievalSource;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requests and replies with a scripted answer.
    struct ScriptedGenerator {
        reply: String,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        fn last_request(&self) -> GenerationRequest {
            self.requests.lock().unwrap().last().unwrap().clone()
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn complete(&self, request: GenerationRequest) -> Result<String> {
            self.requests.lock().unwrap().push(request);
            Ok(self.reply.clone())
        }
    }

    /// A generator that must never be called.
    struct UnreachableGenerator;

    #[async_trait]
    impl Generator for UnreachableGenerator {
        async fn complete(&self, _request: GenerationRequest) -> Result<String> {
            Err(SvarError::Generation(
                "generator should not have been called".to_string(),
            ))
        }
    }

    fn retrieved(transcript_id: &str, index: usize, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk: Chunk {
                id: Chunk::derive_id(transcript_id, index),
                transcript_id: transcript_id.to_string(),
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
                sequence_index: index,
            },
            score: 0.9,
            source: RetrievalSource::Hybrid,
        }
    }

    fn composer(generator: Arc<dyn Generator>) -> AnswerComposer {
        AnswerComposer::new(generator, Prompts::default(), GenerationSettings::default())
    }

    fn options() -> ComposeOptions {
        ComposeOptions {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 1000,
        }
    }

    #[tokio::test]
    async fn test_empty_context_short_circuits() {
        let composer = composer(Arc::new(UnreachableGenerator));
        let answer = composer
            .compose("When is the deadline?", &[], &[], &options())
            .await
            .unwrap();
        assert_eq!(answer, Prompts::default().qa.insufficient);
    }

    #[tokio::test]
    async fn test_prompt_contains_numbered_context_and_question() {
        let generator = Arc::new(ScriptedGenerator::new("The deadline is March 5 [1]."));
        let composer = composer(generator.clone());

        let chunks = vec![
            retrieved("t1", 0, "Alice proposed deadline March 5."),
            retrieved("t1", 1, "Bob agreed."),
        ];
        let answer = composer
            .compose("When is the deadline?", &chunks, &[], &options())
            .await
            .unwrap();
        assert!(answer.contains("March 5"));

        let request = generator.last_request();
        let user = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .unwrap();
        assert!(user.content.contains("[1] (transcript t1, passage 1)"));
        assert!(user.content.contains("[2] (transcript t1, passage 2)"));
        assert!(user.content.contains("When is the deadline?"));
        assert_eq!(generator.request_count(), 1);
    }

    #[tokio::test]
    async fn test_temperature_is_clamped() {
        let generator = Arc::new(ScriptedGenerator::new("ok"));
        let composer = composer(generator.clone());

        let mut opts = options();
        opts.temperature = 9.0;
        composer
            .compose("q", &[retrieved("t", 0, "x")], &[], &opts)
            .await
            .unwrap();
        assert!((generator.last_request().temperature - 2.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_history_included_oldest_first() {
        let generator = Arc::new(ScriptedGenerator::new("ok"));
        let composer = composer(generator.clone());

        let history = vec![
            HistoryTurn {
                question: "first?".to_string(),
                answer: "one".to_string(),
            },
            HistoryTurn {
                question: "second?".to_string(),
                answer: "two".to_string(),
            },
        ];
        composer
            .compose("third?", &[retrieved("t", 0, "x")], &history, &options())
            .await
            .unwrap();

        let request = generator.last_request();
        let contents: Vec<&str> = request.messages.iter().map(|m| m.content.as_str()).collect();
        let first_pos = contents.iter().position(|c| *c == "first?").unwrap();
        let second_pos = contents.iter().position(|c| *c == "second?").unwrap();
        assert!(first_pos < second_pos);
    }

    #[test]
    fn test_history_truncation_drops_oldest() {
        let history = vec![
            HistoryTurn {
                question: "a".repeat(50),
                answer: "b".repeat(50),
            },
            HistoryTurn {
                question: "recent question".to_string(),
                answer: "recent answer".to_string(),
            },
        ];

        let turns = truncate_history(&history, 40);
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].content, "recent question");
    }
}
