//! Answer quality scoring.
//!
//! The heuristic path is pure and deterministic: identical inputs always
//! produce identical scores, which keeps grading testable. The advanced
//! path asks the generation model to judge groundedness and completeness
//! and treats its variance as acceptable, falling back to the heuristics
//! whenever the judge call fails.

use crate::config::{GradingSettings, Prompts};
use crate::generation::{ChatTurn, GenerationRequest, Generator};
use crate::retrieval::RetrievedChunk;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Quality metrics for one answer, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct QualityMetrics {
    /// Fraction of answer claims attributable to the retrieved context.
    pub groundedness: f32,
    /// How completely the answer covers the question.
    pub completeness: f32,
    /// Similarity between question and answer.
    pub relevance: f32,
    /// Weighted combination of the three.
    pub overall: f32,
}

impl QualityMetrics {
    /// The 0-5 score shown to users.
    pub fn display_score(&self) -> f32 {
        self.overall * 5.0
    }

    /// The all-zero grade used for answers with no grounding context.
    pub fn ungrounded() -> Self {
        Self {
            groundedness: 0.0,
            completeness: 0.0,
            relevance: 0.0,
            overall: 0.0,
        }
    }
}

/// Scores answers for groundedness, completeness, and relevance.
pub struct QualityGrader {
    generator: Arc<dyn Generator>,
    prompts: Prompts,
    settings: GradingSettings,
}

impl QualityGrader {
    pub fn new(generator: Arc<dyn Generator>, prompts: Prompts, settings: GradingSettings) -> Self {
        Self {
            generator,
            prompts,
            settings,
        }
    }

    /// Grade an answer. With `advanced` enabled the judge model scores
    /// groundedness and completeness; relevance always stays heuristic.
    #[instrument(skip_all, fields(advanced))]
    pub async fn grade(
        &self,
        question: &str,
        answer: &str,
        retrieved: &[RetrievedChunk],
        advanced: bool,
        model: &str,
    ) -> QualityMetrics {
        if retrieved.is_empty() {
            return QualityMetrics::ungrounded();
        }

        let heuristic = self.grade_heuristic(question, answer, retrieved);
        if !advanced {
            return heuristic;
        }

        match self.judge(question, answer, retrieved, model).await {
            Some((groundedness, completeness)) => {
                let metrics = self.combine(groundedness, completeness, heuristic.relevance);
                debug!(
                    "Judge grading: groundedness={:.2} completeness={:.2} relevance={:.2}",
                    metrics.groundedness, metrics.completeness, metrics.relevance
                );
                metrics
            }
            None => {
                warn!("Judge grading failed, using heuristic scores");
                heuristic
            }
        }
    }

    /// Deterministic lexical grading. Side-effect free.
    pub fn grade_heuristic(
        &self,
        question: &str,
        answer: &str,
        retrieved: &[RetrievedChunk],
    ) -> QualityMetrics {
        if retrieved.is_empty() {
            return QualityMetrics::ungrounded();
        }

        let chunk_tokens: HashSet<String> = retrieved
            .iter()
            .flat_map(|r| content_tokens(&r.chunk.text))
            .collect();

        let groundedness = groundedness_score(answer, &chunk_tokens);
        let completeness = completeness_score(question, answer);
        let relevance = relevance_score(question, answer);

        self.combine(groundedness, completeness, relevance)
    }

    fn combine(&self, groundedness: f32, completeness: f32, relevance: f32) -> QualityMetrics {
        let weights = &self.settings;
        let weight_sum = (weights.groundedness_weight
            + weights.completeness_weight
            + weights.relevance_weight)
            .max(f32::EPSILON);
        let overall = (groundedness * weights.groundedness_weight
            + completeness * weights.completeness_weight
            + relevance * weights.relevance_weight)
            / weight_sum;

        QualityMetrics {
            groundedness: groundedness.clamp(0.0, 1.0),
            completeness: completeness.clamp(0.0, 1.0),
            relevance: relevance.clamp(0.0, 1.0),
            overall: overall.clamp(0.0, 1.0),
        }
    }

    /// Ask the judge model for groundedness and completeness scores.
    async fn judge(
        &self,
        question: &str,
        answer: &str,
        retrieved: &[RetrievedChunk],
        model: &str,
    ) -> Option<(f32, f32)> {
        let context: String = retrieved
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        // Keep the judge prompt bounded for long contexts.
        let context: String = context.chars().take(2000).collect();

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("answer".to_string(), answer.to_string());
        vars.insert("context".to_string(), context);

        let groundedness = self
            .judge_score(
                &self.prompts.grading.groundedness_system,
                &self
                    .prompts
                    .render_with_custom(&self.prompts.grading.groundedness, &vars),
                model,
            )
            .await?;

        let completeness = self
            .judge_score(
                &self.prompts.grading.completeness_system,
                &self
                    .prompts
                    .render_with_custom(&self.prompts.grading.completeness, &vars),
                model,
            )
            .await?;

        Some((groundedness, completeness))
    }

    async fn judge_score(&self, system: &str, prompt: &str, model: &str) -> Option<f32> {
        let response = self
            .generator
            .complete(GenerationRequest {
                model: model.to_string(),
                messages: vec![ChatTurn::system(system.to_string()), ChatTurn::user(prompt.to_string())],
                temperature: 0.1,
                max_tokens: Some(50),
            })
            .await
            .ok()?;

        extract_score(&response)
    }
}

/// Pull the first numeric value out of a judge response and clamp it.
fn extract_score(text: &str) -> Option<f32> {
    let re = Regex::new(r"\d*\.?\d+").ok()?;
    let m = re.find(text)?;
    m.as_str().parse::<f32>().ok().map(|v| v.clamp(0.0, 1.0))
}

/// Words carrying no content signal, skipped by all lexical metrics.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "did", "do", "does", "for", "from",
    "had", "has", "have", "he", "her", "his", "how", "i", "if", "in", "into", "is", "it", "its",
    "me", "my", "no", "not", "of", "on", "or", "our", "she", "so", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "to", "was", "we", "were", "what", "when", "where",
    "which", "who", "why", "will", "with", "you", "your",
];

fn content_tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

/// Mean over answer sentences of their token overlap with the context.
fn groundedness_score(answer: &str, chunk_tokens: &HashSet<String>) -> f32 {
    let sentences: Vec<Vec<String>> = answer
        .split(['.', '!', '?', '\n'])
        .map(content_tokens)
        .filter(|tokens| !tokens.is_empty())
        .collect();

    if sentences.is_empty() {
        return 0.0;
    }

    let total: f32 = sentences
        .iter()
        .map(|tokens| {
            let supported = tokens.iter().filter(|t| chunk_tokens.contains(*t)).count();
            supported as f32 / tokens.len() as f32
        })
        .sum();

    total / sentences.len() as f32
}

/// Coverage of the question's content tokens by the answer.
fn completeness_score(question: &str, answer: &str) -> f32 {
    let question_tokens: HashSet<String> = content_tokens(question).into_iter().collect();
    if question_tokens.is_empty() {
        return 1.0;
    }

    let answer_tokens: HashSet<String> = content_tokens(answer).into_iter().collect();
    let covered = question_tokens
        .iter()
        .filter(|t| answer_tokens.contains(*t))
        .count();
    covered as f32 / question_tokens.len() as f32
}

/// Cosine similarity of question/answer term-frequency vectors.
fn relevance_score(question: &str, answer: &str) -> f32 {
    let q_counts = token_counts(question);
    let a_counts = token_counts(answer);
    if q_counts.is_empty() || a_counts.is_empty() {
        return 0.0;
    }

    let dot: f32 = q_counts
        .iter()
        .filter_map(|(t, q)| a_counts.get(t).map(|a| (*q * *a) as f32))
        .sum();
    let q_norm: f32 = (q_counts.values().map(|v| (v * v) as f32).sum::<f32>()).sqrt();
    let a_norm: f32 = (a_counts.values().map(|v| (v * v) as f32).sum::<f32>()).sqrt();

    if q_norm == 0.0 || a_norm == 0.0 {
        0.0
    } else {
        dot / (q_norm * a_norm)
    }
}

fn token_counts(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in content_tokens(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}
