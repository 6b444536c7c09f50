//! The hybrid retriever: expansion, concurrent branches, fusion,
//! reranking, and bounded multi-hop refinement.

use super::{fuse, CandidateMap, RetrievalOptions, RetrievedChunk};
use crate::config::{Prompts, RetrievalSettings};
use crate::embedding::FailoverEmbeddings;
use crate::error::Result;
use crate::generation::{ChatTurn, GenerationRequest, Generator};
use crate::index::Bm25Index;
use crate::vector_store::VectorStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Retrieves chunks by fusing lexical and semantic rankings.
pub struct HybridRetriever {
    vector_store: Option<Arc<dyn VectorStore>>,
    bm25: Arc<Bm25Index>,
    embeddings: Arc<FailoverEmbeddings>,
    generator: Arc<dyn Generator>,
    prompts: Prompts,
    settings: RetrievalSettings,
}

#[derive(Debug, Deserialize)]
struct RerankScore {
    index: usize,
    score: f32,
}

impl HybridRetriever {
    pub fn new(
        vector_store: Option<Arc<dyn VectorStore>>,
        bm25: Arc<Bm25Index>,
        embeddings: Arc<FailoverEmbeddings>,
        generator: Arc<dyn Generator>,
        prompts: Prompts,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            vector_store,
            bm25,
            embeddings,
            generator,
            prompts,
            settings,
        }
    }

    /// Retrieve up to `top_k` chunks for a question.
    ///
    /// Returns an empty list (not an error) when nothing matches; the
    /// composer turns that into an insufficient-information answer.
    #[instrument(skip(self, options, transcript_filter), fields(top_k = options.top_k))]
    pub async fn retrieve(
        &self,
        question: &str,
        options: &RetrievalOptions,
        transcript_filter: Option<&[String]>,
    ) -> Result<Vec<RetrievedChunk>> {
        if question.trim().is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut queries = vec![question.to_string()];
        if options.query_expansion {
            queries.extend(self.expand_query(question, &options.model).await);
            debug!("Running retrieval with {} query variants", queries.len());
        }

        let fetch_k = options.top_k * self.settings.fusion_multiplier.max(1);
        let (mut vector_candidates, mut bm25_candidates) = self
            .gather_candidates(&queries, fetch_k, options, transcript_filter)
            .await;

        // One bounded refinement pass: extract a sharper query from the
        // first-pass context, retrieve again, and merge before fusion.
        if options.multi_hop && !(vector_candidates.is_empty() && bm25_candidates.is_empty()) {
            let preview = fuse(
                &vector_candidates,
                &bm25_candidates,
                self.settings.vector_weight,
                self.settings.bm25_weight,
            );
            if let Some(refined) = self.refine_query(question, &preview, &options.model).await {
                info!("Multi-hop refinement query: {}", refined);
                let (hop_vector, hop_bm25) = self
                    .gather_candidates(&[refined], fetch_k, options, transcript_filter)
                    .await;
                merge_candidates(&mut vector_candidates, hop_vector);
                merge_candidates(&mut bm25_candidates, hop_bm25);
            }
        }

        let mut results = fuse(
            &vector_candidates,
            &bm25_candidates,
            self.settings.vector_weight,
            self.settings.bm25_weight,
        );

        self.order_ties_by_recency(&mut results).await;

        if options.reranking && results.len() > options.top_k {
            results = self.rerank(question, results, &options.model).await;
        }

        results.truncate(options.top_k);
        Ok(results)
    }

    /// Run every query variant through both branches concurrently and
    /// union the candidates, keeping the best raw score per chunk.
    async fn gather_candidates(
        &self,
        queries: &[String],
        fetch_k: usize,
        options: &RetrievalOptions,
        transcript_filter: Option<&[String]>,
    ) -> (CandidateMap, CandidateMap) {
        let per_query = queries.iter().map(|query| {
            let query = query.clone();
            async move {
                let vector_future = self.vector_branch(&query, fetch_k, transcript_filter);
                let bm25_future = async {
                    self.bm25
                        .search(&query, fetch_k, transcript_filter)
                        .into_iter()
                        .map(|hit| (hit.chunk.id.clone(), (hit.chunk, hit.score)))
                        .collect::<CandidateMap>()
                };
                tokio::join!(vector_future, bm25_future)
            }
        });

        let mut vector_candidates: CandidateMap = HashMap::new();
        let mut bm25_candidates: CandidateMap = HashMap::new();
        let mut vector_failed = false;

        for (vector_result, bm25_hits) in join_all(per_query).await {
            match vector_result {
                Ok(hits) => merge_candidates(&mut vector_candidates, hits),
                Err(e) => {
                    vector_failed = true;
                    warn!("Vector search branch failed: {}", e);
                }
            }
            merge_candidates(&mut bm25_candidates, bm25_hits);
        }

        // Vector-only mode still degrades to the lexical branch when the
        // vector store is unreachable; otherwise honor the option.
        if !options.hybrid_search && !(vector_failed || vector_candidates.is_empty()) {
            bm25_candidates.clear();
        }

        (vector_candidates, bm25_candidates)
    }

    /// Semantic branch for one query: embed per active model and search
    /// the matching collections so dimensions never mix.
    async fn vector_branch(
        &self,
        query: &str,
        fetch_k: usize,
        transcript_filter: Option<&[String]>,
    ) -> Result<CandidateMap> {
        let store = match &self.vector_store {
            Some(store) => store,
            None => {
                return Err(crate::error::SvarError::UpstreamUnavailable {
                    service: "vector store",
                    detail: "not configured".to_string(),
                })
            }
        };

        let mut candidates: CandidateMap = HashMap::new();
        for model_id in store.active_models().await? {
            let query_vector = match self
                .embeddings
                .embed_query_for_model(&model_id, query)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    warn!("Cannot embed query for model {}: {}", model_id, e);
                    continue;
                }
            };

            let hits = store
                .search(&model_id, &query_vector, fetch_k, transcript_filter)
                .await?;
            for hit in hits {
                if hit.score < self.settings.min_vector_score {
                    continue;
                }
                merge_candidate(&mut candidates, hit.chunk, hit.score);
            }
        }

        Ok(candidates)
    }

    /// Generate paraphrases and a hypothetical answer to widen recall.
    /// Failures degrade to the original question alone.
    async fn expand_query(&self, question: &str, model: &str) -> Vec<String> {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());

        let mut expanded = Vec::new();

        let reformulate = self
            .prompts
            .render_with_custom(&self.prompts.expansion.reformulate, &vars);
        match self
            .generator
            .complete(GenerationRequest {
                model: model.to_string(),
                messages: vec![
                    ChatTurn::system(self.prompts.expansion.system.clone()),
                    ChatTurn::user(reformulate),
                ],
                temperature: 0.5,
                max_tokens: Some(200),
            })
            .await
        {
            Ok(text) => {
                expanded.extend(
                    text.lines()
                        .map(|l| l.trim())
                        .filter(|l| !l.is_empty())
                        .take(2)
                        .map(|l| l.to_string()),
                );
            }
            Err(e) => warn!("Query reformulation failed: {}", e),
        }

        let hypothetical = self
            .prompts
            .render_with_custom(&self.prompts.expansion.hypothetical, &vars);
        match self
            .generator
            .complete(GenerationRequest {
                model: model.to_string(),
                messages: vec![
                    ChatTurn::system(self.prompts.expansion.system.clone()),
                    ChatTurn::user(hypothetical),
                ],
                temperature: 0.3,
                max_tokens: Some(150),
            })
            .await
        {
            Ok(text) => {
                let text = text.trim();
                if !text.is_empty() {
                    expanded.push(text.to_string());
                }
            }
            Err(e) => warn!("Hypothetical answer generation failed: {}", e),
        }

        expanded.truncate(self.settings.max_expansions);
        if !expanded.is_empty() {
            info!("Query expansion produced {} variants", expanded.len());
        }
        expanded
    }

    /// Ask the model for one refined query based on first-pass context.
    async fn refine_query(
        &self,
        question: &str,
        first_pass: &[RetrievedChunk],
        model: &str,
    ) -> Option<String> {
        let context: String = first_pass
            .iter()
            .take(3)
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n---\n");

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context);

        let prompt = self
            .prompts
            .render_with_custom(&self.prompts.expansion.refine, &vars);
        match self
            .generator
            .complete(GenerationRequest {
                model: model.to_string(),
                messages: vec![
                    ChatTurn::system(self.prompts.expansion.system.clone()),
                    ChatTurn::user(prompt),
                ],
                temperature: 0.3,
                max_tokens: Some(100),
            })
            .await
        {
            Ok(text) => {
                let refined = text.trim().to_string();
                (!refined.is_empty() && refined != question).then_some(refined)
            }
            Err(e) => {
                warn!("Multi-hop refinement failed: {}", e);
                None
            }
        }
    }

    /// Score (question, chunk) pairs with the model and replace fusion
    /// scores with the model's. Falls back to the fused order on failure.
    async fn rerank(
        &self,
        question: &str,
        mut results: Vec<RetrievedChunk>,
        model: &str,
    ) -> Vec<RetrievedChunk> {
        let passages: String = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}", i + 1, r.chunk.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("passages".to_string(), passages);

        let prompt = self
            .prompts
            .render_with_custom(&self.prompts.rerank.user, &vars);
        let response = self
            .generator
            .complete(GenerationRequest {
                model: model.to_string(),
                messages: vec![
                    ChatTurn::system(self.prompts.rerank.system.clone()),
                    ChatTurn::user(prompt),
                ],
                temperature: 0.1,
                max_tokens: Some(500),
            })
            .await;

        let text = match response {
            Ok(text) => text,
            Err(e) => {
                warn!("Reranking failed, keeping fusion order: {}", e);
                return results;
            }
        };

        match parse_rerank_scores(&text, results.len()) {
            Some(scores) => {
                for (i, result) in results.iter_mut().enumerate() {
                    result.score = scores[i].clamp(0.0, 1.0);
                }
                results.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
                });
                info!("Reranked {} chunks", results.len());
                results
            }
            None => {
                warn!("Could not parse rerank response, keeping fusion order");
                results
            }
        }
    }

    /// Stable-order equal-score results by transcript recency (newest
    /// transcript first), after sequence index.
    async fn order_ties_by_recency(&self, results: &mut [RetrievedChunk]) {
        let recency: HashMap<String, DateTime<Utc>> = match &self.vector_store {
            Some(store) => match store.list_indexed().await {
                Ok(list) => list
                    .into_iter()
                    .map(|t| (t.transcript_id, t.indexed_at))
                    .collect(),
                Err(_) => HashMap::new(),
            },
            None => HashMap::new(),
        };

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.sequence_index.cmp(&b.chunk.sequence_index))
                .then_with(|| {
                    let ra = recency.get(&a.chunk.transcript_id);
                    let rb = recency.get(&b.chunk.transcript_id);
                    rb.cmp(&ra)
                })
        });
    }
}

/// Union candidate maps, keeping the best raw score per chunk.
fn merge_candidates(target: &mut CandidateMap, source: CandidateMap) {
    for (id, (chunk, score)) in source {
        merge_candidate_by_id(target, id, chunk, score);
    }
}

fn merge_candidate(target: &mut CandidateMap, chunk: crate::chunking::Chunk, score: f32) {
    merge_candidate_by_id(target, chunk.id.clone(), chunk, score);
}

fn merge_candidate_by_id(
    target: &mut CandidateMap,
    id: String,
    chunk: crate::chunking::Chunk,
    score: f32,
) {
    target
        .entry(id)
        .and_modify(|(_, existing)| *existing = existing.max(score))
        .or_insert((chunk, score));
}

/// Extract `[{"index": 1, "score": 0.9}, ...]` from a model response that
/// may wrap the JSON in prose or a code fence.
fn parse_rerank_scores(response: &str, count: usize) -> Option<Vec<f32>> {
    let json_start = response.find('[')?;
    let json_end = response.rfind(']')?;
    if json_end <= json_start {
        return None;
    }

    let parsed: Vec<RerankScore> = serde_json::from_str(&response[json_start..=json_end]).ok()?;
    if parsed.is_empty() {
        return None;
    }

    let mut scores = vec![0.0f32; count];
    for item in parsed {
        // Passages are numbered from 1 in the prompt.
        if item.index >= 1 && item.index <= count {
            scores[item.index - 1] = item.score;
        }
    }
    Some(scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rerank_scores_plain_json() {
        let text = r#"[{"index": 1, "score": 0.9}, {"index": 2, "score": 0.2}]"#;
        let scores = parse_rerank_scores(text, 2).unwrap();
        assert_eq!(scores, vec![0.9, 0.2]);
    }

    #[test]
    fn test_parse_rerank_scores_with_markdown() {
        let text = "Here are the scores:\n\n```json\n[{\"index\": 2, \"score\": 0.7}, {\"index\": 1, \"score\": 0.1}]\n```\nDone.";
        let scores = parse_rerank_scores(text, 2).unwrap();
        assert_eq!(scores, vec![0.1, 0.7]);
    }

    #[test]
    fn test_parse_rerank_scores_ignores_out_of_range_indexes() {
        let text = r#"[{"index": 5, "score": 0.9}, {"index": 1, "score": 0.4}]"#;
        let scores = parse_rerank_scores(text, 2).unwrap();
        assert_eq!(scores, vec![0.4, 0.0]);
    }

    #[test]
    fn test_parse_rerank_scores_rejects_garbage() {
        assert!(parse_rerank_scores("no json here", 2).is_none());
        assert!(parse_rerank_scores("[]", 2).is_none());
    }

    #[test]
    fn test_merge_keeps_best_score() {
        let mut target: CandidateMap = HashMap::new();
        let chunk = crate::chunking::Chunk {
            id: "t#0000".to_string(),
            transcript_id: "t".to_string(),
            text: "x".to_string(),
            start_offset: 0,
            end_offset: 1,
            sequence_index: 0,
        };
        merge_candidate(&mut target, chunk.clone(), 0.4);
        merge_candidate(&mut target, chunk.clone(), 0.9);
        merge_candidate(&mut target, chunk, 0.2);
        assert_eq!(target.len(), 1);
        assert!((target["t#0000"].1 - 0.9).abs() < 1e-6);
    }
}
