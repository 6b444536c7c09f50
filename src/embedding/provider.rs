//! Primary/fallback embedding provider with model tagging.

use super::{Embedder, EmbeddingBatch};
use crate::error::{Result, SvarError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{instrument, warn};

/// Reachability snapshot of the embedding providers.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderStatus {
    /// Model that the next embedding call will use.
    pub active_model: String,
    /// Whether the primary API is still considered usable.
    pub primary_available: bool,
    /// Whether a local fallback is configured.
    pub fallback_available: bool,
}

/// Embeds with the primary API and falls back to the local model when the
/// primary fails. Results are tagged with the producing model so callers
/// can route vectors to dimension-compatible collections.
pub struct FailoverEmbeddings {
    primary: Arc<dyn Embedder>,
    fallback: Option<Arc<dyn Embedder>>,
    /// Set when the primary returns a not-supported class of error
    /// (404); the primary is then skipped for the rest of the process.
    primary_disabled: AtomicBool,
}

impl FailoverEmbeddings {
    pub fn new(primary: Arc<dyn Embedder>, fallback: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            primary,
            fallback,
            primary_disabled: AtomicBool::new(false),
        }
    }

    /// Embed a batch of texts, tagging the result with the model used.
    ///
    /// Fails with `UpstreamUnavailable` only when every configured
    /// provider failed; the caller records the transcript as not indexed
    /// rather than silently dropping chunks.
    #[instrument(skip(self, texts), fields(count = texts.len()))]
    pub async fn embed_tagged(&self, texts: &[String]) -> Result<EmbeddingBatch> {
        if !self.primary_disabled.load(Ordering::Relaxed) {
            match self.primary.embed_batch(texts).await {
                Ok(vectors) => {
                    return Ok(EmbeddingBatch {
                        model_id: self.primary.model_id().to_string(),
                        dimension: self.primary.dimensions(),
                        vectors,
                    });
                }
                Err(e) => {
                    if is_not_supported(&e) {
                        warn!(
                            "Primary embedding API not supported ({}); disabling it for this process",
                            e
                        );
                        self.primary_disabled.store(true, Ordering::Relaxed);
                    } else {
                        warn!("Primary embedding API failed: {}", e);
                    }
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            let vectors = fallback.embed_batch(texts).await?;
            return Ok(EmbeddingBatch {
                model_id: fallback.model_id().to_string(),
                dimension: fallback.dimensions(),
                vectors,
            });
        }

        Err(SvarError::UpstreamUnavailable {
            service: "embedding",
            detail: "primary API failed and no fallback is configured".to_string(),
        })
    }

    /// Embed a query with a specific model, so the query vector matches
    /// the collection the bulk of a transcript's chunks live in.
    pub async fn embed_query_for_model(&self, model_id: &str, text: &str) -> Result<Vec<f32>> {
        if model_id == self.primary.model_id() {
            if self.primary_disabled.load(Ordering::Relaxed) {
                return Err(SvarError::UpstreamUnavailable {
                    service: "embedding",
                    detail: format!("model {} is disabled for this process", model_id),
                });
            }
            return self.primary.embed(text).await;
        }

        if let Some(fallback) = &self.fallback {
            if model_id == fallback.model_id() {
                return fallback.embed(text).await;
            }
        }

        Err(SvarError::Embedding(format!(
            "No embedder available for model {}",
            model_id
        )))
    }

    /// Current provider reachability.
    pub fn status(&self) -> EmbeddingProviderStatus {
        let primary_available = !self.primary_disabled.load(Ordering::Relaxed);
        let active_model = if primary_available {
            self.primary.model_id().to_string()
        } else if let Some(fallback) = &self.fallback {
            fallback.model_id().to_string()
        } else {
            self.primary.model_id().to_string()
        };

        EmbeddingProviderStatus {
            active_model,
            primary_available,
            fallback_available: self.fallback.is_some(),
        }
    }
}

/// The original API reports an unimplemented embeddings endpoint as 404;
/// treat that class of failure as permanent for the process.
fn is_not_supported(e: &SvarError) -> bool {
    let msg = e.to_string();
    msg.contains("404") || msg.to_lowercase().contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedEmbedder {
        model: &'static str,
        dimension: usize,
        fail_with: Option<&'static str>,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if let Some(msg) = self.fail_with {
                return Err(SvarError::OpenAI(msg.to_string()));
            }
            Ok(texts.iter().map(|_| vec![0.5; self.dimension]).collect())
        }

        fn dimensions(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            self.model
        }
    }

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {}", i)).collect()
    }

    #[tokio::test]
    async fn test_primary_used_when_healthy() {
        let provider = FailoverEmbeddings::new(
            Arc::new(FixedEmbedder {
                model: "primary",
                dimension: 8,
                fail_with: None,
            }),
            Some(Arc::new(FixedEmbedder {
                model: "fallback",
                dimension: 4,
                fail_with: None,
            })),
        );

        let batch = provider.embed_tagged(&texts(2)).await.unwrap();
        assert_eq!(batch.model_id, "primary");
        assert_eq!(batch.dimension, 8);
        assert_eq!(batch.vectors.len(), 2);
    }

    #[tokio::test]
    async fn test_falls_back_with_different_dimension() {
        let provider = FailoverEmbeddings::new(
            Arc::new(FixedEmbedder {
                model: "primary",
                dimension: 8,
                fail_with: Some("connection refused"),
            }),
            Some(Arc::new(FixedEmbedder {
                model: "fallback",
                dimension: 4,
                fail_with: None,
            })),
        );

        let batch = provider.embed_tagged(&texts(1)).await.unwrap();
        assert_eq!(batch.model_id, "fallback");
        assert_eq!(batch.dimension, 4);
        // Transient failure: the primary stays eligible.
        assert!(provider.status().primary_available);
    }

    #[tokio::test]
    async fn test_404_disables_primary_permanently() {
        let provider = FailoverEmbeddings::new(
            Arc::new(FixedEmbedder {
                model: "primary",
                dimension: 8,
                fail_with: Some("status 404: no such endpoint"),
            }),
            Some(Arc::new(FixedEmbedder {
                model: "fallback",
                dimension: 4,
                fail_with: None,
            })),
        );

        let batch = provider.embed_tagged(&texts(1)).await.unwrap();
        assert_eq!(batch.model_id, "fallback");

        let status = provider.status();
        assert!(!status.primary_available);
        assert_eq!(status.active_model, "fallback");
    }

    #[tokio::test]
    async fn test_both_failing_reports_unavailable() {
        let provider = FailoverEmbeddings::new(
            Arc::new(FixedEmbedder {
                model: "primary",
                dimension: 8,
                fail_with: Some("connection refused"),
            }),
            None,
        );

        let err = provider.embed_tagged(&texts(1)).await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn test_query_routing_by_model() {
        let provider = FailoverEmbeddings::new(
            Arc::new(FixedEmbedder {
                model: "primary",
                dimension: 8,
                fail_with: None,
            }),
            Some(Arc::new(FixedEmbedder {
                model: "fallback",
                dimension: 4,
                fail_with: None,
            })),
        );

        let v = provider
            .embed_query_for_model("fallback", "question")
            .await
            .unwrap();
        assert_eq!(v.len(), 4);

        let v = provider
            .embed_query_for_model("primary", "question")
            .await
            .unwrap();
        assert_eq!(v.len(), 8);

        assert!(provider
            .embed_query_for_model("unknown-model", "question")
            .await
            .is_err());
    }
}
