//! Pipeline coordination for Svar.
//!
//! Wires the chunker, embedding provider, lexical index, vector store,
//! retriever, composer, grader, and session store into one engine that
//! hosts (CLI, HTTP, tests) drive.

use crate::answer::{AnswerComposer, ComposeOptions, HistoryTurn};
use crate::chunking::{ChunkingConfig, TextChunker};
use crate::config::{Prompts, Settings};
use crate::embedding::{EmbeddingProviderStatus, FailoverEmbeddings, OpenAIEmbedder};
use crate::error::{Result, SvarError};
use crate::generation::{Generator, OpenAiGenerator};
use crate::grading::QualityGrader;
use crate::index::Bm25Index;
use crate::progress::{NoProgress, ProgressSink};
use crate::retrieval::{HybridRetriever, RetrievalOptions, RetrievedChunk};
use crate::session::{Feedback, FeedbackKind, Message, MessageStatus, Session, SqliteSessionStore};
use crate::transcript::{SqliteTranscriptStore, Transcript, TranscriptStore};
use crate::vector_store::{ChunkPoint, SqliteVectorStore, VectorStore};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Per-transcript indexing status.
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub indexed: bool,
    pub chunk_count: usize,
    pub last_indexed_at: Option<DateTime<Utc>>,
    /// Why the transcript is not indexed, if applicable.
    pub reason: Option<String>,
}

impl IndexRecord {
    fn not_indexed(reason: &str) -> Self {
        Self {
            indexed: false,
            chunk_count: 0,
            last_indexed_at: None,
            reason: Some(reason.to_string()),
        }
    }
}

/// Reachability snapshot of the engine's backends.
#[derive(Debug, Clone)]
pub struct SystemStatus {
    pub vector_store_available: bool,
    pub embedding: EmbeddingProviderStatus,
    pub indexed_transcripts: usize,
    pub total_chunks: usize,
    pub lexical_documents: usize,
}

/// Options recognized by [`QaEngine::ask`].
#[derive(Debug, Clone)]
pub struct AskOptions {
    pub top_k: usize,
    /// Generation model override; the configured default applies otherwise.
    pub model: Option<String>,
    /// Temperature override in [0, 2].
    pub temperature: Option<f32>,
    pub reranking: bool,
    pub query_expansion: bool,
    pub multi_hop: bool,
    pub hybrid_search: bool,
    pub advanced_grading: bool,
    /// Request-level transcript scope; overrides the session scope.
    pub transcript_ids: Vec<String>,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            model: None,
            temperature: None,
            reranking: true,
            query_expansion: true,
            multi_hop: false,
            hybrid_search: true,
            advanced_grading: false,
            transcript_ids: Vec::new(),
        }
    }
}

/// The question-answering engine.
pub struct QaEngine {
    settings: Settings,
    transcripts: Arc<dyn TranscriptStore>,
    vector_store: Option<Arc<dyn VectorStore>>,
    bm25: Arc<Bm25Index>,
    embeddings: Arc<FailoverEmbeddings>,
    retriever: HybridRetriever,
    composer: AnswerComposer,
    grader: QualityGrader,
    sessions: Arc<SqliteSessionStore>,
    /// Concrete transcript library, present when the engine owns one
    /// (CLI hosts register transcripts through it).
    library: Option<Arc<SqliteTranscriptStore>>,
    index_records: RwLock<HashMap<String, IndexRecord>>,
    /// Single-turn messages waiting for possible feedback.
    ephemeral: RwLock<HashMap<Uuid, Message>>,
}

impl QaEngine {
    /// Create an engine with the default component stack. A vector store
    /// that fails to open degrades the engine to lexical-only retrieval
    /// instead of failing startup.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let library = Arc::new(SqliteTranscriptStore::new(&settings.transcripts_path())?);
        let transcripts: Arc<dyn TranscriptStore> = library.clone();

        let vector_store: Option<Arc<dyn VectorStore>> =
            match SqliteVectorStore::new(&settings.vectors_path()) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!("Vector store unavailable, degrading to lexical-only retrieval: {}", e);
                    None
                }
            };

        let primary = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
        ));
        let fallback = Self::build_fallback(&settings);
        let embeddings = Arc::new(FailoverEmbeddings::new(primary, fallback));

        let generator: Arc<dyn Generator> = Arc::new(OpenAiGenerator::new());
        let sessions = Arc::new(SqliteSessionStore::new(&settings.sessions_path())?);

        let mut engine = Self::with_components(
            settings,
            prompts,
            transcripts,
            vector_store,
            embeddings,
            generator,
            sessions,
        )?;
        engine.library = Some(library);
        Ok(engine)
    }

    /// Create an engine with custom components, used by tests and hosts
    /// that bring their own stores.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        transcripts: Arc<dyn TranscriptStore>,
        vector_store: Option<Arc<dyn VectorStore>>,
        embeddings: Arc<FailoverEmbeddings>,
        generator: Arc<dyn Generator>,
        sessions: Arc<SqliteSessionStore>,
    ) -> Result<Self> {
        let bm25 = Arc::new(Bm25Index::new());

        let retriever = HybridRetriever::new(
            vector_store.clone(),
            bm25.clone(),
            embeddings.clone(),
            generator.clone(),
            prompts.clone(),
            settings.retrieval.clone(),
        );
        let composer = AnswerComposer::new(
            generator.clone(),
            prompts.clone(),
            settings.generation.clone(),
        );
        let grader = QualityGrader::new(generator, prompts, settings.grading.clone());

        Ok(Self {
            settings,
            transcripts,
            vector_store,
            bm25,
            embeddings,
            retriever,
            composer,
            grader,
            sessions,
            library: None,
            index_records: RwLock::new(HashMap::new()),
            ephemeral: RwLock::new(HashMap::new()),
        })
    }

    #[cfg(feature = "local-embeddings")]
    fn build_fallback(settings: &Settings) -> Option<Arc<dyn crate::embedding::Embedder>> {
        if !settings.embedding.local_fallback {
            return None;
        }
        match crate::embedding::LocalEmbedder::new() {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                warn!("Local embedding fallback unavailable: {}", e);
                None
            }
        }
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn build_fallback(_settings: &Settings) -> Option<Arc<dyn crate::embedding::Embedder>> {
        None
    }

    /// Rebuild the in-memory lexical index and index records from the
    /// vector store. Call once after construction.
    pub async fn bootstrap(&self) -> Result<()> {
        let store = match &self.vector_store {
            Some(store) => store,
            None => return Ok(()),
        };

        let chunks = store.all_chunks().await?;
        let mut by_transcript: HashMap<String, Vec<crate::chunking::Chunk>> = HashMap::new();
        for chunk in chunks {
            by_transcript
                .entry(chunk.transcript_id.clone())
                .or_default()
                .push(chunk);
        }

        for (transcript_id, chunks) in &by_transcript {
            self.bm25.replace_transcript(transcript_id, chunks);
        }

        let indexed = store.list_indexed().await?;
        let mut records = self.index_records.write().unwrap();
        for entry in indexed {
            records.insert(
                entry.transcript_id.clone(),
                IndexRecord {
                    indexed: entry.chunk_count > 0,
                    chunk_count: entry.chunk_count,
                    last_indexed_at: Some(entry.indexed_at),
                    reason: None,
                },
            );
        }

        info!(
            "Rebuilt lexical index with {} documents across {} transcripts",
            self.bm25.len(),
            by_transcript.len()
        );
        Ok(())
    }

    /// Access the engine settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Access the transcript store.
    pub fn transcripts(&self) -> Arc<dyn TranscriptStore> {
        self.transcripts.clone()
    }

    /// The concrete transcript library, when this engine owns one.
    pub fn library(&self) -> Option<Arc<SqliteTranscriptStore>> {
        self.library.clone()
    }

    // ---- Indexing ------------------------------------------------------

    /// Index (or reindex) a transcript by ID. Idempotent.
    pub async fn index_transcript(&self, transcript_id: &str) -> Result<IndexRecord> {
        self.index_transcript_with_progress(transcript_id, &NoProgress)
            .await
    }

    /// Index a transcript, reporting chunk progress to the sink.
    #[instrument(skip(self, progress))]
    pub async fn index_transcript_with_progress(
        &self,
        transcript_id: &str,
        progress: &dyn ProgressSink,
    ) -> Result<IndexRecord> {
        let transcript = self
            .transcripts
            .get(transcript_id)
            .await?
            .ok_or_else(|| SvarError::TranscriptNotFound(transcript_id.to_string()))?;
        self.index_text(&transcript, progress).await
    }

    /// Index transcript text. The record is stored even when indexing is
    /// skipped, so status queries can explain why.
    pub async fn index_text(
        &self,
        transcript: &Transcript,
        progress: &dyn ProgressSink,
    ) -> Result<IndexRecord> {
        let chunker = TextChunker::new(ChunkingConfig {
            target_size: self.settings.chunking.target_size,
            overlap: self.settings.chunking.overlap,
        });
        let chunks = chunker.chunk(&transcript.id, &transcript.text);

        if chunks.is_empty() {
            info!("Transcript {} has no indexable text", transcript.id);
            // Clear any previous generation so the empty state is real.
            if let Some(store) = &self.vector_store {
                let _ = store.delete_by_transcript(&transcript.id).await;
            }
            self.bm25.remove_transcript(&transcript.id);
            let record = IndexRecord::not_indexed("empty transcript");
            self.put_record(&transcript.id, record.clone());
            progress.on_progress(0, 0);
            return Ok(record);
        }

        let total = chunks.len();
        progress.on_progress(0, total);

        // The lexical index is in-memory and always gets the chunks, so
        // degraded (store-down) QA still has something to search.
        self.bm25.replace_transcript(&transcript.id, &chunks);

        let store = match &self.vector_store {
            Some(store) => store.clone(),
            None => {
                let record = IndexRecord::not_indexed("vector store unavailable");
                self.put_record(&transcript.id, record.clone());
                return Ok(record);
            }
        };

        // Embed in sub-batches so progress moves with the work.
        const EMBED_BATCH: usize = 32;
        let mut points: Vec<ChunkPoint> = Vec::with_capacity(total);
        let mut model_id: Option<String> = None;
        let mut processed = 0usize;

        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = match self.embeddings.embed_tagged(&texts).await {
                Ok(embedded) => embedded,
                Err(e) => {
                    let record =
                        IndexRecord::not_indexed(&format!("embedding failed: {}", e));
                    self.put_record(&transcript.id, record);
                    return Err(e);
                }
            };

            if let Some(current) = &model_id {
                if *current != embedded.model_id {
                    // Provider failed over mid-transcript; fail the run
                    // rather than mixing models within one generation.
                    return Err(SvarError::Embedding(format!(
                        "embedding model changed mid-index ({} -> {})",
                        current, embedded.model_id
                    )));
                }
            } else {
                store
                    .ensure_collection(&embedded.model_id, embedded.dimension)
                    .await?;
                model_id = Some(embedded.model_id.clone());
            }

            for (chunk, vector) in batch.iter().zip(embedded.vectors) {
                points.push(ChunkPoint::new(chunk.clone(), embedded.model_id.clone(), vector));
            }
            processed += batch.len();
            progress.on_progress(processed, total);
        }

        let model_id = model_id.expect("at least one batch was embedded");

        // New points overwrite the previous generation in place
        // (deterministic IDs), then the stale tail is removed. A reader
        // in between sees a complete generation either way.
        store.upsert_batch(&model_id, &points).await?;
        store.delete_stale(&transcript.id, total).await?;

        progress.on_progress(total, total);

        let record = IndexRecord {
            indexed: true,
            chunk_count: total,
            last_indexed_at: Some(Utc::now()),
            reason: None,
        };
        self.put_record(&transcript.id, record.clone());
        info!("Indexed {} chunks for transcript {}", total, transcript.id);
        Ok(record)
    }

    /// Index a batch of transcripts with bounded concurrency. One
    /// transcript failing never fails the batch; each ID gets its own
    /// result.
    pub async fn index_transcripts(
        &self,
        transcript_ids: &[String],
    ) -> Vec<(String, Result<IndexRecord>)> {
        let concurrency = self.settings.indexing.max_concurrent.max(1);
        stream::iter(transcript_ids.iter().cloned())
            .map(|id| async move {
                let result = self.index_transcript(&id).await;
                if let Err(e) = &result {
                    warn!("Indexing {} failed: {}", id, e);
                }
                (id, result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await
    }

    /// Delete a transcript's index entries (vector points, lexical
    /// postings, status record).
    pub async fn delete_transcript_index(&self, transcript_id: &str) -> Result<usize> {
        let mut deleted = 0;
        if let Some(store) = &self.vector_store {
            deleted = store.delete_by_transcript(transcript_id).await?;
        }
        self.bm25.remove_transcript(transcript_id);
        self.index_records.write().unwrap().remove(transcript_id);
        Ok(deleted)
    }

    /// Index status for a transcript.
    pub async fn index_status(&self, transcript_id: &str) -> IndexRecord {
        if let Some(record) = self.index_records.read().unwrap().get(transcript_id) {
            return record.clone();
        }

        match &self.vector_store {
            Some(store) => match store.chunk_count(transcript_id).await {
                Ok(0) => IndexRecord::not_indexed("not indexed"),
                Ok(count) => IndexRecord {
                    indexed: true,
                    chunk_count: count,
                    last_indexed_at: None,
                    reason: None,
                },
                Err(_) => IndexRecord::not_indexed("vector store unavailable"),
            },
            None => IndexRecord::not_indexed("vector store unavailable"),
        }
    }

    fn put_record(&self, transcript_id: &str, record: IndexRecord) {
        self.index_records
            .write()
            .unwrap()
            .insert(transcript_id.to_string(), record);
    }

    // ---- Asking --------------------------------------------------------

    /// Ask a question, optionally within a session.
    ///
    /// Generation failure produces a `Failed` message (persisted when a
    /// session is given) rather than a silent error; retrieval that finds
    /// nothing produces an explicit insufficient-information answer with
    /// zero groundedness.
    #[instrument(skip(self, options), fields(session = ?session_id))]
    pub async fn ask(
        &self,
        question: &str,
        options: AskOptions,
        session_id: Option<Uuid>,
    ) -> Result<Message> {
        if question.trim().is_empty() {
            return Err(SvarError::InvalidInput("question is empty".to_string()));
        }

        let session = match session_id {
            Some(id) => Some(
                self.sessions
                    .get_session(id)?
                    .ok_or_else(|| SvarError::SessionNotFound(id.to_string()))?,
            ),
            None => None,
        };

        // Request scope wins over session scope; empty means all.
        let scope: Vec<String> = if !options.transcript_ids.is_empty() {
            options.transcript_ids.clone()
        } else {
            session.as_ref().map(|s| s.transcript_ids.clone()).unwrap_or_default()
        };
        let transcript_filter = (!scope.is_empty()).then_some(scope.as_slice());

        // Best-effort: make sure scoped transcripts are indexed before
        // searching them.
        self.auto_index(&scope).await;

        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.settings.generation.model.clone());
        let temperature = options
            .temperature
            .unwrap_or(self.settings.generation.temperature);

        let retrieval_options = RetrievalOptions {
            top_k: options.top_k,
            hybrid_search: options.hybrid_search,
            query_expansion: options.query_expansion,
            multi_hop: options.multi_hop,
            reranking: options.reranking,
            model: model.clone(),
        };

        let mut message = Message::pending(session.as_ref().map(|s| s.id), question);

        let retrieved = self
            .retriever
            .retrieve(question, &retrieval_options, transcript_filter)
            .await?;

        let history = match &session {
            Some(s) => self.history_for(s.id)?,
            None => Vec::new(),
        };

        let compose_options = ComposeOptions {
            model: model.clone(),
            temperature,
            max_tokens: self.settings.generation.max_tokens,
        };

        match self
            .composer
            .compose(question, &retrieved, &history, &compose_options)
            .await
        {
            Ok(answer) => {
                let metrics = self
                    .grader
                    .grade(question, &answer, &retrieved, options.advanced_grading, &model)
                    .await;
                message.answer = answer;
                message.retrieved_chunks = retrieved;
                message.quality_score = Some(metrics.display_score());
                message.quality_metrics = Some(metrics);
                message.status = MessageStatus::Answered;
            }
            Err(e) => {
                warn!("Answer generation failed: {}", e);
                message.retrieved_chunks = retrieved;
                message.status = MessageStatus::Failed;
                message.error = Some(e.to_string());
            }
        }

        self.finalize_message(&message)?;
        Ok(message)
    }

    /// Persist a finalized message, or hold it for possible feedback.
    fn finalize_message(&self, message: &Message) -> Result<()> {
        if message.session_id.is_some() {
            self.sessions.append_message(message)?;
        } else {
            self.ephemeral
                .write()
                .unwrap()
                .insert(message.id, message.clone());
        }
        Ok(())
    }

    /// Prior answered turns of a session, oldest first.
    fn history_for(&self, session_id: Uuid) -> Result<Vec<HistoryTurn>> {
        Ok(self
            .sessions
            .list_messages(session_id)?
            .into_iter()
            .filter(|m| m.status == MessageStatus::Answered)
            .map(|m| HistoryTurn {
                question: m.question,
                answer: m.answer,
            })
            .collect())
    }

    /// Index any scoped transcript that is not indexed yet. Failures are
    /// logged, never fatal: the ask proceeds with whatever is searchable.
    async fn auto_index(&self, scope: &[String]) {
        for transcript_id in scope {
            let status = self.index_status(transcript_id).await;
            if status.indexed {
                continue;
            }
            match self.transcripts.get(transcript_id).await {
                Ok(Some(transcript)) => {
                    if let Err(e) = self.index_text(&transcript, &NoProgress).await {
                        warn!("Auto-indexing {} failed: {}", transcript_id, e);
                    }
                }
                Ok(None) => warn!("Scoped transcript {} does not exist", transcript_id),
                Err(e) => warn!("Could not load scoped transcript {}: {}", transcript_id, e),
            }
        }
    }

    // ---- Sessions and feedback ----------------------------------------

    /// Create a session. Non-empty scopes are validated against the
    /// transcript store.
    pub async fn create_session(
        &self,
        name: Option<String>,
        transcript_ids: Vec<String>,
    ) -> Result<Session> {
        for id in &transcript_ids {
            if !self.transcripts.exists(id).await? {
                return Err(SvarError::TranscriptNotFound(id.clone()));
            }
        }

        let session = Session::new(name, transcript_ids);
        self.sessions.create_session(&session)?;
        Ok(session)
    }

    pub fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        self.sessions.get_session(id)
    }

    pub fn list_sessions(&self) -> Result<Vec<Session>> {
        self.sessions.list_sessions()
    }

    /// Delete a session and everything in it.
    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        self.sessions.delete_session(id)
    }

    /// All messages of a session in chronological order.
    pub fn list_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        self.sessions.list_messages(session_id)
    }

    /// Submit feedback for a message. Feedback against an ephemeral
    /// single-turn message lazily materializes a session to anchor it.
    pub async fn submit_feedback(
        &self,
        message_id: Uuid,
        kind: FeedbackKind,
        comment: Option<String>,
    ) -> Result<()> {
        if self.sessions.get_message(message_id)?.is_none() {
            let ephemeral = self.ephemeral.write().unwrap().remove(&message_id);
            match ephemeral {
                Some(mut message) => {
                    let session = Session::new(Some("Ad-hoc feedback".to_string()), Vec::new());
                    self.sessions.create_session(&session)?;
                    message.session_id = Some(session.id);
                    self.sessions.append_message(&message)?;
                    info!(
                        "Materialized session {} to anchor feedback on message {}",
                        session.id, message_id
                    );
                }
                None => return Err(SvarError::MessageNotFound(message_id.to_string())),
            }
        }

        self.sessions
            .add_feedback(&Feedback::new(message_id, kind, comment))
    }

    // ---- Status --------------------------------------------------------

    /// Backend reachability and index size.
    pub async fn status(&self) -> SystemStatus {
        let (vector_store_available, indexed_transcripts, total_chunks) =
            match &self.vector_store {
                Some(store) => match store.ping().await {
                    Ok(()) => {
                        let indexed = store.list_indexed().await.map(|l| l.len()).unwrap_or(0);
                        let total = store.total_count().await.unwrap_or(0);
                        (true, indexed, total)
                    }
                    Err(_) => (false, 0, 0),
                },
                None => (false, 0, 0),
            };

        SystemStatus {
            vector_store_available,
            embedding: self.embeddings.status(),
            indexed_transcripts,
            total_chunks,
            lexical_documents: self.bm25.len(),
        }
    }

    /// Summaries of indexed transcripts, for listings.
    pub async fn list_indexed(&self) -> Result<Vec<crate::vector_store::IndexedTranscript>> {
        match &self.vector_store {
            Some(store) => store.list_indexed().await,
            None => Ok(Vec::new()),
        }
    }

    /// Retrieve chunks without composing an answer (search surface).
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        transcript_ids: Vec<String>,
    ) -> Result<Vec<RetrievedChunk>> {
        let options = RetrievalOptions {
            top_k,
            hybrid_search: true,
            query_expansion: false,
            multi_hop: false,
            reranking: false,
            model: self.settings.generation.model.clone(),
        };
        let filter = (!transcript_ids.is_empty()).then_some(transcript_ids.as_slice());
        self.retriever.retrieve(query, &options, filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedder;
    use crate::generation::GenerationRequest;
    use crate::progress::testing::RecordingSink;
    use crate::retrieval::RetrievalSource;
    use crate::transcript::MemoryTranscriptStore;
    use crate::vector_store::MemoryVectorStore;
    use async_trait::async_trait;

    /// Deterministic embedder: one dimension per keyword, so texts with
    /// disjoint vocabulary come out orthogonal.
    struct KeywordEmbedder;

    const KEYWORDS: [&str; 6] = ["deadline", "march", "budget", "deploy", "pipeline", "agreed"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    KEYWORDS
                        .iter()
                        .map(|k| if lower.contains(k) { 1.0 } else { 0.0 })
                        .collect()
                })
                .collect())
        }

        fn dimensions(&self) -> usize {
            KEYWORDS.len()
        }

        fn model_id(&self) -> &str {
            "test-embed"
        }
    }

    /// Generator that answers every request with a fixed string.
    struct FixedGenerator(String);

    #[async_trait]
    impl Generator for FixedGenerator {
        async fn complete(&self, _request: GenerationRequest) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    /// Generator that always fails as unreachable.
    struct DownGenerator;

    #[async_trait]
    impl Generator for DownGenerator {
        async fn complete(&self, _request: GenerationRequest) -> Result<String> {
            Err(SvarError::UpstreamUnavailable {
                service: "generation",
                detail: "connection refused".to_string(),
            })
        }
    }

    struct Harness {
        engine: QaEngine,
        transcripts: Arc<MemoryTranscriptStore>,
        vector_store: Arc<MemoryVectorStore>,
    }

    fn harness_with(generator: Arc<dyn Generator>) -> Harness {
        let transcripts = Arc::new(MemoryTranscriptStore::new());
        let vector_store = Arc::new(MemoryVectorStore::new());
        let embeddings = Arc::new(FailoverEmbeddings::new(Arc::new(KeywordEmbedder), None));
        let sessions = Arc::new(SqliteSessionStore::in_memory().unwrap());

        let engine = QaEngine::with_components(
            Settings::default(),
            Prompts::default(),
            transcripts.clone(),
            Some(vector_store.clone()),
            embeddings,
            generator,
            sessions,
        )
        .unwrap();

        Harness {
            engine,
            transcripts,
            vector_store,
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(FixedGenerator(
            "The deadline is March 5 [1].".to_string(),
        )))
    }

    /// Plain options: no LLM-dependent retrieval stages, so the fixed
    /// generator is only asked for the final answer.
    fn plain_options() -> AskOptions {
        AskOptions {
            reranking: false,
            query_expansion: false,
            ..AskOptions::default()
        }
    }

    #[tokio::test]
    async fn test_scenario_a_grounded_answer_with_citation() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        let record = h.engine.index_transcript("t1").await.unwrap();
        assert!(record.indexed);
        assert_eq!(record.chunk_count, 1);

        let message = h
            .engine
            .ask("When is the deadline?", plain_options(), None)
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Answered);
        assert!(message.answer.contains("March 5"));
        assert_eq!(message.retrieved_chunks.len(), 1);
        assert_eq!(message.retrieved_chunks[0].source, RetrievalSource::Hybrid);
        let metrics = message.quality_metrics.unwrap();
        assert!(metrics.groundedness >= 0.8, "{:?}", metrics);
    }

    #[tokio::test]
    async fn test_scenario_b_out_of_scope_question_is_insufficient() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.transcripts.insert(Transcript::new(
            "t2",
            "The deploy pipeline broke during the budget review.",
        ));
        h.engine.index_transcript("t1").await.unwrap();
        h.engine.index_transcript("t2").await.unwrap();

        let session = h
            .engine
            .create_session(Some("scoped".to_string()), vec!["t1".to_string()])
            .await
            .unwrap();

        // The answer only exists in t2, which is outside the scope.
        let message = h
            .engine
            .ask(
                "Why did the deploy pipeline break?",
                plain_options(),
                Some(session.id),
            )
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Answered);
        assert!(message.retrieved_chunks.is_empty());
        assert_eq!(message.answer, Prompts::default().qa.insufficient);
        assert_eq!(message.quality_metrics.unwrap().groundedness, 0.0);
        assert_eq!(message.quality_score, Some(0.0));
    }

    #[tokio::test]
    async fn test_scenario_c_vector_store_down_degrades_to_bm25() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        h.vector_store.set_unavailable(true);

        let message = h
            .engine
            .ask("When is the deadline?", plain_options(), None)
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Answered);
        assert!(!message.retrieved_chunks.is_empty());
        assert!(message
            .retrieved_chunks
            .iter()
            .all(|r| r.source == RetrievalSource::Bm25));

        let status = h.engine.status().await;
        assert!(!status.vector_store_available);
    }

    #[tokio::test]
    async fn test_scenario_d_top_k_exceeds_available_chunks() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        let mut options = plain_options();
        options.top_k = 3;
        let message = h
            .engine
            .ask("When is the deadline?", options, None)
            .await
            .unwrap();

        assert_eq!(message.retrieved_chunks.len(), 1);
        assert_eq!(message.status, MessageStatus::Answered);
    }

    #[tokio::test]
    async fn test_indexing_is_idempotent() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed. ".repeat(40),
        ));

        let first = h.engine.index_transcript("t1").await.unwrap();
        let second = h.engine.index_transcript("t1").await.unwrap();

        assert_eq!(first.chunk_count, second.chunk_count);
        assert_eq!(
            h.vector_store.chunk_count("t1").await.unwrap(),
            first.chunk_count
        );
        assert_eq!(
            h.vector_store.total_count().await.unwrap(),
            first.chunk_count
        );
    }

    #[tokio::test]
    async fn test_empty_transcript_is_a_no_op_with_reason() {
        let h = harness();
        h.transcripts.insert(Transcript::new("t1", "   \n  "));

        let record = h.engine.index_transcript("t1").await.unwrap();
        assert!(!record.indexed);
        assert_eq!(record.chunk_count, 0);
        assert_eq!(record.reason.as_deref(), Some("empty transcript"));

        let status = h.engine.index_status("t1").await;
        assert!(!status.indexed);
    }

    #[tokio::test]
    async fn test_batch_indexing_survives_one_bad_transcript() {
        let h = harness();
        h.transcripts.insert(Transcript::new("good", "Budget approved."));

        let results = h
            .engine
            .index_transcripts(&["good".to_string(), "missing".to_string()])
            .await;

        let by_id: HashMap<&str, &Result<IndexRecord>> =
            results.iter().map(|(id, r)| (id.as_str(), r)).collect();
        assert!(by_id["good"].is_ok());
        assert!(matches!(
            by_id["missing"],
            Err(SvarError::TranscriptNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_session_is_append_only() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        let session = h.engine.create_session(None, Vec::new()).await.unwrap();

        let n = 3;
        let mut ids = Vec::new();
        for _ in 0..n {
            let message = h
                .engine
                .ask("When is the deadline?", plain_options(), Some(session.id))
                .await
                .unwrap();
            ids.push(message.id);
        }

        let messages = h.engine.list_messages(session.id).unwrap();
        assert_eq!(messages.len(), n);
        for (i, message) in messages.iter().enumerate() {
            assert_eq!(message.id, ids[i]);
            assert_eq!(message.status, MessageStatus::Answered);
        }
    }

    #[tokio::test]
    async fn test_generation_failure_yields_failed_message() {
        let h = harness_with(Arc::new(DownGenerator));
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        let session = h.engine.create_session(None, Vec::new()).await.unwrap();
        let message = h
            .engine
            .ask("When is the deadline?", plain_options(), Some(session.id))
            .await
            .unwrap();

        assert_eq!(message.status, MessageStatus::Failed);
        assert!(message.error.as_deref().unwrap().contains("generation"));

        // The failed turn is part of the audit trail.
        let messages = h.engine.list_messages(session.id).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, MessageStatus::Failed);
    }

    #[tokio::test]
    async fn test_feedback_on_ephemeral_message_materializes_session() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        let message = h
            .engine
            .ask("When is the deadline?", plain_options(), None)
            .await
            .unwrap();
        assert!(message.session_id.is_none());
        assert!(h.engine.list_sessions().unwrap().is_empty());

        h.engine
            .submit_feedback(message.id, FeedbackKind::Negative, Some("wrong".to_string()))
            .await
            .unwrap();

        let sessions = h.engine.list_sessions().unwrap();
        assert_eq!(sessions.len(), 1);
        let anchored = h.engine.list_messages(sessions[0].id).unwrap();
        assert_eq!(anchored.len(), 1);
        assert_eq!(anchored[0].id, message.id);
    }

    #[tokio::test]
    async fn test_feedback_on_unknown_message_errors() {
        let h = harness();
        let err = h
            .engine
            .submit_feedback(Uuid::new_v4(), FeedbackKind::Positive, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SvarError::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn test_session_scope_must_reference_existing_transcripts() {
        let h = harness();
        let err = h
            .engine
            .create_session(None, vec!["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SvarError::TranscriptNotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_transcript_index_clears_both_indexes() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        let deleted = h.engine.delete_transcript_index("t1").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(h.vector_store.total_count().await.unwrap(), 0);

        let message = h
            .engine
            .ask("When is the deadline?", plain_options(), None)
            .await
            .unwrap();
        assert!(message.retrieved_chunks.is_empty());
        assert_eq!(message.answer, Prompts::default().qa.insufficient);
    }

    #[tokio::test]
    async fn test_progress_reaches_total() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed. ".repeat(60),
        ));

        let sink = RecordingSink::new();
        let record = h
            .engine
            .index_transcript_with_progress("t1", &sink)
            .await
            .unwrap();

        let updates = sink.updates.lock().unwrap();
        assert!(updates.len() >= 2);
        assert_eq!(updates[0], (0, record.chunk_count));
        assert_eq!(*updates.last().unwrap(), (record.chunk_count, record.chunk_count));
        // Progress only moves forward.
        for pair in updates.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
        }
    }

    #[tokio::test]
    async fn test_bootstrap_rebuilds_lexical_index() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        h.engine.index_transcript("t1").await.unwrap();

        // A second engine over the same stores starts with an empty
        // lexical index until bootstrapped.
        let embeddings = Arc::new(FailoverEmbeddings::new(Arc::new(KeywordEmbedder), None));
        let rebuilt = QaEngine::with_components(
            Settings::default(),
            Prompts::default(),
            h.transcripts.clone(),
            Some(h.vector_store.clone()),
            embeddings,
            Arc::new(FixedGenerator("ok".to_string())),
            Arc::new(SqliteSessionStore::in_memory().unwrap()),
        )
        .unwrap();

        assert_eq!(rebuilt.status().await.lexical_documents, 0);
        rebuilt.bootstrap().await.unwrap();
        assert_eq!(rebuilt.status().await.lexical_documents, 1);
    }

    #[tokio::test]
    async fn test_auto_index_on_scoped_ask() {
        let h = harness();
        h.transcripts.insert(Transcript::new(
            "t1",
            "Alice proposed deadline March 5. Bob agreed.",
        ));
        // No explicit index call: the scoped ask indexes on demand.
        let mut options = plain_options();
        options.transcript_ids = vec!["t1".to_string()];

        let message = h
            .engine
            .ask("When is the deadline?", options, None)
            .await
            .unwrap();
        assert!(!message.retrieved_chunks.is_empty());
        assert!(h.engine.index_status("t1").await.indexed);
    }
}
