//! The analysis pipeline: retrieval → grounding → prompt → completion →
//! extraction/validation.
//!
//! [`Analyzer`] is the process-wide read-only context: catalog, index and
//! embedding model are loaded once at startup with explicit failure
//! propagation, then shared across concurrent requests behind `Arc`.
//! Each request owns its own candidate list, prompt and streaming state —
//! there is no cross-request mutable state and no locking beyond the ONNX
//! session mutex inside the embedding provider.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use futures::Stream;
use tokio::sync::mpsc;

use crate::catalog::index::FlatIndex;
use crate::catalog::{Catalog, CandidateEntry};
use crate::config::AppConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::AnalyzeError;
use crate::extract::{self, StructuredResult};
use crate::llm::CompletionClient;
use crate::prompt;
use crate::retrieval;

/// One event on the streaming analysis path.
#[derive(Debug)]
pub enum AnalysisEvent {
    /// An incremental completion fragment, in provider order.
    Chunk(String),
    /// The validated result, emitted once after the terminal frame.
    Final(StructuredResult),
}

/// Ordered event stream for one streaming request. Chunks arrive first,
/// then exactly one `Final` (or an error, which ends the stream).
pub struct AnalysisStream {
    rx: mpsc::Receiver<Result<AnalysisEvent, AnalyzeError>>,
}

impl AnalysisStream {
    /// Receive the next event, or `None` when the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<AnalysisEvent, AnalyzeError>> {
        self.rx.recv().await
    }
}

impl Stream for AnalysisStream {
    type Item = Result<AnalysisEvent, AnalyzeError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Load-once, read-only request context.
pub struct Analyzer {
    catalog: Arc<Catalog>,
    index: Arc<FlatIndex>,
    embedding: Arc<dyn EmbeddingProvider>,
    client: CompletionClient,
    top_n: usize,
    temperature: f64,
    max_tokens: u32,
}

impl Analyzer {
    /// Load catalog, index and embedding model per config and build the
    /// completion client. Any load failure aborts startup.
    pub fn new(config: &AppConfig) -> Result<Self> {
        let catalog = Catalog::load(config.resolved_meta_path())
            .context("failed to load candidate catalog")?;
        let index = FlatIndex::load(config.resolved_index_path())
            .context("failed to load vector index")?;

        let provider = embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?;
        let embedding: Arc<dyn EmbeddingProvider> = Arc::from(provider);

        let client =
            CompletionClient::new(&config.llm).context("failed to build completion client")?;

        Self::from_parts(catalog, index, embedding, client, config)
    }

    /// Assemble an analyzer from already-loaded parts, checking that the
    /// catalog and index agree. Used by [`Analyzer::new`] and by tests.
    pub fn from_parts(
        catalog: Catalog,
        index: FlatIndex,
        embedding: Arc<dyn EmbeddingProvider>,
        client: CompletionClient,
        config: &AppConfig,
    ) -> Result<Self> {
        anyhow::ensure!(
            index.len() == catalog.len(),
            "index has {} rows but catalog has {} entries — rebuild with `icpc-coder index build`",
            index.len(),
            catalog.len()
        );
        anyhow::ensure!(
            index.dim() == embedding.dimensions(),
            "index dimension {} does not match embedding model dimension {} — rebuild with `icpc-coder index build`",
            index.dim(),
            embedding.dimensions()
        );

        Ok(Self {
            catalog: Arc::new(catalog),
            index: Arc::new(index),
            embedding,
            client,
            top_n: config.retrieval.top_n,
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
        })
    }

    /// Retrieve the grounding candidates for a note (CPU-heavy embedding →
    /// spawn_blocking).
    async fn retrieve(&self, note_text: &str) -> Result<Vec<CandidateEntry>, AnalyzeError> {
        let embedding = Arc::clone(&self.embedding);
        let index = Arc::clone(&self.index);
        let catalog = Arc::clone(&self.catalog);
        let note = note_text.to_string();
        let top_n = self.top_n;

        tokio::task::spawn_blocking(move || {
            retrieval::retrieve(embedding.as_ref(), &index, &catalog, &note, top_n)
        })
        .await
        .map_err(|e| AnalyzeError::Retrieval(format!("retrieval task failed: {e}")))?
    }

    /// Buffered analysis: the full pipeline, returning the validated result.
    pub async fn analyze(&self, note_text: &str) -> Result<StructuredResult, AnalyzeError> {
        let entries = self.retrieve(note_text).await?;
        tracing::debug!(candidates = entries.len(), "candidates retrieved");

        let grounding = retrieval::format_grounding(&entries);
        let messages = prompt::build_messages(note_text, &grounding);

        let raw = self
            .client
            .complete(&messages, self.temperature, self.max_tokens)
            .await?;

        extract::extract(&raw, &entries)
    }

    /// Streaming analysis: completion fragments are forwarded in arrival
    /// order as [`AnalysisEvent::Chunk`]; after the provider's terminal
    /// frame the accumulated text is extracted and validated against the
    /// same candidate list and emitted as [`AnalysisEvent::Final`].
    /// Dropping the stream cancels the request and closes the session;
    /// no partial result is emitted after that.
    pub async fn analyze_streaming(
        &self,
        note_text: &str,
    ) -> Result<AnalysisStream, AnalyzeError> {
        let entries = self.retrieve(note_text).await?;
        tracing::debug!(candidates = entries.len(), "candidates retrieved");

        let grounding = retrieval::format_grounding(&entries);
        let messages = prompt::build_messages(note_text, &grounding);

        let mut completion = self
            .client
            .complete_streaming(&messages, self.temperature, self.max_tokens)
            .await?;

        let (tx, rx) = mpsc::channel::<Result<AnalysisEvent, AnalyzeError>>(32);

        tokio::spawn(async move {
            let mut full_text = String::new();

            while let Some(fragment) = completion.recv().await {
                match fragment {
                    Ok(chunk) => {
                        full_text.push_str(&chunk);
                        if tx.send(Ok(AnalysisEvent::Chunk(chunk))).await.is_err() {
                            // Caller abandoned the request; dropping the
                            // completion stream closes the session.
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }

            let result = extract::extract(&full_text, &entries).map(AnalysisEvent::Final);
            let _ = tx.send(result).await;
        });

        Ok(AnalysisStream { rx })
    }
}
