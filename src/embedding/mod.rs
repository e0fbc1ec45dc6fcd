//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and a local implementation using
//! multilingual-e5-base (768 dimensions, L2-normalized). The model is
//! asymmetric: queries and catalog documents are embedded with different
//! text prefixes, so callers go through [`EmbeddingProvider::embed_query`]
//! and [`EmbeddingProvider::embed_passage`] rather than raw [`embed`].
//!
//! [`embed`]: EmbeddingProvider::embed

pub mod local;

use anyhow::Result;

/// Number of dimensions in the embedding vectors (multilingual-e5-base).
pub const EMBEDDING_DIM: usize = 768;

/// Prefix E5 expects on query texts.
pub const QUERY_PREFIX: &str = "query: ";

/// Prefix E5 expects on document (passage) texts.
pub const PASSAGE_PREFIX: &str = "passage: ";

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`EMBEDDING_DIM`]
/// dimensions and must be deterministic: the same input text yields the
/// identical vector. All methods are synchronous — callers in async contexts
/// should use `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector, as-is.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Embed a search query with the query prefix.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&format!("{QUERY_PREFIX}{text}"))
    }

    /// Embed a catalog document with the passage prefix.
    fn embed_passage(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&format!("{PASSAGE_PREFIX}{text}"))
    }

    /// Embed a batch of catalog documents with the passage prefix.
    fn embed_passage_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{PASSAGE_PREFIX}{t}"))
            .collect();
        let refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();
        self.embed_batch(&refs)
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize {
        EMBEDDING_DIM
    }
}

/// Create an embedding provider from config.
///
/// Currently only `"local"` is supported (ONNX Runtime + multilingual-e5-base).
/// Returns an error if model files are not found — run
/// `icpc-coder model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}
