//! Request-level error taxonomy.
//!
//! Startup failures (config, catalog, index, model loading) use `anyhow`
//! and abort the process. Everything that can go wrong while serving one
//! request is an [`AnalyzeError`], so the HTTP layer can map variants to
//! status codes. A suggested code outside the candidate list is *not* an
//! error — that case is flagged on the result itself (see
//! [`crate::extract`]).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzeError {
    /// The note was empty or whitespace-only. Rejected before any
    /// retrieval or provider work.
    #[error("Ingen tekst funnet")]
    EmptyNote,

    /// Neither provider credential set is configured. Raised on first
    /// use of the completion client, not at startup.
    #[error("no completion provider configured — set MISTRAL_API_KEY or OPENAI_API_KEY/OPENAI_BASE/OPENAI_MODEL")]
    NoProvider,

    /// Embedding or index search failed. Fatal to the request, not retried.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The completion call exceeded the configured time bound.
    #[error("completion request timed out")]
    Timeout,

    /// The provider was unreachable or returned an error status.
    #[error("completion request failed: {0}")]
    Network(String),

    /// The provider answered 2xx but the body had no message content.
    #[error("completion provider returned an unexpected response shape")]
    UnexpectedResponse,

    /// The model output contains no `{...}` span at all.
    #[error("model output contains no JSON object")]
    NoJsonSpan,

    /// A span was found but is not valid JSON.
    #[error("model output is not valid JSON: {0}")]
    InvalidJson(String),
}
