//! ICPC-2 coding assistant for general-practice consultation notes.
//!
//! Given a free-text clinical note, the pipeline proposes up to three
//! ICPC-2 codes by grounding an LLM in the catalog entries nearest to the
//! note:
//!
//! 1. **Retrieve** — embed the note (multilingual-e5-base via ONNX
//!    Runtime) and run an exact inner-product search over the pre-embedded
//!    catalog for the top-N candidates.
//! 2. **Ground** — render the candidates into a compact block injected
//!    into the prompt; the model may only choose codes from that block.
//! 3. **Complete** — call the configured provider (Mistral or any
//!    OpenAI-compatible endpoint), buffered or streamed.
//! 4. **Validate** — extract the JSON result and flag any suggestion whose
//!    code escaped the candidate list (`needs_review` + note marker);
//!    suggestions are flagged, never dropped.
//!
//! The catalog, vector index and embedding model are built offline
//! (`icpc-coder index build`) and loaded once at startup; serving state is
//! read-only and shared across concurrent requests.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`catalog`] — Candidate entries, validation, and the flat vector index
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime
//! - [`retrieval`] — Candidate retrieval and grounding formatting
//! - [`prompt`] — Prompt assembly
//! - [`llm`] — Completion client (buffered and streaming)
//! - [`extract`] — Result extraction and candidate-conformance validation
//! - [`analyze`] — The per-request pipeline and load-once context
//! - [`server`] — HTTP front end

pub mod analyze;
pub mod catalog;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod llm;
pub mod prompt;
pub mod retrieval;
pub mod server;
