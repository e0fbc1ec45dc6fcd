//! Structured result extraction and candidate-conformance validation.
//!
//! Models wrap their JSON in prose and code fences often enough that
//! extraction is a two-stage operation with independently observable
//! failures: first locate the `{...}` span (first `{` through last `}`),
//! then parse it. After parsing, the conformance guard enforces the one
//! hard safety rule of the pipeline: a suggested code outside the
//! request's candidate list is never silently accepted — and never
//! dropped either. It stays in the result flagged `needs_review` with a
//! marker appended to `notes`, so callers see exactly what the model did.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::CandidateEntry;
use crate::error::AnalyzeError;

/// Marker appended to `notes` for every suggestion whose code was not in
/// the candidate list. Fixed text, detectable downstream.
pub const CONFORMANCE_NOTE: &str = "Kode ikke i kandidatliste fra RAG.";

/// Upper bound on suggestions per result.
pub const MAX_SUGGESTIONS: usize = 3;

/// Verbatim quote from the note backing a suggestion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSpan {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub section: String,
}

/// One suggested code. Fields default when the model omits them; shape
/// tolerance here is deliberate, the conformance guard is not.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub component: u8,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub evidence_spans: Vec<EvidenceSpan>,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default)]
    pub needs_review: bool,
}

/// The parsed and validated model output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredResult {
    #[serde(default)]
    pub top_k: Vec<Suggestion>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Locate the JSON object span in raw model output: first `{` through the
/// last `}`. Greedy on purpose — it tolerates prose and code fences around
/// the object, and nested braces inside it.
pub fn find_json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Parse a located span. A span that is not valid JSON is a distinct
/// failure from there being no span at all.
pub fn parse_result(span: &str) -> Result<StructuredResult, AnalyzeError> {
    serde_json::from_str(span).map_err(|e| AnalyzeError::InvalidJson(e.to_string()))
}

/// Flag every suggestion whose code is not in the candidate list.
/// Non-discarding: suggestions stay in place, `needs_review` flips to true
/// and the marker is appended to `notes` (existing text preserved).
pub fn enforce_candidates(result: &mut StructuredResult, entries: &[CandidateEntry]) {
    let allowed: HashSet<&str> = entries.iter().map(|e| e.code.as_str()).collect();

    for suggestion in &mut result.top_k {
        if allowed.contains(suggestion.code.as_str()) {
            continue;
        }
        tracing::warn!(code = %suggestion.code, "suggested code outside candidate list");
        suggestion.needs_review = true;
        result.notes = Some(match result.notes.take() {
            Some(notes) if !notes.is_empty() => format!("{notes} | {CONFORMANCE_NOTE}"),
            _ => CONFORMANCE_NOTE.to_string(),
        });
    }
}

/// Full extraction: locate span, parse, bound `top_k`, enforce candidates.
pub fn extract(
    raw: &str,
    entries: &[CandidateEntry],
) -> Result<StructuredResult, AnalyzeError> {
    let span = find_json_span(raw).ok_or(AnalyzeError::NoJsonSpan)?;
    let mut result = parse_result(span)?;
    result.top_k.truncate(MAX_SUGGESTIONS);
    enforce_candidates(&mut result, entries);
    Ok(result)
}
