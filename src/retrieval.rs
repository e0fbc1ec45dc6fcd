//! Candidate retrieval and grounding formatting.
//!
//! [`retrieve`] embeds a note with the query prefix and runs an exact
//! inner-product search over the catalog index. For a fixed catalog and
//! model the result is fully deterministic: descending similarity,
//! ties broken by catalog index order. [`format_grounding`] renders the
//! retrieved entries into the compact block injected into the prompt.

use crate::catalog::index::FlatIndex;
use crate::catalog::{Catalog, CandidateEntry};
use crate::embedding::EmbeddingProvider;
use crate::error::AnalyzeError;

/// Retrieve the `topn` catalog entries most similar to `note_text`.
///
/// `topn` is clamped to the catalog size; zero is an error. Embedding or
/// index failures are fatal to the request and come back as
/// [`AnalyzeError::Retrieval`].
pub fn retrieve(
    embedding: &dyn EmbeddingProvider,
    index: &FlatIndex,
    catalog: &Catalog,
    note_text: &str,
    topn: usize,
) -> Result<Vec<CandidateEntry>, AnalyzeError> {
    let note = note_text.trim();
    if note.is_empty() {
        return Err(AnalyzeError::EmptyNote);
    }
    if topn == 0 {
        return Err(AnalyzeError::Retrieval("top-N must be at least 1".into()));
    }

    let qvec = embedding
        .embed_query(note)
        .map_err(|e| AnalyzeError::Retrieval(format!("embedding failed: {e}")))?;

    let topn = topn.min(catalog.len());
    let hits = index
        .search(&qvec, topn)
        .map_err(|e| AnalyzeError::Retrieval(format!("index search failed: {e}")))?;

    hits.into_iter()
        .map(|(i, _score)| {
            catalog.get(i).cloned().ok_or_else(|| {
                AnalyzeError::Retrieval(format!("index row {i} has no catalog entry"))
            })
        })
        .collect()
}

/// Render retrieved entries into the grounding block, one line per entry,
/// preserving input order. No escaping: catalog normalization guarantees
/// entries do not contain the delimiter tokens.
pub fn format_grounding(entries: &[CandidateEntry]) -> String {
    entries
        .iter()
        .map(|e| {
            format!(
                "{} | {} | component:{} | chapter:{}",
                e.code,
                e.title,
                e.component_label(),
                e.chapter
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ComponentHint;

    fn entry(code: &str, title: &str, guess: Option<u8>) -> CandidateEntry {
        CandidateEntry {
            code: code.to_string(),
            title: title.to_string(),
            component_hint: if guess.is_some() {
                ComponentHint::Symptom
            } else {
                ComponentHint::Unknown
            },
            component_guess: guess,
            chapter: code.chars().next().unwrap(),
        }
    }

    #[test]
    fn grounding_one_line_per_entry() {
        let entries = vec![entry("R05", "Hoste", Some(1)), entry("R21", "Symptomer hals", Some(1))];
        let grounding = format_grounding(&entries);
        assert_eq!(
            grounding,
            "R05 | Hoste | component:1 | chapter:R\nR21 | Symptomer hals | component:1 | chapter:R"
        );
    }

    #[test]
    fn grounding_falls_back_to_hint_without_guess() {
        let entries = vec![entry("Z99", "Uplassert", None)];
        assert_eq!(
            format_grounding(&entries),
            "Z99 | Uplassert | component:unknown | chapter:Z"
        );
    }

    #[test]
    fn grounding_preserves_input_order() {
        let entries = vec![
            entry("R74", "Akutt bronkitt", Some(7)),
            entry("R05", "Hoste", Some(1)),
        ];
        let grounding = format_grounding(&entries);
        let lines: Vec<&str> = grounding.lines().collect();
        assert!(lines[0].starts_with("R74"));
        assert!(lines[1].starts_with("R05"));
    }

    #[test]
    fn grounding_of_empty_set_is_empty() {
        assert_eq!(format_grounding(&[]), "");
    }
}
