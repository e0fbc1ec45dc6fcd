//! The ICPC-2 candidate catalog.
//!
//! Defines [`CandidateEntry`] (one classification code with its display
//! title and component classification), [`Catalog`] (the validated,
//! read-only entry collection loaded at startup), and [`ComponentMap`]
//! (the configurable mapping from a code's numeric suffix to its ICPC-2
//! component). The catalog is built offline by `icpc-coder index build`
//! and never mutated at serving time.

pub mod index;

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Coarse component classification of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentHint {
    /// Symptoms and complaints (component 1, code suffix 01–29).
    Symptom,
    /// Process codes (components 2–6, code suffix 30–69).
    Process,
    /// Disease diagnoses (component 7, code suffix 70–99).
    Diagnosis,
    /// Suffix not numeric or outside all configured bands.
    Unknown,
}

impl ComponentHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Symptom => "symptom",
            Self::Process => "process",
            Self::Diagnosis => "diagnosis",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ComponentHint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComponentHint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "symptom" => Ok(Self::Symptom),
            "process" => Ok(Self::Process),
            "diagnosis" => Ok(Self::Diagnosis),
            "unknown" => Ok(Self::Unknown),
            _ => Err(format!("unknown component hint: {s}")),
        }
    }
}

/// One ICPC-2 catalog entry, matching the metadata JSON schema
/// `{code, title, component_hint, component_guess, chapter}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    /// Catalog code, unique across the catalog (e.g. `"R05"`).
    pub code: String,
    /// Display title in the catalog's language.
    pub title: String,
    /// Coarse component classification derived from the code suffix.
    pub component_hint: ComponentHint,
    /// Component number 1–7 when the suffix resolves one, else `None`.
    pub component_guess: Option<u8>,
    /// Chapter letter, the first character of the code.
    pub chapter: char,
}

impl CandidateEntry {
    /// Component label used in grounding and document text: the numeric
    /// guess when resolved, otherwise the hint word.
    pub fn component_label(&self) -> String {
        match self.component_guess {
            Some(n) => n.to_string(),
            None => self.component_hint.to_string(),
        }
    }

    /// Text embedded as the entry's document representation. Kept compact,
    /// same shape as the grounding line.
    pub fn doc_text(&self) -> String {
        format!(
            "{} | {} | component:{} | chapter:{}",
            self.code,
            self.title,
            self.component_label(),
            self.chapter
        )
    }
}

/// One band of the suffix → component mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentBand {
    /// Inclusive lower bound of the numeric code suffix.
    pub lo: u8,
    /// Inclusive upper bound of the numeric code suffix.
    pub hi: u8,
    pub hint: ComponentHint,
    /// Resolved component number, absent when the band cannot decide one.
    pub component: Option<u8>,
}

/// The standard ICPC-2 band table. National adaptations can override this
/// via `[catalog].component_bands`; the 60–69 decade in particular varies
/// between component 5 and 6 by locale.
pub fn default_component_bands() -> Vec<ComponentBand> {
    vec![
        ComponentBand { lo: 1, hi: 29, hint: ComponentHint::Symptom, component: Some(1) },
        ComponentBand { lo: 30, hi: 39, hint: ComponentHint::Process, component: Some(2) },
        ComponentBand { lo: 40, hi: 49, hint: ComponentHint::Process, component: Some(4) },
        ComponentBand { lo: 50, hi: 59, hint: ComponentHint::Process, component: Some(3) },
        ComponentBand { lo: 60, hi: 69, hint: ComponentHint::Process, component: Some(5) },
        ComponentBand { lo: 70, hi: 99, hint: ComponentHint::Diagnosis, component: Some(7) },
    ]
}

/// Mapping from a code's numeric suffix to component hint and guess.
#[derive(Debug, Clone)]
pub struct ComponentMap {
    bands: Vec<ComponentBand>,
}

impl ComponentMap {
    pub fn new(bands: Vec<ComponentBand>) -> Self {
        Self { bands }
    }

    /// Classify a full code (chapter letter + numeric suffix). Codes with a
    /// non-numeric suffix or a suffix outside every band come back unknown.
    pub fn classify(&self, code: &str) -> (ComponentHint, Option<u8>) {
        let suffix = code.get(1..).unwrap_or("");
        let Ok(n) = suffix.parse::<u8>() else {
            return (ComponentHint::Unknown, None);
        };
        for band in &self.bands {
            if n >= band.lo && n <= band.hi {
                return (band.hint, band.component);
            }
        }
        (ComponentHint::Unknown, None)
    }
}

impl Default for ComponentMap {
    fn default() -> Self {
        Self::new(default_component_bands())
    }
}

/// The validated candidate catalog, read-only after construction.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CandidateEntry>,
}

impl Catalog {
    /// Build a catalog from entries, rejecting malformed rows up front:
    /// duplicate codes and empty titles are load-time errors, not
    /// request-time surprises.
    pub fn new(entries: Vec<CandidateEntry>) -> Result<Self> {
        anyhow::ensure!(!entries.is_empty(), "catalog has no entries");

        let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
        for entry in &entries {
            anyhow::ensure!(
                !entry.code.trim().is_empty(),
                "catalog entry with empty code"
            );
            anyhow::ensure!(
                !entry.title.trim().is_empty(),
                "catalog entry {} has an empty title",
                entry.code
            );
            anyhow::ensure!(
                seen.insert(entry.code.as_str()),
                "duplicate catalog code: {}",
                entry.code
            );
        }

        Ok(Self { entries })
    }

    /// Load the catalog from the metadata JSON array written by
    /// `icpc-coder index build`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read catalog metadata {}", path.display()))?;
        let entries: Vec<CandidateEntry> = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse catalog metadata {}", path.display()))?;
        let catalog = Self::new(entries)?;
        tracing::info!(path = %path.display(), entries = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Write the metadata JSON array.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write catalog metadata {}", path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&CandidateEntry> {
        self.entries.get(i)
    }

    pub fn entries(&self) -> &[CandidateEntry] {
        &self.entries
    }
}
