#![allow(dead_code)]

use anyhow::Result;
use std::sync::Arc;

use icpc_coder::catalog::index::FlatIndex;
use icpc_coder::catalog::{Catalog, CandidateEntry, ComponentMap};
use icpc_coder::config::AppConfig;
use icpc_coder::embedding::EmbeddingProvider;
use icpc_coder::llm::CompletionClient;

/// Embedding dimension used by the test fixtures — tiny on purpose.
pub const TEST_DIM: usize = 8;

/// Deterministic embedding stub: spreads the input bytes over the vector
/// and L2-normalizes. Same text always yields the identical vector.
pub struct StubEmbedding;

impl EmbeddingProvider for StubEmbedding {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut v = vec![0.0f32; TEST_DIM];
        for (i, b) in text.bytes().enumerate() {
            v[(i + b as usize) % TEST_DIM] += f32::from(b % 31) + 1.0;
        }
        Ok(l2_normalize(&v))
    }

    fn dimensions(&self) -> usize {
        TEST_DIM
    }
}

/// Embedding stub that returns the same fixed vector for every input.
/// Lets a test pin the query vector and control the similarity ordering.
pub struct FixedEmbedding(pub Vec<f32>);

impl EmbeddingProvider for FixedEmbedding {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }

    fn dimensions(&self) -> usize {
        self.0.len()
    }
}

pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}

/// Unit vector along `spike` in `TEST_DIM` dimensions.
pub fn unit(spike: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; TEST_DIM];
    v[spike % TEST_DIM] = 1.0;
    v
}

/// Build a catalog entry with hint/guess derived from the code.
pub fn entry(code: &str, title: &str) -> CandidateEntry {
    let (hint, guess) = ComponentMap::default().classify(code);
    CandidateEntry {
        code: code.to_string(),
        title: title.to_string(),
        component_hint: hint,
        component_guess: guess,
        chapter: code.chars().next().unwrap_or('?'),
    }
}

/// A small catalog of respiratory codes.
pub fn test_catalog() -> Catalog {
    Catalog::new(vec![
        entry("R05", "Hoste"),
        entry("R21", "Symptomer/plager hals"),
        entry("R74", "Akutt øvre luftveisinfeksjon"),
        entry("R75", "Bihulebetennelse"),
        entry("A03", "Feber"),
    ])
    .unwrap()
}

/// Index the catalog's document texts with the given provider.
pub fn index_for(catalog: &Catalog, provider: &dyn EmbeddingProvider) -> FlatIndex {
    let mut index = FlatIndex::new(provider.dimensions());
    for e in catalog.entries() {
        let vector = provider.embed_passage(&e.doc_text()).unwrap();
        index.push(&vector).unwrap();
    }
    index
}

/// Index built from explicit row vectors.
pub fn index_from_rows(rows: &[Vec<f32>]) -> FlatIndex {
    let mut index = FlatIndex::new(rows[0].len());
    for row in rows {
        index.push(row).unwrap();
    }
    index
}

/// Completion client with no provider configured.
pub fn offline_client() -> CompletionClient {
    CompletionClient::new(&AppConfig::default().llm).unwrap()
}

/// Analyzer over the test catalog with the given embedding stub.
pub fn test_analyzer(provider: Arc<dyn EmbeddingProvider>) -> icpc_coder::analyze::Analyzer {
    let catalog = test_catalog();
    let index = index_for(&catalog, provider.as_ref());
    icpc_coder::analyze::Analyzer::from_parts(
        catalog,
        index,
        provider,
        offline_client(),
        &AppConfig::default(),
    )
    .unwrap()
}
