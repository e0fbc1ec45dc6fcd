//! Flat nearest-neighbor index over catalog embeddings.
//!
//! Exact inner-product search over L2-normalized vectors (equivalent to
//! cosine similarity). Row `i` of the index corresponds to catalog entry
//! `i`; the index file is a bincode-serialized [`FlatIndex`] written by
//! `icpc-coder index build` and loaded read-only at startup.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Dense row-major vector table with exact top-N search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dim: usize) -> Self {
        Self { dim, data: Vec::new() }
    }

    /// Append one vector. Vectors must all have the index dimension.
    pub fn push(&mut self, vector: &[f32]) -> Result<()> {
        anyhow::ensure!(
            vector.len() == self.dim,
            "vector has {} dimensions, index expects {}",
            vector.len(),
            self.dim
        );
        self.data.extend_from_slice(vector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Exact top-`topn` search by inner product, descending score.
    ///
    /// Ties are broken by ascending row index, so repeated searches with
    /// the same query return the identical ordered result.
    pub fn search(&self, query: &[f32], topn: usize) -> Result<Vec<(usize, f32)>> {
        anyhow::ensure!(
            query.len() == self.dim,
            "query has {} dimensions, index expects {}",
            query.len(),
            self.dim
        );

        let mut scored: Vec<(usize, f32)> = self
            .data
            .chunks_exact(self.dim)
            .map(|row| row.iter().zip(query).map(|(a, b)| a * b).sum::<f32>())
            .enumerate()
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(topn);
        Ok(scored)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut file = BufWriter::new(
            File::create(path)
                .with_context(|| format!("failed to create index file {}", path.display()))?,
        );
        bincode::serialize_into(&mut file, self)
            .with_context(|| format!("failed to write index file {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = BufReader::new(
            File::open(path)
                .with_context(|| format!("failed to open index file {}", path.display()))?,
        );
        let index: Self = bincode::deserialize_from(file)
            .with_context(|| format!("failed to parse index file {}", path.display()))?;

        anyhow::ensure!(index.dim > 0, "index file {} has zero dimension", path.display());
        anyhow::ensure!(
            index.data.len() % index.dim == 0,
            "index file {} is truncated ({} floats, dimension {})",
            path.display(),
            index.data.len(),
            index.dim
        );

        tracing::info!(path = %path.display(), rows = index.len(), dim = index.dim, "index loaded");
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unit vector along `spike` in 4 dimensions.
    fn unit(spike: usize) -> Vec<f32> {
        let mut v = vec![0.0f32; 4];
        v[spike] = 1.0;
        v
    }

    fn small_index() -> FlatIndex {
        let mut index = FlatIndex::new(4);
        index.push(&unit(0)).unwrap();
        index.push(&unit(1)).unwrap();
        index.push(&unit(2)).unwrap();
        index.push(&[0.5, 0.5, 0.5, 0.5]).unwrap();
        index
    }

    #[test]
    fn push_rejects_wrong_dimension() {
        let mut index = FlatIndex::new(4);
        assert!(index.push(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn search_orders_by_descending_score() {
        let index = small_index();
        let hits = index.search(&unit(1), 4).unwrap();
        assert_eq!(hits[0].0, 1);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, 3); // 0.5 from the mixed row
        // remaining two rows are orthogonal, tie broken by index
        assert_eq!(hits[2].0, 0);
        assert_eq!(hits[3].0, 2);
    }

    #[test]
    fn search_tie_break_is_stable() {
        let mut index = FlatIndex::new(2);
        for _ in 0..5 {
            index.push(&[1.0, 0.0]).unwrap();
        }
        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        let order: Vec<usize> = hits.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn search_is_deterministic() {
        let index = small_index();
        let a = index.search(&[0.3, 0.1, 0.9, 0.2], 3).unwrap();
        let b = index.search(&[0.3, 0.1, 0.9, 0.2], 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn search_bounds_result_count() {
        let index = small_index();
        assert_eq!(index.search(&unit(0), 2).unwrap().len(), 2);
        // topn beyond the row count returns every row, nothing more
        assert_eq!(index.search(&unit(0), 100).unwrap().len(), 4);
    }

    #[test]
    fn search_rejects_wrong_query_dimension() {
        let index = small_index();
        assert!(index.search(&[1.0], 2).is_err());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.index");
        let index = small_index();
        index.save(&path).unwrap();

        let loaded = FlatIndex::load(&path).unwrap();
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.dim(), index.dim());
        assert_eq!(
            loaded.search(&unit(2), 2).unwrap(),
            index.search(&unit(2), 2).unwrap()
        );
    }
}
