//! Flat inner-product similarity index
//!
//! An exact nearest-neighbor index over unit vectors. It is a derived
//! artifact: always rebuilt wholesale from the embedding matrix, never
//! appended to in place, so it can't drift from the stores it mirrors. Row
//! `i` of the index corresponds to row `i` of the metadata store.

use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::Path;

use crate::embeddings::EmbeddingMatrix;
use crate::store::{write_atomic, LoadOutcome};
use crate::vector::{dot_product, l2_norm};
use crate::{CacheError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct FlatIndex {
    dim: usize,
    vectors: Vec<f32>,
}

impl FlatIndex {
    /// Builds the index from scratch, L2-normalizing every matrix row. Rows
    /// are stored contiguously in matrix order.
    pub fn build(matrix: &EmbeddingMatrix) -> Result<FlatIndex> {
        let mut vectors = Vec::with_capacity(matrix.rows() * matrix.dim());
        for i in 0..matrix.rows() {
            let normalized = l2_norm(matrix.row(i)).map_err(|e| {
                CacheError::Vector(format!("embedding row {} cannot be indexed: {}", i, e))
            })?;
            vectors.extend(normalized);
        }

        Ok(FlatIndex { dim: matrix.dim(), vectors })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of indexed rows.
    pub fn rows(&self) -> usize {
        if self.dim == 0 { 0 } else { self.vectors.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Exact top-k search by inner product. The query must already be
    /// L2-normalized; scores are then cosine similarities in [-1, 1].
    /// Results come back ranked best-first. An empty index yields an empty
    /// result rather than an error.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<(usize, f32)>> {
        if self.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dim {
            return Err(CacheError::Dimension { expected: self.dim, got: query.len() });
        }

        let rows = self.rows();
        let mut ranked: Vec<(usize, f32)> = Vec::with_capacity(top_k.min(rows) + 1);
        for i in 0..rows {
            let score = dot_product(self.row(i), query)?;
            let at = ranked.partition_point(|&(_, s)| s >= score);
            if at < top_k {
                ranked.insert(at, (i, score));
                ranked.truncate(top_k);
            }
        }

        Ok(ranked)
    }

    fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.vectors[start..start + self.dim]
    }

    /// Writes the index blob to disk.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = bincode::serialize(self)
            .map_err(|e| CacheError::Serialize(format!("failed to encode '{}': {}", path.display(), e)))?;
        write_atomic(path, &bytes)
    }

    /// Reads an index blob back. Missing file means "no index yet" and a
    /// file that won't decode is reported, not raised: the index is always
    /// reconstructible from the embedding matrix.
    pub fn load(path: &Path) -> LoadOutcome<FlatIndex> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadOutcome::Empty,
            Err(e) => return LoadOutcome::Corrupt(format!("failed to open '{}': {}", path.display(), e)),
        };

        match bincode::deserialize_from::<_, FlatIndex>(BufReader::new(file)) {
            Ok(index) if index.is_empty() => LoadOutcome::Empty,
            Ok(index) => LoadOutcome::Loaded(index),
            Err(e) => LoadOutcome::Corrupt(format!("failed to decode '{}': {}", path.display(), e)),
        }
    }

    /// Removes a persisted index file. An empty index is modeled as "no
    /// index file", so this is the save-path for a zero-row rebuild.
    pub fn remove(path: &Path) -> Result<()> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::Io(e)),
        }
    }
}
