//! Embedding matrix persistence
//!
//! Embeddings are stored unnormalized, row-major, one f32 row per cached
//! record, in the same order as the metadata store. Normalization happens
//! only when rows enter the similarity index or a query is compared.

use serde::{Serialize, Deserialize};
use std::fs::File;
use std::io::{BufReader, ErrorKind};
use std::path::{Path, PathBuf};

use crate::store::{write_atomic, LoadOutcome};
use crate::{CacheError, Result};

/// A dense `[rows, dim]` matrix in a single flat buffer:
/// `[r0_d0, r0_d1, ..., r1_d0, r1_d1, ...]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    /// An empty matrix shaped `[0, dim]`. The dimension is fixed up front by
    /// the embedding model and never changes for the lifetime of the cache.
    pub fn empty(dim: usize) -> EmbeddingMatrix {
        EmbeddingMatrix { dim, data: Vec::new() }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn rows(&self) -> usize {
        if self.dim == 0 { 0 } else { self.data.len() / self.dim }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }

    /// Appends one embedding row. The row length must match the matrix
    /// dimension; rows are never reordered or removed afterwards except by
    /// [`truncate_rows`](EmbeddingMatrix::truncate_rows).
    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dim {
            return Err(CacheError::Dimension { expected: self.dim, got: row.len() });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }

    /// Drops rows from the tail, used when parallel stores disagree on row
    /// count after a crash mid-insert and the shorter store wins.
    pub fn truncate_rows(&mut self, rows: usize) {
        self.data.truncate(rows * self.dim);
    }
}

/// Disk-backed store for the embedding matrix, bincode-encoded.
pub struct EmbeddingStore {
    path: PathBuf,
}

impl EmbeddingStore {
    pub fn new(path: impl Into<PathBuf>) -> EmbeddingStore {
        EmbeddingStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the matrix, verifying it still matches the live model's
    /// dimension. A mismatch is reported as `Corrupt`: the cached vectors
    /// are unusable for similarity against the current model, and the matrix
    /// can be recomputed from the record store at embedding cost.
    pub fn load(&self, expected_dim: usize) -> LoadOutcome<EmbeddingMatrix> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return LoadOutcome::Empty,
            Err(e) => {
                return LoadOutcome::Corrupt(format!("failed to open '{}': {}", self.path.display(), e));
            }
        };

        let matrix: EmbeddingMatrix = match bincode::deserialize_from(BufReader::new(file)) {
            Ok(matrix) => matrix,
            Err(e) => {
                return LoadOutcome::Corrupt(format!("failed to decode '{}': {}", self.path.display(), e));
            }
        };

        if matrix.is_empty() {
            return LoadOutcome::Empty;
        }
        if matrix.dim != expected_dim {
            return LoadOutcome::Corrupt(format!(
                "'{}' holds {}-dimensional embeddings but the model produces {}",
                self.path.display(),
                matrix.dim,
                expected_dim
            ));
        }
        if matrix.data.len() % matrix.dim != 0 {
            return LoadOutcome::Corrupt(format!(
                "'{}' holds a ragged matrix ({} values, dimension {})",
                self.path.display(),
                matrix.data.len(),
                matrix.dim
            ));
        }

        LoadOutcome::Loaded(matrix)
    }

    pub fn save(&self, matrix: &EmbeddingMatrix) -> Result<()> {
        let bytes = bincode::serialize(matrix)
            .map_err(|e| CacheError::Serialize(format!("failed to encode '{}': {}", self.path.display(), e)))?;
        write_atomic(&self.path, &bytes)
    }
}
