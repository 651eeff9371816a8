//! # semcache - A Semantic Answer Cache
//!
//! semcache stores question/answer pairs alongside their embeddings and
//! answers repeated questions from disk instead of calling a language model
//! again. Similarity is measured by dot product over L2-normalized vectors
//! (equivalent to cosine similarity).
//!
//! Four artifacts live under one data directory: a human-readable JSON record
//! file, a binary metadata mirror, a row-major embedding matrix, and a flat
//! inner-product index rebuilt from the matrix on every insert. Missing or
//! corrupt files degrade to "empty" with a warning; a cache failure is never
//! worse than a cache miss.
//!
//! ## Example
//!
//! ```
//! use semcache::cache::{Lookup, SemanticCache};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let cache = SemanticCache::open(dir.path(), 3, 0.8).unwrap();
//!
//! // Nothing cached yet: always a miss
//! assert!(matches!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Miss));
//!
//! cache.insert("What is gradient descent?", "An optimization algorithm.",
//!              &[1.0, 0.0, 0.0]).unwrap();
//!
//! // A close-enough query returns the cached answer with its score
//! match cache.lookup(&[0.9, 0.1, 0.0]) {
//!     Lookup::Hit { answer, score, .. } => {
//!         assert_eq!(answer, "An optimization algorithm.");
//!         assert!(score > 0.8);
//!     }
//!     Lookup::Miss => panic!("expected a hit"),
//! }
//! ```

use thiserror::Error;

pub mod cache;
pub mod cli;
pub mod config;
pub mod embeddings;
pub mod index;
pub mod openai;
pub mod provider;
pub mod server;
pub mod store;
pub mod topics;
pub mod vector;

pub use cache::{Lookup, SemanticCache};
pub use store::Record;

pub type Result<T> = std::result::Result<T, CacheError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    #[error("vector error: {0}")]
    Vector(String),

    #[error("configuration error: {0}")]
    Config(String),
}
