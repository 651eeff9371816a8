//! External model interfaces
//!
//! The embedding model and the language-model fallback are black boxes to
//! the cache: injected capabilities, constructed once at startup and passed
//! to whoever needs them. Their failures are the only ones that surface to
//! the caller as request errors.

use anyhow::Result;

/// Turns text into a fixed-length vector. `dimension` is constant for the
/// lifetime of the deployment and for a given model version the output is
/// deterministic.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}

/// Produces a fresh answer for a question the cache could not serve.
pub trait Answerer: Send + Sync {
    fn complete(&self, question: &str) -> Result<String>;
}
