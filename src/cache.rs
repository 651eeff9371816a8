//! The cache manager
//!
//! Orchestrates the four persisted artifacts (records, metadata, embedding
//! matrix, similarity index) behind two operations: `lookup` and `insert`.
//!
//! Reads are stateless: every lookup loads the metadata mirror and index
//! fresh from disk, so concurrent lookups see either the pre- or post-insert
//! state of each file, never a torn one. Inserts are serialized behind a
//! mutex covering the whole read-modify-write-rebuild sequence, which is the
//! only thing keeping the four files row-aligned.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::embeddings::{EmbeddingMatrix, EmbeddingStore};
use crate::index::FlatIndex;
use crate::store::{LoadOutcome, MetadataStore, Record, RecordStore};
use crate::vector::l2_norm;
use crate::Result;

const RECORDS_FILE: &str = "records.json";
const METADATA_FILE: &str = "metadata.bin";
const EMBEDDINGS_FILE: &str = "embeddings.bin";
const INDEX_FILE: &str = "index.bin";

/// Outcome of a similarity lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// A cached record whose similarity strictly exceeds the threshold.
    Hit {
        id: String,
        question: String,
        answer: String,
        score: f32,
    },
    /// No sufficiently similar record; the caller resolves the question
    /// externally and feeds the result back through `insert`.
    Miss,
}

/// Row counts across all four artifacts, for the maintenance surface.
#[derive(Debug, Clone, Copy)]
pub struct StoreStatus {
    pub records: usize,
    pub metadata: usize,
    pub embedding_rows: usize,
    pub index_rows: usize,
}

impl StoreStatus {
    /// True when every artifact reports the same row count, the invariant
    /// that holds after any successful insert.
    pub fn aligned(&self) -> bool {
        self.records == self.metadata
            && self.metadata == self.embedding_rows
            && self.embedding_rows == self.index_rows
    }
}

pub struct SemanticCache {
    records: RecordStore,
    metadata: MetadataStore,
    embeddings: EmbeddingStore,
    index_path: PathBuf,
    dim: usize,
    threshold: f32,
    // Covers the whole load-append-save-rebuild sequence of an insert
    write_lock: Mutex<()>,
}

impl SemanticCache {
    /// Opens (or initializes) a cache under `data_dir`.
    ///
    /// `dim` is the embedding model's output dimension and `threshold` the
    /// strictly-greater-than similarity bar for a hit (0.8 in production).
    /// The directory is created if absent; no artifact files are touched
    /// until the first insert.
    pub fn open(data_dir: impl AsRef<Path>, dim: usize, threshold: f32) -> Result<SemanticCache> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        Ok(SemanticCache {
            records: RecordStore::new(data_dir.join(RECORDS_FILE)),
            metadata: MetadataStore::new(data_dir.join(METADATA_FILE)),
            embeddings: EmbeddingStore::new(data_dir.join(EMBEDDINGS_FILE)),
            index_path: data_dir.join(INDEX_FILE),
            dim,
            threshold,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Finds the single best cached match for a query embedding.
    ///
    /// Every degraded condition (missing or corrupt files, an empty index, a
    /// stale index row pointing past the metadata, an unusable query vector)
    /// collapses to `Miss`: the worst the cache layer can do to a caller is
    /// send it down the slow path.
    pub fn lookup(&self, query_embedding: &[f32]) -> Lookup {
        let query = match l2_norm(query_embedding) {
            Ok(query) => query,
            Err(e) => {
                warn!("query embedding cannot be normalized, treating as miss: {}", e);
                return Lookup::Miss;
            }
        };

        let index = match FlatIndex::load(&self.index_path) {
            LoadOutcome::Loaded(index) => index,
            LoadOutcome::Empty => return Lookup::Miss,
            LoadOutcome::Corrupt(detail) => {
                warn!("similarity index unreadable, treating as miss: {}", detail);
                return Lookup::Miss;
            }
        };
        let metadata = self.metadata.load().unwrap_or_empty("metadata store");
        if metadata.is_empty() {
            return Lookup::Miss;
        }

        let ranked = match index.search(&query, 1) {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!("index search failed, treating as miss: {}", e);
                return Lookup::Miss;
            }
        };
        let Some(&(row, score)) = ranked.first() else {
            return Lookup::Miss;
        };

        // The index and metadata files are read at different moments; a row
        // past the end of the metadata we loaded means they were mid-update.
        if row >= metadata.len() {
            warn!(
                "index returned row {} but metadata has {} rows, treating as miss",
                row,
                metadata.len()
            );
            return Lookup::Miss;
        }

        if score > self.threshold {
            let matched = &metadata[row];
            Lookup::Hit {
                id: matched.id.clone(),
                question: matched.question.clone(),
                answer: matched.answer.clone(),
                score,
            }
        } else {
            Lookup::Miss
        }
    }

    /// Appends one question/answer pair with its (unnormalized) embedding to
    /// all four artifacts and rebuilds the index from the full matrix.
    ///
    /// The embedding must match the configured dimension and be normalizable;
    /// a vector the index could never hold is rejected before anything is
    /// written. Unreadable stores are degraded to empty before appending, so
    /// an insert always succeeds against whatever consistent state can be
    /// recovered.
    pub fn insert(&self, question: &str, answer: &str, embedding: &[f32]) -> Result<Record> {
        if embedding.len() != self.dim {
            return Err(crate::CacheError::Dimension { expected: self.dim, got: embedding.len() });
        }
        if let Err(e) = l2_norm(embedding) {
            return Err(crate::CacheError::Vector(format!("embedding is not indexable: {}", e)));
        }

        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut records = self.records.load().unwrap_or_empty("record store");
        let (mut metadata, mut matrix) = self.load_aligned()?;

        let record = Record::new(question, answer);
        records.push(record.clone());
        metadata.push(record.clone());
        matrix.push_row(embedding)?;

        self.records.save(&records)?;
        self.metadata.save(&metadata)?;
        self.embeddings.save(&matrix)?;
        self.write_index(&matrix)?;

        info!("cached new answer (id: {}, {} rows total)", record.id, metadata.len());
        Ok(record)
    }

    /// Direct point-lookup by record id, the secondary access path.
    pub fn answer_by_id(&self, id: &str) -> Option<String> {
        self.metadata
            .load()
            .unwrap_or_empty("metadata store")
            .into_iter()
            .find(|record| record.id == id)
            .map(|record| record.answer)
    }

    /// All records from the human-readable mirror, in insertion order.
    pub fn all_records(&self) -> Vec<Record> {
        self.records.load().unwrap_or_empty("record store")
    }

    /// Number of rows reachable through similarity lookup.
    pub fn count(&self) -> usize {
        self.metadata.load().unwrap_or_empty("metadata store").len()
    }

    /// Reports the row count of each artifact without modifying anything.
    pub fn status(&self) -> StoreStatus {
        let index_rows = match FlatIndex::load(&self.index_path) {
            LoadOutcome::Loaded(index) => index.rows(),
            LoadOutcome::Empty | LoadOutcome::Corrupt(_) => 0,
        };
        StoreStatus {
            records: self.records.load().unwrap_or_empty("record store").len(),
            metadata: self.metadata.load().unwrap_or_empty("metadata store").len(),
            embedding_rows: self.load_matrix().rows(),
            index_rows,
        }
    }

    /// Rebuilds the persisted index from the metadata and embedding stores,
    /// writing any repairs back, and returns the number of indexed rows.
    /// Maintenance entry point for recovering a deleted or corrupted index
    /// file or misaligned stores.
    pub fn rebuild_index(&self) -> Result<usize> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let (metadata, matrix) = self.load_aligned()?;
        self.metadata.save(&metadata)?;
        self.embeddings.save(&matrix)?;
        self.write_index(&matrix)?;
        Ok(matrix.rows())
    }

    /// Loads metadata and embeddings, repairing row-count disagreement and
    /// unindexable rows.
    ///
    /// A crash between the per-file saves of an insert leaves the stores
    /// misaligned by at most one trailing row; the shorter store wins and
    /// the others are truncated to match before anything is appended. A
    /// persisted row that cannot be normalized would fail every future index
    /// build, so such rows are dropped from both stores along with their
    /// metadata.
    fn load_aligned(&self) -> Result<(Vec<Record>, EmbeddingMatrix)> {
        let mut metadata = self.metadata.load().unwrap_or_empty("metadata store");
        let mut matrix = self.load_matrix();

        if metadata.len() != matrix.rows() {
            let rows = metadata.len().min(matrix.rows());
            warn!(
                "metadata has {} rows but embedding matrix has {}, truncating both to {}",
                metadata.len(),
                matrix.rows(),
                rows
            );
            metadata.truncate(rows);
            matrix.truncate_rows(rows);
        }

        if (0..matrix.rows()).any(|i| l2_norm(matrix.row(i)).is_err()) {
            let mut kept_records = Vec::with_capacity(metadata.len());
            let mut kept_rows = EmbeddingMatrix::empty(self.dim);
            for (i, record) in metadata.into_iter().enumerate() {
                match l2_norm(matrix.row(i)) {
                    Ok(_) => {
                        kept_rows.push_row(matrix.row(i))?;
                        kept_records.push(record);
                    }
                    Err(e) => {
                        warn!("dropping unindexable embedding row {} (id: {}): {}", i, record.id, e);
                    }
                }
            }
            metadata = kept_records;
            matrix = kept_rows;
        }

        Ok((metadata, matrix))
    }

    fn load_matrix(&self) -> EmbeddingMatrix {
        match self.embeddings.load(self.dim) {
            LoadOutcome::Loaded(matrix) => matrix,
            LoadOutcome::Empty => EmbeddingMatrix::empty(self.dim),
            LoadOutcome::Corrupt(detail) => {
                warn!("embedding store unreadable, continuing with empty matrix: {}", detail);
                EmbeddingMatrix::empty(self.dim)
            }
        }
    }

    /// Persists the index for `matrix`: a full rebuild, or deletion of the
    /// index file when there is nothing to index.
    fn write_index(&self, matrix: &EmbeddingMatrix) -> Result<()> {
        if matrix.is_empty() {
            FlatIndex::remove(&self.index_path)
        } else {
            FlatIndex::build(matrix)?.save(&self.index_path)
        }
    }
}

#[cfg(test)]
mod cache_test {
    use super::*;
    use crate::store::MetadataStore;
    use tempfile::TempDir;

    fn open_cache(dir: &TempDir) -> SemanticCache {
        SemanticCache::open(dir.path(), 3, 0.8).unwrap()
    }

    // ========== Cold Start Tests ==========

    #[test]
    fn test_lookup_on_empty_cache_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert_eq!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Miss);
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_open_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        SemanticCache::open(&nested, 3, 0.8).unwrap();
        assert!(nested.is_dir());
    }

    // ========== Insert & Lookup Tests ==========

    #[test]
    fn test_insert_then_exact_lookup_hits() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let record = cache
            .insert("What is gradient descent?", "An optimization algorithm.", &[1.0, 0.0, 0.0])
            .unwrap();

        match cache.lookup(&[1.0, 0.0, 0.0]) {
            Lookup::Hit { id, answer, score, .. } => {
                assert_eq!(id, record.id);
                assert_eq!(answer, "An optimization algorithm.");
                assert!((score - 1.0).abs() < 1e-5);
            }
            Lookup::Miss => panic!("expected a hit"),
        }
    }

    #[test]
    fn test_similarity_above_threshold_hits_below_misses() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache
            .insert("What is gradient descent?", "An optimization algorithm.", &[1.0, 0.0, 0.0])
            .unwrap();

        // cosine 0.85 against the stored vector: hit
        let close = [0.85, (1.0f32 - 0.85 * 0.85).sqrt(), 0.0];
        assert!(matches!(cache.lookup(&close), Lookup::Hit { .. }));

        // cosine 0.5: miss
        let far = [0.5, (1.0f32 - 0.25).sqrt(), 0.0];
        assert_eq!(cache.lookup(&far), Lookup::Miss);
    }

    #[test]
    fn test_threshold_is_strict() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SemanticCache::open(dir.path(), 3, 1.0).unwrap();

        cache.insert("q", "a", &[1.0, 0.0, 0.0]).unwrap();

        // Exact match scores 1.0, which does not strictly exceed 1.0
        assert_eq!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Miss);
    }

    #[test]
    fn test_lookup_returns_best_of_several() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.insert("about x", "answer x", &[1.0, 0.0, 0.0]).unwrap();
        cache.insert("about y", "answer y", &[0.0, 1.0, 0.0]).unwrap();
        cache.insert("about xy", "answer xy", &[0.7, 0.7, 0.0]).unwrap();

        match cache.lookup(&[0.0, 0.95, 0.05]) {
            Lookup::Hit { answer, .. } => assert_eq!(answer, "answer y"),
            Lookup::Miss => panic!("expected a hit"),
        }
    }

    #[test]
    fn test_insert_rejects_wrong_dimension() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.insert("q", "a", &[1.0, 0.0]).is_err());
        assert_eq!(cache.count(), 0);
    }

    #[test]
    fn test_insert_rejects_unindexable_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.insert("q-zero", "a", &[0.0, 0.0, 0.0]).is_err());
        assert!(cache.insert("q-nan", "a", &[f32::NAN, 0.0, 0.0]).is_err());

        // Nothing was written by the rejected inserts
        let status = cache.status();
        assert_eq!(status.records, 0);
        assert_eq!(status.metadata, 0);
        assert_eq!(status.embedding_rows, 0);
        assert_eq!(status.index_rows, 0);

        // And the cache still accepts good rows afterwards
        cache.insert("q-ok", "a-ok", &[1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Hit { .. }));
    }

    #[test]
    fn test_unusable_query_embedding_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        cache.insert("q", "a", &[1.0, 0.0, 0.0]).unwrap();

        assert_eq!(cache.lookup(&[0.0, 0.0, 0.0]), Lookup::Miss);
        assert_eq!(cache.lookup(&[]), Lookup::Miss);
    }

    // ========== Alignment Tests ==========

    #[test]
    fn test_all_artifacts_aligned_after_inserts() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();
        cache.insert("q2", "a2", &[0.0, 1.0, 0.0]).unwrap();

        let status = cache.status();
        assert!(status.aligned());
        assert_eq!(status.metadata, 2);
        assert_eq!(status.index_rows, 2);
    }

    #[test]
    fn test_stale_index_row_degrades_to_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let first = cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();
        cache.insert("q2", "a2", &[0.0, 1.0, 0.0]).unwrap();

        // Rewrite the metadata mirror with only the first row while the
        // index still holds two, as if a reader raced a writer.
        MetadataStore::new(dir.path().join(METADATA_FILE))
            .save(&[first])
            .unwrap();

        // Best match is index row 1, which is now past the metadata
        assert_eq!(cache.lookup(&[0.0, 1.0, 0.0]), Lookup::Miss);
        // Row 0 is still resolvable
        assert!(matches!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Hit { .. }));
    }

    #[test]
    fn test_insert_repairs_shorter_store_wins() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let first = cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();
        cache.insert("q2", "a2", &[0.0, 1.0, 0.0]).unwrap();

        // Simulate a crash that lost the second metadata row
        MetadataStore::new(dir.path().join(METADATA_FILE))
            .save(&[first])
            .unwrap();

        cache.insert("q3", "a3", &[0.0, 0.0, 1.0]).unwrap();

        // The orphaned embedding row was truncated away before appending
        let status = cache.status();
        assert_eq!(status.metadata, 2);
        assert_eq!(status.embedding_rows, 2);
        assert_eq!(status.index_rows, 2);

        match cache.lookup(&[0.0, 0.0, 1.0]) {
            Lookup::Hit { answer, .. } => assert_eq!(answer, "a3"),
            Lookup::Miss => panic!("expected a hit"),
        }
    }

    #[test]
    fn test_rebuild_drops_poisoned_embedding_rows() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let good = cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();

        // Plant a zero row with matching metadata, as an older writer
        // without the insert-time check could have left behind
        let mut m = EmbeddingMatrix::empty(3);
        m.push_row(&[1.0, 0.0, 0.0]).unwrap();
        m.push_row(&[0.0, 0.0, 0.0]).unwrap();
        EmbeddingStore::new(dir.path().join(EMBEDDINGS_FILE)).save(&m).unwrap();
        MetadataStore::new(dir.path().join(METADATA_FILE))
            .save(&[good, Record::new("q-bad", "a-bad")])
            .unwrap();

        // Rebuild drops the dead row and writes the repair back
        assert_eq!(cache.rebuild_index().unwrap(), 1);
        let status = cache.status();
        assert_eq!(status.metadata, 1);
        assert!(status.embedding_rows == 1 && status.index_rows == 1);
        assert!(matches!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Hit { .. }));
    }

    #[test]
    fn test_insert_recovers_from_poisoned_row() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let good = cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();

        let mut m = EmbeddingMatrix::empty(3);
        m.push_row(&[1.0, 0.0, 0.0]).unwrap();
        m.push_row(&[0.0, 0.0, 0.0]).unwrap();
        EmbeddingStore::new(dir.path().join(EMBEDDINGS_FILE)).save(&m).unwrap();
        MetadataStore::new(dir.path().join(METADATA_FILE))
            .save(&[good, Record::new("q-bad", "a-bad")])
            .unwrap();

        // The next insert sheds the dead row instead of failing forever
        cache.insert("q2", "a2", &[0.0, 1.0, 0.0]).unwrap();

        let status = cache.status();
        assert_eq!(status.metadata, 2);
        assert!(status.embedding_rows == 2 && status.index_rows == 2);
        match cache.lookup(&[0.0, 1.0, 0.0]) {
            Lookup::Hit { answer, .. } => assert_eq!(answer, "a2"),
            Lookup::Miss => panic!("expected a hit"),
        }
    }

    // ========== Corruption Containment Tests ==========

    #[test]
    fn test_corrupt_metadata_still_allows_insert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();

        // Corrupt the metadata file in place
        std::fs::write(dir.path().join(METADATA_FILE), b"garbage").unwrap();

        cache.insert("q2", "a2", &[0.0, 1.0, 0.0]).unwrap();

        // The cache rebuilt from scratch: one live row, fully aligned
        let status = cache.status();
        assert_eq!(status.metadata, 1);
        assert!(status.index_rows == 1 && status.embedding_rows == 1);

        match cache.lookup(&[0.0, 1.0, 0.0]) {
            Lookup::Hit { answer, .. } => assert_eq!(answer, "a2"),
            Lookup::Miss => panic!("expected a hit"),
        }

        // The human-readable mirror kept the full history
        assert_eq!(cache.all_records().len(), 2);
    }

    #[test]
    fn test_corrupt_index_degrades_to_miss_then_rebuilds() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();
        std::fs::write(dir.path().join(INDEX_FILE), b"\x00\x01").unwrap();

        assert_eq!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Miss);

        assert_eq!(cache.rebuild_index().unwrap(), 1);
        assert!(matches!(cache.lookup(&[1.0, 0.0, 0.0]), Lookup::Hit { .. }));
    }

    #[test]
    fn test_rebuild_index_with_no_embeddings_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();
        assert!(dir.path().join(INDEX_FILE).exists());

        // Lose the embeddings, then rebuild: the index file must go away
        std::fs::remove_file(dir.path().join(EMBEDDINGS_FILE)).unwrap();
        assert_eq!(cache.rebuild_index().unwrap(), 0);
        assert!(!dir.path().join(INDEX_FILE).exists());
    }

    // ========== Point Lookup Tests ==========

    #[test]
    fn test_answer_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let record = cache.insert("q1", "a1", &[1.0, 0.0, 0.0]).unwrap();

        assert_eq!(cache.answer_by_id(&record.id).as_deref(), Some("a1"));
        assert_eq!(cache.answer_by_id("no-such-id"), None);
    }
}
