//! Vector tier: redb-persisted records with an in-memory HNSW candidate
//! index over hashed bag-of-words embeddings.
//!
//! The HNSW graph is rebuilt from the record table on open. Queries take the
//! nearest neighbours by cosine distance and rescore them with the exact
//! similarity estimator, so results are exact for every record HNSW returns
//! but recall is approximate. Thresholds at or below the disjoint-text floor
//! fall back to a full scan. Domain-scoped queries skip HNSW and use the
//! token index of the record table, since the top-k cut happens before the
//! domain filter and could leave out every record of a small domain.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use anndists::dist::DistCosine;
use hnsw_rs::hnsw::Hnsw;

use super::backend::{BackendTier, WisdomBackend, rank};
use super::indexed::IndexedBackend;
use super::{ScoredRecord, StoreResult, WisdomQuery, WisdomRecord};
use crate::similarity::{similarity_floor, tokenize};

pub const FILE_NAME: &str = "wisdom-vector.redb";

/// Embedding width.
pub const DIMENSIONS: usize = 256;

/// Neighbours fetched per query when the caller sets no larger limit.
const CANDIDATES: usize = 64;

const MAX_NB_CONNECTION: usize = 16;
const MAX_LAYER: usize = 16;
const EF_CONSTRUCTION: usize = 200;

/// Hashed bag-of-words embedding, L2-normalized. All zeros for text
/// without tokens.
pub fn embed(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMENSIONS];
    for token in tokenize(text) {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        v[(hasher.finish() % DIMENSIONS as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

fn is_zero(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

pub struct VectorBackend {
    records: IndexedBackend,
    hnsw: Hnsw<'static, f32, DistCosine>,
    indexed: usize,
}

// Safety: Hnsw guards its layers and point storage with internal locks;
// inserts and searches only need `&self`.
unsafe impl Send for VectorBackend {}
unsafe impl Sync for VectorBackend {}

impl VectorBackend {
    /// Open or create `wisdom-vector.redb` in `dir`.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        std::fs::create_dir_all(dir)?;
        Self::from_records(IndexedBackend::open_file(&dir.join(FILE_NAME))?)
    }

    pub fn open_file(path: &Path) -> StoreResult<Self> {
        Self::from_records(IndexedBackend::open_file(path)?)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::from_records(IndexedBackend::in_memory()?)
    }

    fn from_records(records: IndexedBackend) -> StoreResult<Self> {
        let existing = records.scan()?;
        // Capacity is a sizing hint for the layer tables, not a hard cap.
        let max_elements = (existing.len() * 2).max(1024);
        let hnsw = Hnsw::new(
            MAX_NB_CONNECTION,
            max_elements,
            MAX_LAYER,
            EF_CONSTRUCTION,
            DistCosine {},
        );
        let mut backend = Self {
            records,
            hnsw,
            indexed: 0,
        };
        let embedded: Vec<(Vec<f32>, usize)> = existing
            .iter()
            .map(|(id, r)| (embed(&r.query), *id as usize))
            .filter(|(v, _)| !is_zero(v))
            .collect();
        let batch: Vec<(&Vec<f32>, usize)> = embedded.iter().map(|(v, id)| (v, *id)).collect();
        backend.hnsw.parallel_insert(&batch);
        backend.indexed = batch.len();
        tracing::debug!(records = existing.len(), indexed = backend.indexed, "vector index built");
        Ok(backend)
    }

    fn index(&mut self, first_id: u64, records: &[WisdomRecord]) {
        for (offset, record) in records.iter().enumerate() {
            let v = embed(&record.query);
            if is_zero(&v) {
                continue;
            }
            self.hnsw.insert((v.as_slice(), (first_id as usize) + offset));
            self.indexed += 1;
        }
    }
}

impl WisdomBackend for VectorBackend {
    fn tier(&self) -> BackendTier {
        BackendTier::Vector
    }

    fn query(&self, query: &WisdomQuery) -> StoreResult<Vec<ScoredRecord>> {
        if query.threshold <= similarity_floor() {
            return Ok(rank(query, self.records.scan()?));
        }
        if query.domain.is_some() {
            return self.records.query(query);
        }
        let v = embed(&query.text);
        if is_zero(&v) || self.indexed == 0 {
            return Ok(Vec::new());
        }
        let k = query.limit.map_or(CANDIDATES, |l| l.max(CANDIDATES));
        let ef = (2 * k).max(EF_CONSTRUCTION);
        let ids: Vec<u64> = self
            .hnsw
            .search(&v, k, ef)
            .into_iter()
            .map(|n| n.d_id as u64)
            .collect();
        Ok(rank(query, self.records.fetch(ids)?))
    }

    fn store(&mut self, record: &WisdomRecord) -> StoreResult<()> {
        let first = self.records.append(std::slice::from_ref(record))?;
        self.index(first, std::slice::from_ref(record));
        Ok(())
    }

    fn count_records(&self) -> StoreResult<usize> {
        self.records.count_records()
    }

    fn export_all(&self) -> StoreResult<Vec<WisdomRecord>> {
        self.records.export_all()
    }

    fn import_all(&mut self, records: &[WisdomRecord]) -> StoreResult<()> {
        let first = self.records.append(records)?;
        self.index(first, records);
        Ok(())
    }

    fn destroy(self: Box<Self>) -> StoreResult<()> {
        let VectorBackend { records, hnsw, .. } = *self;
        drop(hnsw);
        Box::new(records).destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(query: &str) -> WisdomRecord {
        WisdomRecord::seed(query, "h", format!("answer to {query}"), 0.8, "test").unwrap()
    }

    #[test]
    fn embedding_is_normalized_and_deterministic() {
        let a = embed("Rust ownership rules");
        let b = embed("rules ownership rust");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(is_zero(&embed("   ")));
    }

    #[test]
    fn finds_exact_match() {
        let mut backend = VectorBackend::in_memory().unwrap();
        let queries: Vec<String> = (0..200).map(|i| format!("topic{i} question{i}")).collect();
        let records: Vec<_> = queries.iter().map(|q| record(q)).collect();
        backend.import_all(&records).unwrap();
        backend.store(&record("what is the meaning of life")).unwrap();

        let hits = backend
            .query(&WisdomQuery::new("what is the meaning of life", 0.9))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].similarity, 1.0);

        let hits = backend.query(&WisdomQuery::new("topic7 question7", 0.9)).unwrap();
        assert_eq!(hits[0].record.query, "topic7 question7");
    }

    #[test]
    fn low_threshold_scans_everything() {
        let mut backend = VectorBackend::in_memory().unwrap();
        backend.import_all(&[record("a"), record("b"), record("")]).unwrap();
        let hits = backend.query(&WisdomQuery::new("c", 0.0)).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn domain_query_matches_indexed_tier() {
        let mut backend = VectorBackend::in_memory().unwrap();
        let mut indexed = IndexedBackend::in_memory().unwrap();
        let mut records: Vec<_> = (0..100)
            .map(|i| {
                WisdomRecord::seed(format!("shared words {i}"), "h", "r", 0.8, "x").unwrap()
            })
            .collect();
        records.push(WisdomRecord::seed("shared words here", "h", "r", 0.8, "y").unwrap());
        backend.import_all(&records).unwrap();
        indexed.import_all(&records).unwrap();

        let query = WisdomQuery::new("shared words", 0.5)
            .with_domain("y")
            .with_limit(1);
        let hits = backend.query(&query).unwrap();
        assert_eq!(hits, indexed.query(&query).unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.domain, "y");
    }

    #[test]
    fn index_is_rebuilt_on_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut backend = VectorBackend::open(dir.path()).unwrap();
            backend.store(&record("persistent vector query")).unwrap();
        }
        let backend = VectorBackend::open(dir.path()).unwrap();
        assert_eq!(backend.count_records().unwrap(), 1);
        let hits = backend
            .query(&WisdomQuery::new("persistent vector query", 0.9))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
