//! Capability interface shared by every wisdom storage tier.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{ScoredRecord, StoreResult, WisdomQuery, WisdomRecord};
use crate::similarity::{token_similarity, tokenize};

/// Storage representation, ordered by capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendTier {
    Flat,
    Indexed,
    Vector,
}

impl BackendTier {
    /// The tier a migration from `self` promotes to.
    pub fn next(self) -> Option<BackendTier> {
        match self {
            BackendTier::Flat => Some(BackendTier::Indexed),
            BackendTier::Indexed => Some(BackendTier::Vector),
            BackendTier::Vector => None,
        }
    }
}

impl fmt::Display for BackendTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendTier::Flat => write!(f, "flat"),
            BackendTier::Indexed => write!(f, "indexed"),
            BackendTier::Vector => write!(f, "vector"),
        }
    }
}

/// Where a store keeps its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendLocation {
    /// Nothing touches the filesystem; contents die with the process.
    Memory,
    Directory(PathBuf),
}

impl BackendLocation {
    pub fn dir(&self) -> Option<&Path> {
        match self {
            BackendLocation::Memory => None,
            BackendLocation::Directory(dir) => Some(dir),
        }
    }
}

/// One storage tier.
///
/// Backends never decide when to escalate; the
/// [`EscalationManager`](super::escalation::EscalationManager) does.
pub trait WisdomBackend: Send + Sync {
    fn tier(&self) -> BackendTier;

    /// Records matching `query`, best first.
    fn query(&self, query: &WisdomQuery) -> StoreResult<Vec<ScoredRecord>>;

    /// Append one record. On error nothing was stored.
    fn store(&mut self, record: &WisdomRecord) -> StoreResult<()>;

    fn count_records(&self) -> StoreResult<usize>;

    /// Every record in insertion order.
    fn export_all(&self) -> StoreResult<Vec<WisdomRecord>>;

    /// Append records in bulk. On error nothing was stored.
    fn import_all(&mut self, records: &[WisdomRecord]) -> StoreResult<()>;

    /// Close the backend and delete whatever it persisted. Called on the old
    /// tier once a migration has switched over.
    fn destroy(self: Box<Self>) -> StoreResult<()>;
}

/// Score candidates, keep those passing `query`, and order them by
/// descending similarity with insertion order breaking ties.
///
/// `candidates` yields `(insertion id, record)` pairs.
pub(crate) fn rank<I>(query: &WisdomQuery, candidates: I) -> Vec<ScoredRecord>
where
    I: IntoIterator<Item = (u64, WisdomRecord)>,
{
    let tokens = tokenize(&query.text);
    let mut scored: Vec<(u64, ScoredRecord)> = candidates
        .into_iter()
        .filter(|(_, record)| query.matches_domain(record))
        .filter_map(|(id, record)| {
            let similarity = token_similarity(&tokens, &tokenize(&record.query));
            (similarity >= query.threshold).then_some((id, ScoredRecord { record, similarity }))
        })
        .collect();
    scored.sort_by(|(ia, a), (ib, b)| {
        b.similarity
            .total_cmp(&a.similarity)
            .then_with(|| ia.cmp(ib))
    });
    let mut ranked: Vec<ScoredRecord> = scored.into_iter().map(|(_, s)| s).collect();
    if let Some(limit) = query.limit {
        ranked.truncate(limit);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(query: &str, domain: &str) -> WisdomRecord {
        WisdomRecord::seed(query, "h", format!("about {query}"), 0.8, domain).unwrap()
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(BackendTier::Flat < BackendTier::Indexed);
        assert_eq!(BackendTier::Flat.next(), Some(BackendTier::Indexed));
        assert_eq!(BackendTier::Indexed.next(), Some(BackendTier::Vector));
        assert_eq!(BackendTier::Vector.next(), None);
        assert_eq!(BackendTier::Indexed.to_string(), "indexed");
    }

    #[test]
    fn rank_orders_by_similarity_then_insertion() {
        let records = vec![
            (0, record("rust borrow checker rules", "code")),
            (1, record("rust borrow checker", "code")),
            (2, record("rust borrow checker", "code")),
            (3, record("baking bread", "food")),
        ];
        let query = WisdomQuery::new("rust borrow checker", 0.5);
        let ranked = rank(&query, records);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].similarity, 1.0);
        assert_eq!(ranked[0].record.resolution, ranked[1].record.resolution);
        assert!(ranked[2].similarity < 1.0);
    }

    #[test]
    fn rank_filters_domain_and_limits() {
        let records = vec![
            (0, record("rust traits", "code")),
            (1, record("rust traits", "metal")),
            (2, record("rust traits", "code")),
        ];
        let query = WisdomQuery::new("rust traits", 0.9).with_domain("code").with_limit(1);
        let ranked = rank(&query, records);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].record.domain, "code");
    }
}
