//! Wisdom store: a persistent semantic cache of resolved queries.
//!
//! Records are append-only. Lookup scores stored queries against the
//! incoming one with the same estimator the governor uses for hypotheses
//! ([`crate::similarity`]). The backing representation escalates by volume:
//!
//! - [`flat::FlatBackend`]: JSON lines, or memory only
//! - [`indexed::IndexedBackend`]: redb with a token inverted index
//! - [`vector::VectorBackend`]: redb records plus an HNSW candidate index
//!
//! [`WisdomStore`] is the shared handle. It serializes writes (store plus
//! escalation check) behind a write lock, so no reader ever observes a
//! half-migrated store.

pub mod backend;
pub mod escalation;
pub mod flat;
pub mod indexed;
pub mod vector;

use std::fmt;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, ValidationError, ValidationResult};

pub use backend::{BackendLocation, BackendTier, WisdomBackend};
pub use escalation::{EscalationManager, EscalationPolicy};

/// Result type for wisdom store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How a record entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WisdomKind {
    /// Pre-loaded before any session.
    Seed,
    /// Written by the governor at the end of a session.
    Learned,
    /// Pre-loaded and confirmed by a human.
    Verified,
}

impl fmt::Display for WisdomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WisdomKind::Seed => write!(f, "seed"),
            WisdomKind::Learned => write!(f, "learned"),
            WisdomKind::Verified => write!(f, "verified"),
        }
    }
}

/// A persisted query/resolution pair. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WisdomRecord {
    pub query: String,
    pub hypothesis: String,
    pub resolution: String,
    pub confidence: f64,
    pub kind: WisdomKind,
    pub contradiction_level: f64,
    pub ethical_alignment: f64,
    /// Seconds since the Unix epoch.
    pub created_at: u64,
    /// Abstract energy units the session spent.
    pub cost_units: u64,
    pub domain: String,
}

impl WisdomRecord {
    /// Build a validated record stamped with the current time.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: WisdomKind,
        query: impl Into<String>,
        hypothesis: impl Into<String>,
        resolution: impl Into<String>,
        confidence: f64,
        contradiction_level: f64,
        ethical_alignment: f64,
        cost_units: u64,
        domain: impl Into<String>,
    ) -> ValidationResult<Self> {
        let record = Self {
            query: query.into(),
            hypothesis: hypothesis.into(),
            resolution: resolution.into(),
            confidence,
            kind,
            contradiction_level,
            ethical_alignment,
            created_at: now_secs(),
            cost_units,
            domain: domain.into(),
        };
        record.validate()?;
        Ok(record)
    }

    /// A pre-loaded record with no recorded disagreement. Ethical alignment
    /// defaults to the confidence.
    pub fn seed(
        query: impl Into<String>,
        hypothesis: impl Into<String>,
        resolution: impl Into<String>,
        confidence: f64,
        domain: impl Into<String>,
    ) -> ValidationResult<Self> {
        Self::new(
            WisdomKind::Seed,
            query,
            hypothesis,
            resolution,
            confidence,
            0.0,
            confidence,
            0,
            domain,
        )
    }

    /// Same as [`seed`](Self::seed) but marked as human-verified.
    pub fn verified(
        query: impl Into<String>,
        hypothesis: impl Into<String>,
        resolution: impl Into<String>,
        confidence: f64,
        domain: impl Into<String>,
    ) -> ValidationResult<Self> {
        let mut record = Self::seed(query, hypothesis, resolution, confidence, domain)?;
        record.kind = WisdomKind::Verified;
        Ok(record)
    }

    /// Check the `[0, 1]` fields. Fields are public, so stores re-check
    /// before persisting.
    pub fn validate(&self) -> ValidationResult<()> {
        for (field, value) in [
            ("confidence", self.confidence),
            ("contradiction_level", self.contradiction_level),
            ("ethical_alignment", self.ethical_alignment),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::OutOfUnitRange { field, value });
            }
        }
        Ok(())
    }
}

/// Lookup parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WisdomQuery {
    pub text: String,
    /// Minimum similarity, inclusive.
    pub threshold: f64,
    pub domain: Option<String>,
    pub limit: Option<usize>,
}

impl WisdomQuery {
    pub fn new(text: impl Into<String>, threshold: f64) -> Self {
        Self {
            text: text.into(),
            threshold,
            domain: None,
            limit: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn matches_domain(&self, record: &WisdomRecord) -> bool {
        self.domain.as_deref().is_none_or(|d| d == record.domain)
    }
}

/// A record together with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    pub record: WisdomRecord,
    pub similarity: f64,
}

/// Aggregate view of the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WisdomStatistics {
    pub total: usize,
    pub seed: usize,
    pub learned: usize,
    pub verified: usize,
    pub average_confidence: f64,
    pub average_ethical_alignment: f64,
    pub tier: BackendTier,
    /// Record count past which the next migration runs; `None` at the top tier.
    pub next_escalation: Option<usize>,
    pub migrations: usize,
}

impl fmt::Display for WisdomStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Wisdom store ({} tier)", self.tier)?;
        writeln!(
            f,
            "  records:     {} (seed {}, learned {}, verified {})",
            self.total, self.seed, self.learned, self.verified
        )?;
        writeln!(f, "  confidence:  {:.3}", self.average_confidence)?;
        writeln!(f, "  alignment:   {:.3}", self.average_ethical_alignment)?;
        match self.next_escalation {
            Some(threshold) => writeln!(f, "  escalates past {threshold} records")?,
            None => writeln!(f, "  top tier")?,
        }
        write!(f, "  migrations:  {}", self.migrations)
    }
}

/// Running sums kept alongside the backend so statistics never scan it.
#[derive(Debug, Clone, Default)]
struct Tally {
    seed: usize,
    learned: usize,
    verified: usize,
    confidence_sum: f64,
    alignment_sum: f64,
}

impl Tally {
    fn from_records(records: &[WisdomRecord]) -> Self {
        let mut tally = Self::default();
        for record in records {
            tally.add(record);
        }
        tally
    }

    fn add(&mut self, record: &WisdomRecord) {
        match record.kind {
            WisdomKind::Seed => self.seed += 1,
            WisdomKind::Learned => self.learned += 1,
            WisdomKind::Verified => self.verified += 1,
        }
        self.confidence_sum += record.confidence;
        self.alignment_sum += record.ethical_alignment;
    }

    fn total(&self) -> usize {
        self.seed + self.learned + self.verified
    }
}

struct StoreState {
    manager: EscalationManager,
    tally: Tally,
}

/// Shared, long-lived wisdom store handle.
///
/// Wrap in an `Arc` to share between governors. All methods take `&self`.
pub struct WisdomStore {
    state: RwLock<StoreState>,
}

impl WisdomStore {
    /// A store that never touches disk, with default escalation thresholds.
    pub fn in_memory() -> Self {
        Self::from_manager(EscalationManager::in_memory(EscalationPolicy::default()))
    }

    /// Open (or create) a store in `dir` with default escalation thresholds.
    pub fn open(dir: &Path) -> StoreResult<Self> {
        Self::with_policy(
            BackendLocation::Directory(dir.to_path_buf()),
            EscalationPolicy::default(),
        )
    }

    pub fn with_policy(location: BackendLocation, policy: EscalationPolicy) -> StoreResult<Self> {
        let manager = EscalationManager::open(location, policy)?;
        let records = manager.backend().export_all()?;
        let tally = Tally::from_records(&records);
        tracing::info!(
            tier = %manager.tier(),
            records = tally.total(),
            "wisdom store opened"
        );
        Ok(Self {
            state: RwLock::new(StoreState { manager, tally }),
        })
    }

    fn from_manager(manager: EscalationManager) -> Self {
        Self {
            state: RwLock::new(StoreState {
                manager,
                tally: Tally::default(),
            }),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, StoreState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, StoreState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Append one record, then escalate the backend if it crossed a
    /// threshold. The record counts as stored once the backend confirms it,
    /// even if a subsequent migration fails.
    pub fn store(&self, record: WisdomRecord) -> StoreResult<()> {
        record.validate().map_err(invalid_record)?;
        let mut state = self.write()?;
        state.manager.backend_mut().store(&record)?;
        state.tally.add(&record);
        escalate_tolerantly(&mut state.manager);
        Ok(())
    }

    /// Store pre-loaded records one at a time through the normal write path.
    /// Returns how many were stored.
    pub fn seed<I>(&self, records: I) -> StoreResult<usize>
    where
        I: IntoIterator<Item = WisdomRecord>,
    {
        let mut stored = 0;
        for record in records {
            self.store(record)?;
            stored += 1;
        }
        Ok(stored)
    }

    /// Bulk-append records in one backend write.
    pub fn import(&self, records: Vec<WisdomRecord>) -> StoreResult<usize> {
        for record in &records {
            record.validate().map_err(invalid_record)?;
        }
        let mut state = self.write()?;
        state.manager.backend_mut().import_all(&records)?;
        for record in &records {
            state.tally.add(record);
        }
        escalate_tolerantly(&mut state.manager);
        Ok(records.len())
    }

    /// Records whose query scores at least `threshold`, best first.
    pub fn retrieve(&self, query: &str, threshold: f64) -> StoreResult<Vec<WisdomRecord>> {
        let scored = self.query(&WisdomQuery::new(query, threshold))?;
        Ok(scored.into_iter().map(|s| s.record).collect())
    }

    pub fn query(&self, query: &WisdomQuery) -> StoreResult<Vec<ScoredRecord>> {
        let state = self.read()?;
        state.manager.backend().query(query)
    }

    pub fn count(&self) -> StoreResult<usize> {
        self.read()?.manager.backend().count_records()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.count()? == 0)
    }

    /// Mean confidence over every stored record; `None` when empty.
    pub fn mean_confidence(&self) -> StoreResult<Option<f64>> {
        let state = self.read()?;
        let total = state.tally.total();
        Ok((total > 0).then(|| state.tally.confidence_sum / total as f64))
    }

    pub fn tier(&self) -> StoreResult<BackendTier> {
        Ok(self.read()?.manager.tier())
    }

    /// Completed migrations since the store was opened.
    pub fn migrations(&self) -> StoreResult<usize> {
        Ok(self.read()?.manager.migrations())
    }

    pub fn export_all(&self) -> StoreResult<Vec<WisdomRecord>> {
        self.read()?.manager.backend().export_all()
    }

    /// Write every record as a pretty-printed JSON array.
    pub fn export_json(&self, path: &Path) -> StoreResult<usize> {
        let records = self.export_all()?;
        let json = serde_json::to_string_pretty(&records).map_err(|e| StoreError::Serialization {
            message: format!("failed to encode wisdom export: {e}"),
        })?;
        std::fs::write(path, json)?;
        Ok(records.len())
    }

    /// Append every record from a JSON array written by
    /// [`export_json`](Self::export_json).
    pub fn import_json(&self, path: &Path) -> StoreResult<usize> {
        let json = std::fs::read_to_string(path)?;
        let records: Vec<WisdomRecord> =
            serde_json::from_str(&json).map_err(|e| StoreError::Serialization {
                message: format!("failed to decode {}: {e}", path.display()),
            })?;
        self.import(records)
    }

    pub fn statistics(&self) -> StoreResult<WisdomStatistics> {
        let state = self.read()?;
        let total = state.tally.total();
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };
        Ok(WisdomStatistics {
            total,
            seed: state.tally.seed,
            learned: state.tally.learned,
            verified: state.tally.verified,
            average_confidence: mean(state.tally.confidence_sum),
            average_ethical_alignment: mean(state.tally.alignment_sum),
            tier: state.manager.tier(),
            next_escalation: state.manager.next_threshold(),
            migrations: state.manager.migrations(),
        })
    }
}

impl fmt::Debug for WisdomStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WisdomStore").finish_non_exhaustive()
    }
}

/// A failed migration leaves the old tier active, so the write that
/// triggered it still succeeded. Log and retry on the next write.
fn escalate_tolerantly(manager: &mut EscalationManager) {
    if let Err(e) = manager.check_escalation() {
        tracing::warn!(tier = %manager.tier(), error = %e, "wisdom store escalation failed");
    }
}

fn invalid_record(e: ValidationError) -> StoreError {
    StoreError::InvalidRecord {
        message: e.to_string(),
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
