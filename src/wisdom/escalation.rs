//! Storage escalation: promotes the active backend to the next tier once
//! its record count crosses a threshold.
//!
//! A migration exports every record, builds the next tier at a staging
//! path, imports, verifies the count, moves the staging file into place,
//! and only then swaps the active backend. Any failure before the swap
//! leaves the old tier active and untouched. The old tier's files are
//! removed after the swap.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::backend::{BackendLocation, BackendTier, WisdomBackend};
use super::flat::{self, FlatBackend};
use super::indexed::{self, IndexedBackend};
use super::vector::{self, VectorBackend};
use super::StoreResult;
use crate::error::StoreError;

/// Record counts past which each tier escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Flat → indexed.
    pub indexed_threshold: usize,
    /// Indexed → vector.
    pub vector_threshold: usize,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            indexed_threshold: 10_000,
            vector_threshold: 1_000_000,
        }
    }
}

impl EscalationPolicy {
    /// Threshold that moves `tier` up, `None` at the top.
    pub fn threshold_for(&self, tier: BackendTier) -> Option<usize> {
        match tier {
            BackendTier::Flat => Some(self.indexed_threshold),
            BackendTier::Indexed => Some(self.vector_threshold),
            BackendTier::Vector => None,
        }
    }
}

fn file_name(tier: BackendTier) -> &'static str {
    match tier {
        BackendTier::Flat => flat::FILE_NAME,
        BackendTier::Indexed => indexed::FILE_NAME,
        BackendTier::Vector => vector::FILE_NAME,
    }
}

fn staging_path(dir: &Path, tier: BackendTier) -> PathBuf {
    dir.join(format!("{}.staging", file_name(tier)))
}

/// Open a database-backed tier at `path`, or in memory. Flat is never a
/// migration target, so it opens as indexed.
fn open_target(tier: BackendTier, path: Option<&Path>) -> StoreResult<Box<dyn WisdomBackend>> {
    Ok(match (tier, path) {
        (BackendTier::Vector, Some(path)) => Box::new(VectorBackend::open_file(path)?),
        (BackendTier::Vector, None) => Box::new(VectorBackend::in_memory()?),
        (BackendTier::Flat | BackendTier::Indexed, Some(path)) => {
            Box::new(IndexedBackend::open_file(path)?)
        }
        (BackendTier::Flat | BackendTier::Indexed, None) => Box::new(IndexedBackend::in_memory()?),
    })
}

/// Owns the active backend and swaps it on escalation.
pub struct EscalationManager {
    location: BackendLocation,
    policy: EscalationPolicy,
    active: Box<dyn WisdomBackend>,
    migrations: usize,
}

impl EscalationManager {
    pub fn in_memory(policy: EscalationPolicy) -> Self {
        Self {
            location: BackendLocation::Memory,
            policy,
            active: Box::new(FlatBackend::in_memory()),
            migrations: 0,
        }
    }

    /// Open whatever tier is present at `location`, highest first, then
    /// escalate if it is already over its threshold.
    pub fn open(location: BackendLocation, policy: EscalationPolicy) -> StoreResult<Self> {
        let Some(dir) = location.dir().map(Path::to_path_buf) else {
            return Ok(Self::in_memory(policy));
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::Io { source: e })?;
        for tier in [BackendTier::Indexed, BackendTier::Vector] {
            remove_stale(&staging_path(&dir, tier));
        }

        let tier = [BackendTier::Vector, BackendTier::Indexed]
            .into_iter()
            .find(|t| dir.join(file_name(*t)).exists())
            .unwrap_or(BackendTier::Flat);
        let active: Box<dyn WisdomBackend> = match tier {
            BackendTier::Vector => Box::new(VectorBackend::open(&dir)?),
            BackendTier::Indexed => Box::new(IndexedBackend::open(&dir)?),
            BackendTier::Flat => Box::new(FlatBackend::open(&dir)?),
        };
        // Lower tiers left behind by a migration that completed its swap.
        for lower in [BackendTier::Flat, BackendTier::Indexed] {
            if lower < tier {
                remove_stale(&dir.join(file_name(lower)));
            }
        }

        let mut manager = Self {
            location,
            policy,
            active,
            migrations: 0,
        };
        manager.check_escalation()?;
        Ok(manager)
    }

    pub fn backend(&self) -> &dyn WisdomBackend {
        self.active.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn WisdomBackend {
        self.active.as_mut()
    }

    pub fn tier(&self) -> BackendTier {
        self.active.tier()
    }

    pub fn migrations(&self) -> usize {
        self.migrations
    }

    pub fn next_threshold(&self) -> Option<usize> {
        self.policy.threshold_for(self.tier())
    }

    /// Migrate as many times as the current count demands. Returns whether
    /// any migration ran.
    pub fn check_escalation(&mut self) -> StoreResult<bool> {
        let mut escalated = false;
        while let Some(threshold) = self.next_threshold() {
            if self.active.count_records()? <= threshold {
                break;
            }
            self.migrate()?;
            escalated = true;
        }
        Ok(escalated)
    }

    /// Move every record to the next tier and make it active.
    pub fn migrate(&mut self) -> StoreResult<BackendTier> {
        let from = self.tier();
        let Some(to) = from.next() else {
            return Ok(from);
        };
        let records = self.active.export_all()?;
        let expected = records.len();
        tracing::info!(%from, %to, records = expected, "wisdom store migration started");

        let promoted = match self.location.dir() {
            None => {
                let mut target = open_target(to, None)?;
                target.import_all(&records)?;
                verify(to, expected, target.as_ref())?;
                target
            }
            Some(dir) => {
                let staging = staging_path(dir, to);
                if staging.exists() {
                    fs::remove_file(&staging)?;
                }
                {
                    let mut target = open_target(to, Some(&staging))?;
                    let imported = target
                        .import_all(&records)
                        .and_then(|()| verify(to, expected, target.as_ref()));
                    if let Err(e) = imported {
                        if let Err(cleanup) = target.destroy() {
                            tracing::warn!(
                                path = %staging.display(),
                                error = %cleanup,
                                "failed to remove staging file"
                            );
                        }
                        return Err(e);
                    }
                }
                let path = dir.join(file_name(to));
                fs::rename(&staging, &path)?;
                let target = open_target(to, Some(&path))?;
                verify(to, expected, target.as_ref())?;
                target
            }
        };

        let old = std::mem::replace(&mut self.active, promoted);
        self.migrations += 1;
        if let Err(e) = old.destroy() {
            tracing::warn!(tier = %from, error = %e, "failed to remove previous wisdom tier");
        }
        tracing::info!(%from, %to, records = expected, "wisdom store migration complete");
        Ok(to)
    }
}

fn verify(tier: BackendTier, expected: usize, backend: &dyn WisdomBackend) -> StoreResult<()> {
    let actual = backend.count_records()?;
    if actual != expected {
        return Err(StoreError::MigrationMismatch {
            tier: tier.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn remove_stale(path: &Path) {
    if !path.exists() {
        return;
    }
    match fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "removed stale wisdom file"),
        Err(e) => tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove stale wisdom file"
        ),
    }
}

impl std::fmt::Debug for EscalationManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscalationManager")
            .field("location", &self.location)
            .field("policy", &self.policy)
            .field("tier", &self.tier())
            .field("migrations", &self.migrations)
            .finish()
    }
}
