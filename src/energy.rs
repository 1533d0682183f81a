//! Energy accountant: prices cycles in abstract cost units and tracks how
//! often the wisdom store short-circuits a session.

use serde::{Deserialize, Serialize};

/// Cost growth per additional cycle (10%).
const DEPTH_GROWTH: f64 = 0.1;

/// Hit ratio above which savings are estimated at all.
const SAVINGS_HIT_RATIO: f64 = 0.5;
const SAVINGS_BASE: f64 = 0.30;
const SAVINGS_SLOPE: f64 = 0.40;
const SAVINGS_CAP: f64 = 0.70;

/// `floor(base × multiplier × (1 + 0.1 (n - 1)))`.
pub fn cycle_cost(base_cost: u64, multiplier: f64, cycle: u32) -> u64 {
    let depth_factor = DEPTH_GROWTH * f64::from(cycle.saturating_sub(1));
    (base_cost as f64 * multiplier * (1.0 + depth_factor)).floor() as u64
}

/// Running cost and wisdom-hit ledger. Lives as long as the governor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyAccountant {
    base_cost: u64,
    multiplier: f64,
    per_cycle: Vec<u64>,
    total: u64,
    hits: u64,
    misses: u64,
    early_exits: u64,
}

impl EnergyAccountant {
    pub fn new(base_cost: u64, multiplier: f64) -> Self {
        Self {
            base_cost,
            multiplier,
            per_cycle: Vec::new(),
            total: 0,
            hits: 0,
            misses: 0,
            early_exits: 0,
        }
    }

    /// Price a cycle without recording it.
    pub fn price(&self, cycle: u32) -> u64 {
        cycle_cost(self.base_cost, self.multiplier, cycle)
    }

    /// Record an already-priced cycle.
    pub fn charge(&mut self, cost: u64) {
        self.per_cycle.push(cost);
        self.total += cost;
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_early_exit(&mut self) {
        self.early_exits += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn per_cycle(&self) -> &[u64] {
        &self.per_cycle
    }

    pub fn average_per_cycle(&self) -> f64 {
        if self.per_cycle.is_empty() {
            return 0.0;
        }
        self.total as f64 / self.per_cycle.len() as f64
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn early_exits(&self) -> u64 {
        self.early_exits
    }

    /// `hits / (hits + misses)`, 0 before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }

    /// Heuristic savings estimate, not a measurement.
    ///
    /// `min(0.70, 0.30 + 0.40 × hit_ratio)` once more than half of lookups
    /// hit, otherwise 0. The constants are assumptions about how much a
    /// cached answer saves relative to a full session; nothing here observes
    /// actual consumption.
    pub fn estimated_savings(&self) -> f64 {
        let ratio = self.hit_ratio();
        if ratio > SAVINGS_HIT_RATIO {
            (SAVINGS_BASE + ratio * SAVINGS_SLOPE).min(SAVINGS_CAP)
        } else {
            0.0
        }
    }
}
