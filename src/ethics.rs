//! Ethical alignment monitor.
//!
//! Scores transparency per cycle: disagreement that is surfaced earns a
//! bonus, while a critical generator too weak to push back is treated as an
//! evasion, not as a sign that everything is safe.

use serde::{Deserialize, Serialize};

use crate::hypothesis::HypothesisOutput;

/// Contradiction above which the transparency bonus applies.
const TRANSPARENCY_CONTRADICTION: f64 = 0.3;
const TRANSPARENCY_BONUS: f64 = 0.1;
const EVASION_PENALTY: f64 = 0.2;

/// Score reported when no cycle has been scored yet.
const NEUTRAL_ALIGNMENT: f64 = 0.5;

/// Outcome of scoring one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EthicalAssessment {
    pub score: f64,
    pub evasion: bool,
}

/// Pure per-cycle score. `evasion_floor` is the critical confidence below
/// which the cycle counts as evasive.
pub fn assess(
    constructive: &HypothesisOutput,
    critical: &HypothesisOutput,
    contradiction: f64,
    evasion_floor: f64,
) -> EthicalAssessment {
    let mut score = (constructive.confidence() + critical.confidence()) / 2.0;
    if contradiction > TRANSPARENCY_CONTRADICTION {
        score += TRANSPARENCY_BONUS;
    }
    let evasion = critical.confidence() < evasion_floor;
    if evasion {
        score -= EVASION_PENALTY;
    }
    EthicalAssessment {
        score: score.clamp(0.0, 1.0),
        evasion,
    }
}

/// Running record of ethical scores and evasion events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EthicalMonitor {
    scores: Vec<f64>,
    evasions: Vec<bool>,
}

impl EthicalMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, assessment: EthicalAssessment) {
        self.scores.push(assessment.score);
        self.evasions.push(assessment.evasion);
        if assessment.evasion {
            tracing::debug!(score = assessment.score, "evasion detected: critical output too weak");
        }
    }

    /// Mean of recorded scores, or 0.5 before any cycle.
    pub fn overall_alignment(&self) -> f64 {
        if self.scores.is_empty() {
            return NEUTRAL_ALIGNMENT;
        }
        self.scores.iter().sum::<f64>() / self.scores.len() as f64
    }

    /// Fraction of cycles flagged as evasive.
    pub fn evasion_rate(&self) -> f64 {
        if self.evasions.is_empty() {
            return 0.0;
        }
        self.evasions.iter().filter(|e| **e).count() as f64 / self.evasions.len() as f64
    }

    pub fn cycles_observed(&self) -> usize {
        self.scores.len()
    }
}
