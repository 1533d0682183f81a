//! Halting state machine.
//!
//! Every cycle resolves to [`Verdict::Continue`] or [`Verdict::Stop`] with one
//! [`StopReason`]. Criteria are checked in a fixed priority order and the
//! first match wins:
//!
//! 1. convergence (`similarity >= similarity_threshold`)
//! 2. risk (`risk > risk_threshold`)
//! 3. budget exhaustion (`remaining <= 0`)
//! 4. plateau (`cycle > 1` and quality gain `< quality_improvement_threshold`)
//! 5. max cycles (`cycle >= max_cycles`)
//! 6. irreducible uncertainty (entropy proxy below threshold while
//!    contradiction stays above its floor)
//!
//! Convergence precedes risk so that agreeing but unsure generators are not
//! reported as dangerous. Budget precedes plateau so that running out of
//! patience is distinguishable from running out of ideas.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::GovernorConfig;
use crate::scoring::entropy_proxy;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ConvergenceAchieved,
    RiskThresholdExceeded,
    ContradictionExhausted,
    PlateauDetected,
    MaxCyclesReached,
    IrreducibleUncertainty,
    /// Session answered from the wisdom store without running a cycle.
    /// Never produced by [`decide`].
    WisdomHit,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopReason::ConvergenceAchieved => "convergence_achieved",
            StopReason::RiskThresholdExceeded => "risk_threshold_exceeded",
            StopReason::ContradictionExhausted => "contradiction_exhausted",
            StopReason::PlateauDetected => "plateau_detected",
            StopReason::MaxCyclesReached => "max_cycles_reached",
            StopReason::IrreducibleUncertainty => "irreducible_uncertainty",
            StopReason::WisdomHit => "wisdom_hit",
        };
        f.write_str(s)
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Continue,
    Stop(StopReason),
}

impl Verdict {
    pub fn is_stop(&self) -> bool {
        matches!(self, Verdict::Stop(_))
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        match self {
            Verdict::Stop(reason) => Some(*reason),
            Verdict::Continue => None,
        }
    }
}

/// The numbers a verdict is computed from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaltingInputs {
    pub cycle: u32,
    pub similarity: f64,
    pub contradiction: f64,
    /// Risk after wisdom damping.
    pub risk: f64,
    pub remaining_budget: f64,
    pub composite_quality: f64,
    /// Composite quality of the previous cycle in this session, if any.
    pub previous_quality: Option<f64>,
    pub ethical_score: f64,
}

/// Apply the halting criteria in priority order.
///
/// `max_cycles` is passed separately so a per-session override can replace
/// the configured limit.
pub fn decide(config: &GovernorConfig, max_cycles: u32, inputs: &HaltingInputs) -> Verdict {
    if inputs.similarity >= config.similarity_threshold {
        return Verdict::Stop(StopReason::ConvergenceAchieved);
    }
    if inputs.risk > config.risk_threshold {
        return Verdict::Stop(StopReason::RiskThresholdExceeded);
    }
    if inputs.remaining_budget <= 0.0 {
        return Verdict::Stop(StopReason::ContradictionExhausted);
    }
    if inputs.cycle > 1 {
        if let Some(previous) = inputs.previous_quality {
            if inputs.composite_quality - previous < config.quality_improvement_threshold {
                return Verdict::Stop(StopReason::PlateauDetected);
            }
        }
    }
    if inputs.cycle >= max_cycles {
        return Verdict::Stop(StopReason::MaxCyclesReached);
    }
    if entropy_proxy(inputs.cycle) < config.uncertainty_entropy_threshold
        && inputs.contradiction > config.uncertainty_contradiction_floor
    {
        return Verdict::Stop(StopReason::IrreducibleUncertainty);
    }
    Verdict::Continue
}

/// Human-readable account of a verdict.
pub fn rationale(
    config: &GovernorConfig,
    max_cycles: u32,
    inputs: &HaltingInputs,
    verdict: Verdict,
) -> String {
    match verdict {
        Verdict::Continue => format!(
            "Cycle {}: similarity {:.2}, risk {:.2}, quality {:.2}, ethical {:.2}. Continuing.",
            inputs.cycle,
            inputs.similarity,
            inputs.risk,
            inputs.composite_quality,
            inputs.ethical_score
        ),
        Verdict::Stop(StopReason::ConvergenceAchieved) => format!(
            "Convergence achieved (similarity {:.2} >= {}). Stopping with high confidence.",
            inputs.similarity, config.similarity_threshold
        ),
        Verdict::Stop(StopReason::RiskThresholdExceeded) => format!(
            "Risk threshold exceeded ({:.2} > {}). Stopping for safety.",
            inputs.risk, config.risk_threshold
        ),
        Verdict::Stop(StopReason::ContradictionExhausted) => format!(
            "Contradiction budget exhausted (remaining {:.3}). Stopping to prevent runaway conflict.",
            inputs.remaining_budget
        ),
        Verdict::Stop(StopReason::PlateauDetected) => format!(
            "Quality plateau detected (improvement {:.3} < {}). Stopping.",
            inputs.composite_quality - inputs.previous_quality.unwrap_or(inputs.composite_quality),
            config.quality_improvement_threshold
        ),
        Verdict::Stop(StopReason::MaxCyclesReached) => {
            format!("Maximum cycles ({max_cycles}) reached. Stopping.")
        }
        Verdict::Stop(StopReason::IrreducibleUncertainty) => format!(
            "Irreducible uncertainty: contradiction {:.2} persists as options collapse. Stopping.",
            inputs.contradiction
        ),
        Verdict::Stop(StopReason::WisdomHit) => {
            "Answered from accumulated wisdom without reasoning cycles.".to_string()
        }
    }
}
