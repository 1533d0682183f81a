//! Serializable record of a reasoning session.

use serde::Serialize;

use crate::energy::EnergyAccountant;
use crate::ethics::EthicalMonitor;
use crate::evaluation::CycleEvaluation;
use crate::halting::StopReason;
use crate::wisdom::WisdomStatistics;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnergySummary {
    pub total: u64,
    pub per_cycle: Vec<u64>,
    pub average_per_cycle: f64,
    pub wisdom_hits: u64,
    pub wisdom_misses: u64,
    pub hit_ratio: f64,
    pub early_exits: u64,
    /// Heuristic, see [`EnergyAccountant::estimated_savings`].
    pub estimated_savings: f64,
}

impl From<&EnergyAccountant> for EnergySummary {
    fn from(energy: &EnergyAccountant) -> Self {
        Self {
            total: energy.total(),
            per_cycle: energy.per_cycle().to_vec(),
            average_per_cycle: energy.average_per_cycle(),
            wisdom_hits: energy.hits(),
            wisdom_misses: energy.misses(),
            hit_ratio: energy.hit_ratio(),
            early_exits: energy.early_exits(),
            estimated_savings: energy.estimated_savings(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EthicsSummary {
    pub overall_alignment: f64,
    pub evasion_rate: f64,
    pub cycles_observed: usize,
}

impl From<&EthicalMonitor> for EthicsSummary {
    fn from(monitor: &EthicalMonitor) -> Self {
        Self {
            overall_alignment: monitor.overall_alignment(),
            evasion_rate: monitor.evasion_rate(),
            cycles_observed: monitor.cycles_observed(),
        }
    }
}

/// Per-cycle series, one entry per cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectories {
    pub similarity: Vec<f64>,
    pub risk: Vec<f64>,
    pub quality: Vec<f64>,
    pub ethics: Vec<f64>,
    pub budget: Vec<f64>,
}

impl Trajectories {
    pub fn from_cycles(cycles: &[CycleEvaluation]) -> Self {
        Self {
            similarity: cycles.iter().map(|c| c.similarity).collect(),
            risk: cycles.iter().map(|c| c.risk).collect(),
            quality: cycles.iter().map(|c| c.composite_quality).collect(),
            ethics: cycles.iter().map(|c| c.ethical_score).collect(),
            budget: cycles.iter().map(|c| c.remaining_budget).collect(),
        }
    }
}

/// Final scores of the last cycle. Absent when the session ran no cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalScores {
    pub similarity: f64,
    pub contradiction: f64,
    pub risk: f64,
    pub quality: f64,
    pub ethical_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditTrail {
    pub query: String,
    pub domain: String,
    pub total_cycles: usize,
    pub stop_reason: StopReason,
    pub early_exit: bool,
    pub final_scores: Option<FinalScores>,
    pub budget_initial: f64,
    pub budget_consumed: f64,
    pub budget_remaining: f64,
    pub trajectories: Trajectories,
    pub energy: EnergySummary,
    pub ethics: EthicsSummary,
    pub wisdom: WisdomStatistics,
    pub cycles: Vec<CycleEvaluation>,
}

impl AuditTrail {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Gathers what the governor knows at the end of a session.
pub struct AuditInputs<'a> {
    pub query: &'a str,
    pub domain: &'a str,
    pub stop_reason: StopReason,
    pub early_exit: bool,
    pub budget_initial: f64,
    pub budget_remaining: f64,
    pub cycles: Vec<CycleEvaluation>,
    pub energy: &'a EnergyAccountant,
    pub ethics: &'a EthicalMonitor,
    pub wisdom: WisdomStatistics,
}

impl From<AuditInputs<'_>> for AuditTrail {
    fn from(inputs: AuditInputs<'_>) -> Self {
        let final_scores = inputs.cycles.last().map(|last| FinalScores {
            similarity: last.similarity,
            contradiction: last.contradiction,
            risk: last.risk,
            quality: last.composite_quality,
            ethical_score: last.ethical_score,
        });
        Self {
            query: inputs.query.to_string(),
            domain: inputs.domain.to_string(),
            total_cycles: inputs.cycles.len(),
            stop_reason: inputs.stop_reason,
            early_exit: inputs.early_exit,
            final_scores,
            budget_initial: inputs.budget_initial,
            budget_consumed: inputs.budget_initial - inputs.budget_remaining,
            budget_remaining: inputs.budget_remaining,
            trajectories: Trajectories::from_cycles(&inputs.cycles),
            energy: EnergySummary::from(inputs.energy),
            ethics: EthicsSummary::from(inputs.ethics),
            wisdom: inputs.wisdom,
            cycles: inputs.cycles,
        }
    }
}
