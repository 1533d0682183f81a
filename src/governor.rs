//! The governor: drives the dual-hypothesis cycle loop for one query at a
//! time and feeds every completed session back into the wisdom store.
//!
//! ```text
//! reason(query)
//!   → wisdom lookup ── confident match ──→ recalled answer (no cycles)
//!   → loop { generate both → evaluate → commit budget/energy/ethics → stop? }
//!   → synthesize output → append Learned record → audit
//! ```
//!
//! Cycles are strictly sequential: each evaluation reads the previous
//! cycle's quality and momentary past. Within a cycle the two generators
//! may run concurrently (`parallel_generation`).

use std::sync::Arc;

use serde::Serialize;

use crate::audit::{AuditInputs, AuditTrail, EnergySummary, EthicsSummary};
use crate::budget::ContradictionBudget;
use crate::config::GovernorConfig;
use crate::energy::EnergyAccountant;
use crate::error::{GenerationError, TheosResult, ValidationError};
use crate::ethics::{EthicalAssessment, EthicalMonitor};
use crate::evaluation::{CycleContext, CycleEvaluation, MomentaryPast, evaluate};
use crate::halting::StopReason;
use crate::hypothesis::{HypothesisGenerator, HypothesisOutput, TemplateGenerator};
use crate::output::{SessionOutput, synthesize};
use crate::wisdom::{
    ScoredRecord, WisdomKind, WisdomQuery, WisdomRecord, WisdomStatistics, WisdomStore,
};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Ran at least one cycle and stored a Learned record.
    Completed,
    /// Answered from the wisdom store without running a cycle.
    EarlyExit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    pub status: SessionStatus,
    pub output: SessionOutput,
    pub audit: AuditTrail,
    pub cycles_used: u32,
    pub early_exit: bool,
}

impl SessionResult {
    pub fn stop_reason(&self) -> StopReason {
        self.audit.stop_reason
    }
}

/// Governor-lifetime statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GovernorStatistics {
    pub sessions: u64,
    /// Cycles run by the most recent session.
    pub cycles_completed: usize,
    pub energy: EnergySummary,
    pub ethics: EthicsSummary,
    pub wisdom: WisdomStatistics,
}

pub struct Governor {
    config: GovernorConfig,
    wisdom: Arc<WisdomStore>,
    constructive: Box<dyn HypothesisGenerator>,
    critical: Box<dyn HypothesisGenerator>,
    energy: EnergyAccountant,
    ethics: EthicalMonitor,
    momentary_past: MomentaryPast,
    history: Vec<CycleEvaluation>,
    sessions: u64,
}

impl Governor {
    /// Validate `config` and wire up the collaborators.
    pub fn new(
        config: GovernorConfig,
        wisdom: Arc<WisdomStore>,
        constructive: Box<dyn HypothesisGenerator>,
        critical: Box<dyn HypothesisGenerator>,
    ) -> TheosResult<Self> {
        config.validate()?;
        tracing::info!(
            max_cycles = config.max_cycles,
            similarity_threshold = config.similarity_threshold,
            risk_threshold = config.risk_threshold,
            parallel = config.parallel_generation,
            "governor initialized"
        );
        Ok(Self {
            energy: EnergyAccountant::new(config.base_cost, config.dual_generator_multiplier),
            config,
            wisdom,
            constructive,
            critical,
            ethics: EthicalMonitor::new(),
            momentary_past: MomentaryPast::default(),
            history: Vec::new(),
            sessions: 0,
        })
    }

    /// A governor driven by the built-in [`TemplateGenerator`]s.
    pub fn with_templates(config: GovernorConfig, wisdom: Arc<WisdomStore>) -> TheosResult<Self> {
        Self::new(
            config,
            wisdom,
            Box::new(TemplateGenerator::constructive()),
            Box::new(TemplateGenerator::critical()),
        )
    }

    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    pub fn wisdom(&self) -> &Arc<WisdomStore> {
        &self.wisdom
    }

    /// Cycles of the most recent session.
    pub fn history(&self) -> &[CycleEvaluation] {
        &self.history
    }

    pub fn momentary_past(&self) -> &MomentaryPast {
        &self.momentary_past
    }

    /// Reason about `query` until a halting criterion fires.
    ///
    /// `max_cycles` overrides the configured limit for this session and
    /// must be at least `min_cycles`. Generation failures abort the session
    /// without recording the failed cycle or storing anything.
    pub fn reason(
        &mut self,
        query: &str,
        domain: &str,
        max_cycles: Option<u32>,
    ) -> TheosResult<SessionResult> {
        if query.trim().is_empty() {
            return Err(ValidationError::EmptyQuery.into());
        }
        let max_cycles = match max_cycles {
            Some(requested) if requested < self.config.min_cycles => {
                return Err(ValidationError::InvalidCycleOverride {
                    requested,
                    min: self.config.min_cycles,
                }
                .into());
            }
            Some(requested) => requested,
            None => self.config.max_cycles,
        };

        self.momentary_past.reset();
        self.history.clear();
        self.sessions += 1;
        tracing::info!(domain, max_cycles, query_len = query.len(), "reasoning session started");

        let relevant = self.wisdom.query(&WisdomQuery::new(
            query,
            self.config.wisdom_similarity_threshold,
        ))?;
        if let Some(top) = relevant.first() {
            if top.record.confidence > self.config.early_exit_confidence {
                return self.recall(query, domain, top);
            }
        }
        self.energy.record_miss();

        let prior: Vec<WisdomRecord> = relevant.into_iter().map(|s| s.record).collect();
        let wisdom_mean_confidence = self.wisdom.mean_confidence()?;
        let mut budget =
            ContradictionBudget::new(self.config.initial_budget, self.config.budget_decay_rate)?;
        let mut previous_quality = None;
        let mut last: Option<(HypothesisOutput, HypothesisOutput)> = None;
        let session_energy_start = self.energy.total();

        for cycle in 1..=max_cycles {
            let (constructive, critical) = self.generate_pair(query, cycle, &prior)?;
            let ctx = CycleContext {
                cycle,
                budget: budget.remaining(),
                max_cycles,
                previous_quality,
                wisdom_mean_confidence,
                momentary_past: &self.momentary_past,
            };
            let evaluation = evaluate(&self.config, &constructive, &critical, &ctx)?;

            let debit = budget.spend(evaluation.contradiction);
            debug_assert_eq!(debit.remaining, evaluation.remaining_budget);
            let cost = self.energy.price(cycle);
            debug_assert_eq!(cost, evaluation.energy_cost);
            self.energy.charge(cost);
            self.ethics.record(EthicalAssessment {
                score: evaluation.ethical_score,
                evasion: evaluation.evasion,
            });
            self.momentary_past.update(&constructive, &critical, &evaluation);
            previous_quality = Some(evaluation.composite_quality);

            tracing::debug!(
                cycle,
                similarity = evaluation.similarity,
                risk = evaluation.risk,
                quality = evaluation.composite_quality,
                remaining_budget = evaluation.remaining_budget,
                verdict = ?evaluation.verdict,
                "cycle evaluated"
            );

            let stop = evaluation.is_stop();
            self.history.push(evaluation);
            last = Some((constructive, critical));
            if stop {
                break;
            }
        }

        let (Some((constructive, critical)), Some(final_eval)) = (last, self.history.last()) else {
            return Err(ValidationError::InvalidCycleOverride {
                requested: max_cycles,
                min: self.config.min_cycles,
            }
            .into());
        };
        let stop_reason = final_eval
            .stop_reason()
            .unwrap_or(StopReason::MaxCyclesReached);
        let output = synthesize(&self.config, &constructive, &critical, final_eval);

        let learned = WisdomRecord::new(
            WisdomKind::Learned,
            query,
            final_eval.rationale.clone(),
            output.text(),
            final_eval.composite_quality,
            final_eval.contradiction,
            final_eval.ethical_score,
            self.energy.total() - session_energy_start,
            domain,
        )?;
        self.wisdom.store(learned)?;

        let cycles_used = self.history.len() as u32;
        tracing::info!(
            cycles = cycles_used,
            stop_reason = %stop_reason,
            output = output.kind(),
            confidence = output.confidence(),
            "reasoning session complete"
        );

        let audit = AuditTrail::from(AuditInputs {
            query,
            domain,
            stop_reason,
            early_exit: false,
            budget_initial: budget.initial(),
            budget_remaining: budget.remaining(),
            cycles: self.history.clone(),
            energy: &self.energy,
            ethics: &self.ethics,
            wisdom: self.wisdom.statistics()?,
        });
        Ok(SessionResult {
            status: SessionStatus::Completed,
            output,
            audit,
            cycles_used,
            early_exit: false,
        })
    }

    fn recall(
        &mut self,
        query: &str,
        domain: &str,
        top: &ScoredRecord,
    ) -> TheosResult<SessionResult> {
        self.energy.record_hit();
        self.energy.record_early_exit();
        tracing::info!(
            similarity = top.similarity,
            confidence = top.record.confidence,
            kind = %top.record.kind,
            "early exit from wisdom store"
        );
        let output = SessionOutput::Recalled {
            text: top.record.resolution.clone(),
            confidence: top.record.confidence,
            similarity: top.similarity,
        };
        let audit = AuditTrail::from(AuditInputs {
            query,
            domain,
            stop_reason: StopReason::WisdomHit,
            early_exit: true,
            budget_initial: self.config.initial_budget,
            budget_remaining: self.config.initial_budget,
            cycles: Vec::new(),
            energy: &self.energy,
            ethics: &self.ethics,
            wisdom: self.wisdom.statistics()?,
        });
        Ok(SessionResult {
            status: SessionStatus::EarlyExit,
            output,
            audit,
            cycles_used: 0,
            early_exit: true,
        })
    }

    fn generate_pair(
        &self,
        query: &str,
        cycle: u32,
        prior: &[WisdomRecord],
    ) -> Result<(HypothesisOutput, HypothesisOutput), GenerationError> {
        if self.config.parallel_generation {
            let (constructive, critical) = rayon::join(
                || self.constructive.generate(query, cycle, prior),
                || self.critical.generate(query, cycle, prior),
            );
            Ok((constructive?, critical?))
        } else {
            let constructive = self.constructive.generate(query, cycle, prior)?;
            let critical = self.critical.generate(query, cycle, prior)?;
            Ok((constructive, critical))
        }
    }

    pub fn statistics(&self) -> TheosResult<GovernorStatistics> {
        Ok(GovernorStatistics {
            sessions: self.sessions,
            cycles_completed: self.history.len(),
            energy: EnergySummary::from(&self.energy),
            ethics: EthicsSummary::from(&self.ethics),
            wisdom: self.wisdom.statistics()?,
        })
    }
}

impl std::fmt::Debug for Governor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Governor")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("history", &self.history.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TheosError;
    use crate::hypothesis::ReasoningMode;

    fn fixed(
        mode: ReasoningMode,
        text: &'static str,
        confidence: f64,
    ) -> Box<dyn HypothesisGenerator> {
        Box::new(move |_q: &str, cycle: u32, _w: &[WisdomRecord]| {
            HypothesisOutput::new(mode, text, confidence, "fixed", cycle)
                .map_err(|e| GenerationError::new(mode, cycle, e.to_string()))
        })
    }

    fn governor(config: GovernorConfig, l: &'static str, r: &'static str) -> Governor {
        Governor::new(
            config,
            Arc::new(WisdomStore::in_memory()),
            fixed(ReasoningMode::Constructive, l, 0.6),
            fixed(ReasoningMode::Critical, r, 0.6),
        )
        .unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        let config = GovernorConfig {
            max_cycles: 0,
            ..Default::default()
        };
        let err = Governor::with_templates(config, Arc::new(WisdomStore::in_memory())).unwrap_err();
        assert!(matches!(err, TheosError::Config(_)));
    }

    #[test]
    fn rejects_empty_query_and_bad_override() {
        let mut gov = governor(GovernorConfig::default(), "a", "b");
        assert!(matches!(
            gov.reason("   ", "d", None).unwrap_err(),
            TheosError::Validation(ValidationError::EmptyQuery)
        ));
        assert!(matches!(
            gov.reason("q", "d", Some(0)).unwrap_err(),
            TheosError::Validation(ValidationError::InvalidCycleOverride { requested: 0, .. })
        ));
        assert_eq!(gov.wisdom().count().unwrap(), 0);
    }

    #[test]
    fn max_cycles_scenario() {
        let config = GovernorConfig {
            max_cycles: 2,
            ..Default::default()
        };
        let mut gov = governor(config, "alpha beta", "gamma delta");
        let result = gov.reason("will it work", "test", None).unwrap();
        assert_eq!(result.cycles_used, 2);
        assert!(!gov.history()[0].verdict.is_stop());
        assert_eq!(result.stop_reason(), StopReason::MaxCyclesReached);
        assert_eq!(result.status, SessionStatus::Completed);
        assert_eq!(gov.momentary_past().cycle, 2);
    }

    #[test]
    fn override_replaces_configured_limit() {
        let mut gov = governor(GovernorConfig::default(), "alpha beta", "gamma delta");
        let result = gov.reason("will it work", "test", Some(1)).unwrap();
        assert_eq!(result.cycles_used, 1);
        assert_eq!(result.stop_reason(), StopReason::MaxCyclesReached);
    }

    #[test]
    fn completed_session_appends_one_learned_record() {
        let mut gov = governor(GovernorConfig::default(), "same answer", "same answer");
        let result = gov.reason("what now", "ops", None).unwrap();
        assert_eq!(result.stop_reason(), StopReason::ConvergenceAchieved);
        assert_eq!(result.output.kind(), "converged");

        let stored = gov.wisdom().export_all().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, WisdomKind::Learned);
        assert_eq!(stored[0].query, "what now");
        assert_eq!(stored[0].resolution, "same answer");
        assert_eq!(stored[0].domain, "ops");
        assert_eq!(stored[0].cost_units, 1900);
        assert_eq!(result.audit.wisdom.learned, 1);
    }

    #[test]
    fn ledger_debits_match_evaluations() {
        let config = GovernorConfig::default();
        let mut expected =
            ContradictionBudget::new(config.initial_budget, config.budget_decay_rate).unwrap();
        let mut gov = governor(config, "alpha beta", "gamma delta");
        let result = gov.reason("will it work", "test", None).unwrap();
        assert!(result.cycles_used > 1);

        for cycle in &result.audit.cycles {
            let debit = expected.spend(cycle.contradiction);
            assert_eq!(debit.spent, cycle.spent);
            assert_eq!(debit.remaining, cycle.remaining_budget);
        }
        assert_eq!(result.audit.budget_remaining, expected.remaining());
        let spent: f64 = result.audit.cycles.iter().map(|c| c.spent).sum();
        assert!((result.audit.budget_consumed - spent).abs() < 1e-12);
        let costs: Vec<u64> = result.audit.cycles.iter().map(|c| c.energy_cost).collect();
        assert_eq!(result.audit.energy.per_cycle, costs);
    }

    #[test]
    fn parallel_matches_sequential() {
        let sequential = governor(GovernorConfig::default(), "alpha beta", "alpha gamma")
            .reason("q", "d", None)
            .unwrap();
        let config = GovernorConfig {
            parallel_generation: true,
            ..Default::default()
        };
        let parallel = governor(config, "alpha beta", "alpha gamma")
            .reason("q", "d", None)
            .unwrap();
        assert_eq!(sequential.audit.cycles, parallel.audit.cycles);
        assert_eq!(sequential.output, parallel.output);
    }

    #[test]
    fn statistics_track_sessions() {
        let mut gov = governor(GovernorConfig::default(), "x y", "x y");
        gov.reason("one", "d", None).unwrap();
        gov.reason("two", "d", None).unwrap();
        let stats = gov.statistics().unwrap();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.energy.wisdom_misses, 2);
        assert_eq!(stats.ethics.cycles_observed, 2);
        assert_eq!(stats.wisdom.total, 2);
    }
}
