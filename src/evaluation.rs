//! Per-cycle evaluation: composes similarity, risk, quality, ethics, energy,
//! and the budget ledger into one immutable [`CycleEvaluation`].
//!
//! [`evaluate`] is pure. The governor owns every piece of state it reads
//! (previous quality, momentary past, wisdom statistics) and passes it in,
//! so identical inputs always produce bit-identical evaluations.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::budget::{spend_amount, validate_budget};
use crate::config::GovernorConfig;
use crate::energy::cycle_cost;
use crate::error::{ValidationError, ValidationResult};
use crate::ethics;
use crate::halting::{self, HaltingInputs, StopReason, Verdict};
use crate::hypothesis::{HypothesisOutput, ReasoningMode};
use crate::scoring::{self, ContradictionType, QualityMetrics};
use crate::similarity::similarity;

/// The previous cycle, kept so decay terms can reference "last round"
/// without walking the history. One per session, overwritten every cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MomentaryPast {
    pub constructive: Option<String>,
    pub critical: Option<String>,
    pub contradiction: f64,
    pub cycle: u32,
}

impl MomentaryPast {
    pub fn has_previous(&self) -> bool {
        self.constructive.is_some()
    }

    /// Overwrite with the cycle that just committed.
    pub fn update(
        &mut self,
        constructive: &HypothesisOutput,
        critical: &HypothesisOutput,
        evaluation: &CycleEvaluation,
    ) {
        self.constructive = Some(constructive.text().to_string());
        self.critical = Some(critical.text().to_string());
        self.contradiction = evaluation.contradiction;
        self.cycle = evaluation.cycle;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything recorded about one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleEvaluation {
    pub cycle: u32,
    pub similarity: f64,
    /// `1 - similarity`.
    pub contradiction: f64,
    /// Never empty.
    pub contradiction_types: BTreeSet<ContradictionType>,
    /// Risk after wisdom damping.
    pub risk: f64,
    pub quality_metrics: QualityMetrics,
    pub composite_quality: f64,
    pub spent: f64,
    /// May be zero or negative.
    pub remaining_budget: f64,
    pub verdict: Verdict,
    pub rationale: String,
    pub wisdom_influence: f64,
    pub past_influence: f64,
    pub energy_cost: u64,
    pub ethical_score: f64,
    pub evasion: bool,
}

impl CycleEvaluation {
    pub fn is_stop(&self) -> bool {
        self.verdict.is_stop()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.verdict.stop_reason()
    }
}

/// Session state a cycle is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct CycleContext<'a> {
    pub cycle: u32,
    /// Budget before this cycle's spend. Must be finite and `>= 0`.
    pub budget: f64,
    /// Effective cycle limit for the session.
    pub max_cycles: u32,
    pub previous_quality: Option<f64>,
    /// Mean confidence across the wisdom store; `None` when it is empty.
    pub wisdom_mean_confidence: Option<f64>,
    pub momentary_past: &'a MomentaryPast,
}

/// Evaluate one cycle.
///
/// Rejects swapped modes, a negative or non-finite budget, and cycle 0 before
/// any scoring runs.
pub fn evaluate(
    config: &GovernorConfig,
    constructive: &HypothesisOutput,
    critical: &HypothesisOutput,
    ctx: &CycleContext<'_>,
) -> ValidationResult<CycleEvaluation> {
    check_mode(constructive, ReasoningMode::Constructive)?;
    check_mode(critical, ReasoningMode::Critical)?;
    let budget = validate_budget(ctx.budget)?;
    if ctx.cycle < 1 {
        return Err(ValidationError::InvalidCycleNumber { cycle: ctx.cycle });
    }

    let similarity = similarity(constructive.text(), critical.text());
    let contradiction = 1.0 - similarity;
    let contradiction_types = scoring::classify_contradictions(constructive, critical);

    let wisdom_influence =
        scoring::wisdom_influence(ctx.wisdom_mean_confidence, config.wisdom_influence_weight);
    let risk = scoring::damp_risk(
        scoring::risk(constructive, critical, similarity),
        wisdom_influence,
    );

    let quality_metrics = scoring::quality_metrics(constructive, critical, similarity);
    let composite_quality = scoring::composite_quality(&quality_metrics);

    let ethical = ethics::assess(
        constructive,
        critical,
        contradiction,
        config.evasion_confidence_floor,
    );
    let energy_cost = cycle_cost(config.base_cost, config.dual_generator_multiplier, ctx.cycle);

    let spent = spend_amount(contradiction, config.budget_decay_rate);
    let remaining_budget = budget - spent;

    let inputs = HaltingInputs {
        cycle: ctx.cycle,
        similarity,
        contradiction,
        risk,
        remaining_budget,
        composite_quality,
        previous_quality: ctx.previous_quality,
        ethical_score: ethical.score,
    };
    let verdict = halting::decide(config, ctx.max_cycles, &inputs);
    let rationale = halting::rationale(config, ctx.max_cycles, &inputs, verdict);

    Ok(CycleEvaluation {
        cycle: ctx.cycle,
        similarity,
        contradiction,
        contradiction_types,
        risk,
        quality_metrics,
        composite_quality,
        spent,
        remaining_budget,
        verdict,
        rationale,
        wisdom_influence,
        past_influence: scoring::momentary_past_influence(
            ctx.cycle,
            ctx.momentary_past.has_previous(),
        ),
        energy_cost,
        ethical_score: ethical.score,
        evasion: ethical.evasion,
    })
}

fn check_mode(output: &HypothesisOutput, expected: ReasoningMode) -> ValidationResult<()> {
    if output.mode() != expected {
        return Err(ValidationError::ModeMismatch {
            mode: output.mode(),
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constructive(text: &str, confidence: f64, depth: u32) -> HypothesisOutput {
        HypothesisOutput::new(ReasoningMode::Constructive, text, confidence, "", depth).unwrap()
    }

    fn critical(text: &str, confidence: f64, depth: u32) -> HypothesisOutput {
        HypothesisOutput::new(ReasoningMode::Critical, text, confidence, "", depth).unwrap()
    }

    fn ctx(past: &MomentaryPast, cycle: u32, budget: f64) -> CycleContext<'_> {
        CycleContext {
            cycle,
            budget,
            max_cycles: 7,
            previous_quality: None,
            wisdom_mean_confidence: None,
            momentary_past: past,
        }
    }

    #[test]
    fn identical_answers_converge() {
        let config = GovernorConfig {
            similarity_threshold: 0.5,
            ..Default::default()
        };
        let past = MomentaryPast::default();
        let eval = evaluate(
            &config,
            &constructive("The answer is yes", 0.9, 1),
            &critical("The answer is yes", 0.9, 1),
            &ctx(&past, 1, 1.0),
        )
        .unwrap();
        assert!(eval.similarity >= 0.99);
        assert!(eval.is_stop());
        assert_eq!(eval.stop_reason(), Some(StopReason::ConvergenceAchieved));
        assert_eq!(eval.contradiction, 0.0);
        assert_eq!(eval.spent, 0.0);
    }

    #[test]
    fn convergence_wins_over_risk_for_agreeing_low_confidence() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let eval = evaluate(
            &config,
            &constructive("maybe it rains", 0.0, 1),
            &critical("maybe it rains", 0.0, 1),
            &ctx(&past, 1, 1.0),
        )
        .unwrap();
        // Raw risk is 0.4 * 1.0 here; push it over with a strict threshold.
        let strict = GovernorConfig {
            risk_threshold: 0.1,
            ..config
        };
        let strict_eval = evaluate(
            &strict,
            &constructive("maybe it rains", 0.0, 1),
            &critical("maybe it rains", 0.0, 1),
            &ctx(&past, 1, 1.0),
        )
        .unwrap();
        assert!(strict_eval.risk > strict.risk_threshold);
        assert_eq!(strict_eval.stop_reason(), Some(StopReason::ConvergenceAchieved));
        assert_eq!(eval.stop_reason(), Some(StopReason::ConvergenceAchieved));
    }

    #[test]
    fn budget_is_debited() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let eval = evaluate(
            &config,
            &constructive("alpha beta", 0.8, 1),
            &critical("gamma delta", 0.8, 1),
            &ctx(&past, 1, 1.0),
        )
        .unwrap();
        let expected_spent = (1.0 - eval.similarity) * 0.15;
        assert!((eval.spent - expected_spent).abs() < 1e-12);
        assert!((eval.remaining_budget - (1.0 - expected_spent)).abs() < 1e-12);
        assert_eq!(eval.verdict, Verdict::Continue);
        assert!(eval.rationale.contains("Continuing"));
    }

    #[test]
    fn small_budget_exhausts() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let eval = evaluate(
            &config,
            &constructive("alpha beta", 0.8, 1),
            &critical("gamma delta", 0.8, 1),
            &ctx(&past, 1, 0.05),
        )
        .unwrap();
        assert!(eval.remaining_budget <= 0.0);
        assert_eq!(eval.stop_reason(), Some(StopReason::ContradictionExhausted));
    }

    #[test]
    fn invalid_arguments_fail_fast() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let l = constructive("a", 0.5, 1);
        let r = critical("b", 0.5, 1);

        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let err = evaluate(&config, &l, &r, &ctx(&past, 1, bad)).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidBudget { .. }));
        }
        let err = evaluate(&config, &l, &r, &ctx(&past, 0, 1.0)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidCycleNumber { cycle: 0 }));
        let err = evaluate(&config, &r, &l, &ctx(&past, 1, 1.0)).unwrap_err();
        assert!(matches!(err, ValidationError::ModeMismatch { .. }));
    }

    #[test]
    fn wisdom_damps_risk() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let l = constructive("alpha beta", 0.6, 1);
        let r = critical("gamma delta", 0.6, 1);
        let bare = evaluate(&config, &l, &r, &ctx(&past, 1, 1.0)).unwrap();
        let informed = evaluate(
            &config,
            &l,
            &r,
            &CycleContext {
                wisdom_mean_confidence: Some(0.9),
                ..ctx(&past, 1, 1.0)
            },
        )
        .unwrap();
        assert_eq!(bare.wisdom_influence, 0.0);
        assert!((informed.wisdom_influence - 0.27).abs() < 1e-12);
        assert!((informed.risk - bare.risk * 0.73).abs() < 1e-12);
    }

    #[test]
    fn deterministic() {
        let config = GovernorConfig::default();
        let past = MomentaryPast::default();
        let l = constructive("we should expand the program", 0.72, 2);
        let r = critical("the data suggests a limit on impact", 0.61, 2);
        let c = CycleContext {
            previous_quality: Some(0.4),
            wisdom_mean_confidence: Some(0.77),
            ..ctx(&past, 2, 0.9)
        };
        let first = evaluate(&config, &l, &r, &c).unwrap();
        for _ in 0..100 {
            let again = evaluate(&config, &l, &r, &c).unwrap();
            assert_eq!(again.similarity.to_bits(), first.similarity.to_bits());
            assert_eq!(again.risk.to_bits(), first.risk.to_bits());
            assert_eq!(again.composite_quality.to_bits(), first.composite_quality.to_bits());
            assert_eq!(again, first);
        }
    }

    #[test]
    fn momentary_past_tracks_last_cycle() {
        let config = GovernorConfig::default();
        let mut past = MomentaryPast::default();
        let l = constructive("alpha", 0.7, 1);
        let r = critical("beta", 0.7, 1);
        let first = evaluate(&config, &l, &r, &ctx(&past, 1, 1.0)).unwrap();
        assert_eq!(first.past_influence, 0.0);
        past.update(&l, &r, &first);
        assert!(past.has_previous());
        assert_eq!(past.cycle, 1);

        let second = evaluate(&config, &l, &r, &ctx(&past, 2, first.remaining_budget)).unwrap();
        assert!((second.past_influence - 1.0 / 3.0).abs() < 1e-12);

        past.reset();
        assert!(!past.has_previous());
    }
}
