//! Per-cycle scoring functions: risk, quality, contradiction tagging, and the
//! decay terms that feed the halting machine.
//!
//! All functions are pure. Inputs are validated [`HypothesisOutput`]s so no
//! range checks are repeated here.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::hypothesis::HypothesisOutput;

/// Weight of disagreement in the raw risk score; confidence gets the rest.
const DISAGREEMENT_WEIGHT: f64 = 0.6;
const CONFIDENCE_RISK_WEIGHT: f64 = 0.4;

/// Combined depth at which the depth sub-score saturates.
const DEPTH_SATURATION: f64 = 10.0;

/// Named quality sub-scores. A `BTreeMap` keeps iteration (and therefore the
/// composite mean) bit-for-bit deterministic.
pub type QualityMetrics = BTreeMap<String, f64>;

/// Kinds of disagreement detected between the two outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionType {
    /// Disagreement on facts.
    Factual,
    /// Disagreement on values.
    Normative,
    /// Disagreement on feasibility.
    Constraint,
    /// Disagreement on who is affected and how.
    Distributional,
}

const TYPE_KEYWORDS: [(ContradictionType, &[&str]); 4] = [
    (
        ContradictionType::Factual,
        &["fact", "evidence", "data", "true", "false"],
    ),
    (
        ContradictionType::Normative,
        &["value", "ethical", "moral", "should", "ought"],
    ),
    (
        ContradictionType::Constraint,
        &["feasible", "possible", "constraint", "limit"],
    ),
    (
        ContradictionType::Distributional,
        &["impact", "distribution", "affect", "benefit"],
    ),
];

/// Raw risk before wisdom damping.
///
/// `0.6 · (1 - similarity) + 0.4 · mean(1 - confidence)`, clamped to `[0, 1]`.
pub fn risk(a: &HypothesisOutput, b: &HypothesisOutput, similarity: f64) -> f64 {
    let disagreement = 1.0 - similarity;
    let confidence_risk = ((1.0 - a.confidence()) + (1.0 - b.confidence())) / 2.0;
    (DISAGREEMENT_WEIGHT * disagreement + CONFIDENCE_RISK_WEIGHT * confidence_risk).clamp(0.0, 1.0)
}

/// Influence of accumulated wisdom on risk: `mean stored confidence × weight`,
/// clamped. `None` (empty store) means no influence.
pub fn wisdom_influence(mean_confidence: Option<f64>, weight: f64) -> f64 {
    match mean_confidence {
        Some(mean) => (mean * weight).clamp(0.0, 1.0),
        None => 0.0,
    }
}

/// Risk after damping by wisdom influence.
pub fn damp_risk(risk: f64, influence: f64) -> f64 {
    risk * (1.0 - influence)
}

/// Quality sub-scores for a cycle.
///
/// `convergence` is always exactly `similarity`.
pub fn quality_metrics(
    a: &HypothesisOutput,
    b: &HypothesisOutput,
    similarity: f64,
) -> QualityMetrics {
    let mean_confidence = (a.confidence() + b.confidence()) / 2.0;
    let depth = (f64::from(a.depth()) + f64::from(b.depth())) / DEPTH_SATURATION;

    let mut metrics = QualityMetrics::new();
    metrics.insert("coherence".into(), mean_confidence);
    metrics.insert("confidence".into(), mean_confidence);
    metrics.insert("convergence".into(), similarity);
    metrics.insert("depth".into(), depth.clamp(0.0, 1.0));
    metrics
}

/// Unweighted mean of the sub-scores; 0 for an empty map.
pub fn composite_quality(metrics: &QualityMetrics) -> f64 {
    if metrics.is_empty() {
        return 0.0;
    }
    metrics.values().sum::<f64>() / metrics.len() as f64
}

/// Keyword heuristic over both texts. Never empty: defaults to `Factual`.
pub fn classify_contradictions(
    a: &HypothesisOutput,
    b: &HypothesisOutput,
) -> BTreeSet<ContradictionType> {
    let combined = format!("{}{}", a.text(), b.text()).to_lowercase();
    let mut types: BTreeSet<ContradictionType> = TYPE_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| combined.contains(w)))
        .map(|(kind, _)| *kind)
        .collect();
    if types.is_empty() {
        types.insert(ContradictionType::Factual);
    }
    types
}

/// Diminishing influence of the previous cycle: `1/(1+n)` once a previous
/// cycle exists, otherwise 0.
pub fn momentary_past_influence(cycle: u32, has_previous: bool) -> f64 {
    if cycle <= 1 || !has_previous {
        return 0.0;
    }
    1.0 / (1.0 + f64::from(cycle))
}

/// Synthetic hypothesis-space entropy: shrinks as cycles accumulate.
pub fn entropy_proxy(cycle: u32) -> f64 {
    1.0 / (1.0 + f64::from(cycle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypothesis::ReasoningMode;

    fn output(mode: ReasoningMode, text: &str, confidence: f64, depth: u32) -> HypothesisOutput {
        HypothesisOutput::new(mode, text, confidence, "", depth).unwrap()
    }

    #[test]
    fn risk_combines_disagreement_and_confidence() {
        let a = output(ReasoningMode::Constructive, "a", 0.8, 1);
        let b = output(ReasoningMode::Critical, "b", 0.6, 1);
        // 0.6 * 0.5 + 0.4 * 0.3
        assert!((risk(&a, &b, 0.5) - 0.42).abs() < 1e-12);
    }

    #[test]
    fn risk_high_under_disagreement() {
        let a = output(ReasoningMode::Constructive, "yes", 0.3, 1);
        let b = output(ReasoningMode::Critical, "no", 0.3, 1);
        assert!(risk(&a, &b, 0.0) > 0.5);
    }

    #[test]
    fn wisdom_damps_risk() {
        assert_eq!(wisdom_influence(None, 0.3), 0.0);
        let influence = wisdom_influence(Some(0.8), 0.3);
        assert!((influence - 0.24).abs() < 1e-12);
        assert!((damp_risk(0.5, influence) - 0.38).abs() < 1e-12);
        assert_eq!(wisdom_influence(Some(1.0), 5.0), 1.0);
    }

    #[test]
    fn quality_metrics_shape() {
        let a = output(ReasoningMode::Constructive, "a", 0.8, 3);
        let b = output(ReasoningMode::Critical, "b", 0.6, 4);
        let metrics = quality_metrics(&a, &b, 0.42);
        assert_eq!(metrics["convergence"], 0.42);
        assert!((metrics["coherence"] - 0.7).abs() < 1e-12);
        assert_eq!(metrics["coherence"], metrics["confidence"]);
        assert!((metrics["depth"] - 0.7).abs() < 1e-12);
        for value in metrics.values() {
            assert!((0.0..=1.0).contains(value));
        }
        let expected = (0.7 + 0.7 + 0.42 + 0.7) / 4.0;
        assert!((composite_quality(&metrics) - expected).abs() < 1e-12);
    }

    #[test]
    fn depth_saturates() {
        let a = output(ReasoningMode::Constructive, "a", 0.5, 9);
        let b = output(ReasoningMode::Critical, "b", 0.5, 9);
        assert_eq!(quality_metrics(&a, &b, 0.5)["depth"], 1.0);
    }

    #[test]
    fn contradiction_tags_default_to_factual() {
        let a = output(ReasoningMode::Constructive, "go left", 0.5, 1);
        let b = output(ReasoningMode::Critical, "go right", 0.5, 1);
        let tags = classify_contradictions(&a, &b);
        assert_eq!(tags.len(), 1);
        assert!(tags.contains(&ContradictionType::Factual));
    }

    #[test]
    fn contradiction_tags_follow_keywords() {
        let a = output(ReasoningMode::Constructive, "We should act", 0.5, 1);
        let b = output(ReasoningMode::Critical, "Budget limit and impact", 0.5, 1);
        let tags = classify_contradictions(&a, &b);
        assert!(tags.contains(&ContradictionType::Normative));
        assert!(tags.contains(&ContradictionType::Constraint));
        assert!(tags.contains(&ContradictionType::Distributional));
        assert!(!tags.contains(&ContradictionType::Factual));
    }

    #[test]
    fn momentary_influence_decays() {
        assert_eq!(momentary_past_influence(1, true), 0.0);
        assert_eq!(momentary_past_influence(3, false), 0.0);
        let two = momentary_past_influence(2, true);
        let three = momentary_past_influence(3, true);
        assert!(0.0 < two && two < 1.0);
        assert!(three < two);
    }

    #[test]
    fn entropy_shrinks() {
        assert_eq!(entropy_proxy(1), 0.5);
        assert!(entropy_proxy(10) < 0.1);
    }
}
