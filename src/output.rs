//! Final output synthesis.
//!
//! The final contradiction level `Φ` picks the shape:
//!
//! | `Φ` | output |
//! |---|---|
//! | `< converged_threshold` | the constructive text alone |
//! | `< unresolved_threshold` | weighted blend of both texts |
//! | otherwise | both texts side by side, no synthesis |
//!
//! Blend weights are `w_c = (1 - Φ/ε₂)/2` and `w_r = (1 + Φ/ε₂)/2` with
//! `ε₂ = partial_threshold`, clamped to `[0, 1]` for `Φ` between the partial
//! and unresolved thresholds.

use serde::{Deserialize, Serialize};

use crate::config::GovernorConfig;
use crate::evaluation::CycleEvaluation;
use crate::hypothesis::HypothesisOutput;

/// Confidence discount applied to a blend.
const BLENDED_DISCOUNT: f64 = 0.8;
/// Confidence discount applied when nothing could be synthesized.
const UNRESOLVED_DISCOUNT: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutput {
    Converged {
        text: String,
        confidence: f64,
        contradiction: f64,
    },
    Blended {
        text: String,
        constructive_weight: f64,
        critical_weight: f64,
        confidence: f64,
        contradiction: f64,
    },
    Unresolved {
        constructive: String,
        critical: String,
        contradiction: f64,
        confidence: f64,
    },
    /// Answered straight from the wisdom store.
    Recalled {
        text: String,
        confidence: f64,
        similarity: f64,
    },
}

impl SessionOutput {
    pub fn confidence(&self) -> f64 {
        match self {
            SessionOutput::Converged { confidence, .. }
            | SessionOutput::Blended { confidence, .. }
            | SessionOutput::Unresolved { confidence, .. }
            | SessionOutput::Recalled { confidence, .. } => *confidence,
        }
    }

    /// The output rendered as one string.
    pub fn text(&self) -> String {
        match self {
            SessionOutput::Converged { text, .. }
            | SessionOutput::Blended { text, .. }
            | SessionOutput::Recalled { text, .. } => text.clone(),
            SessionOutput::Unresolved {
                constructive,
                critical,
                contradiction,
                ..
            } => format!(
                "Unresolved (contradiction {contradiction:.2})\n\
                 Constructive: {constructive}\n\
                 Critical: {critical}"
            ),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionOutput::Converged { .. } => "converged",
            SessionOutput::Blended { .. } => "blended",
            SessionOutput::Unresolved { .. } => "unresolved",
            SessionOutput::Recalled { .. } => "recalled",
        }
    }
}

/// `(constructive, critical)` blend weights for contradiction `phi`.
pub fn blend_weights(phi: f64, partial_threshold: f64) -> (f64, f64) {
    let ratio = phi / partial_threshold;
    (
        ((1.0 - ratio) / 2.0).clamp(0.0, 1.0),
        ((1.0 + ratio) / 2.0).clamp(0.0, 1.0),
    )
}

pub fn blend(constructive: &str, critical: &str, weights: (f64, f64)) -> String {
    format!(
        "[{:.1}% Constructive] {constructive}\n[{:.1}% Critical] {critical}",
        weights.0 * 100.0,
        weights.1 * 100.0
    )
}

/// Build the session output from the last cycle.
pub fn synthesize(
    config: &GovernorConfig,
    constructive: &HypothesisOutput,
    critical: &HypothesisOutput,
    last: &CycleEvaluation,
) -> SessionOutput {
    let phi = last.contradiction;
    let quality = last.composite_quality;

    if phi < config.converged_threshold {
        SessionOutput::Converged {
            text: constructive.text().to_string(),
            confidence: quality,
            contradiction: phi,
        }
    } else if phi < config.partial_threshold.max(config.unresolved_threshold) {
        let weights = blend_weights(phi, config.partial_threshold);
        SessionOutput::Blended {
            text: blend(constructive.text(), critical.text(), weights),
            constructive_weight: weights.0,
            critical_weight: weights.1,
            confidence: quality * BLENDED_DISCOUNT,
            contradiction: phi,
        }
    } else {
        SessionOutput::Unresolved {
            constructive: constructive.text().to_string(),
            critical: critical.text().to_string(),
            contradiction: phi,
            confidence: quality * UNRESOLVED_DISCOUNT,
        }
    }
}
