//! Hypothesis outputs and the generator collaborator interface.
//!
//! Two generators feed every cycle: a constructive one that builds the
//! strongest answer it can, and a critical one that tries to break it. The
//! governor treats both as opaque producers of [`HypothesisOutput`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GenerationError, ValidationError, ValidationResult};
use crate::wisdom::WisdomRecord;

/// Which side of the debate an output argues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    Constructive,
    Critical,
}

impl fmt::Display for ReasoningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReasoningMode::Constructive => write!(f, "constructive"),
            ReasoningMode::Critical => write!(f, "critical"),
        }
    }
}

/// One generator's answer for one cycle.
///
/// Fields are private so the invariants checked in [`HypothesisOutput::new`]
/// hold for every value in circulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HypothesisOutput {
    mode: ReasoningMode,
    text: String,
    confidence: f64,
    rationale: String,
    depth: u32,
}

impl HypothesisOutput {
    /// Build a validated output.
    ///
    /// Fails when `text` is empty, `confidence` is outside `[0, 1]` (or not
    /// finite), or `depth` is zero.
    pub fn new(
        mode: ReasoningMode,
        text: impl Into<String>,
        confidence: f64,
        rationale: impl Into<String>,
        depth: u32,
    ) -> ValidationResult<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(ValidationError::EmptyText);
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ValidationError::OutOfUnitRange {
                field: "confidence",
                value: confidence,
            });
        }
        if depth < 1 {
            return Err(ValidationError::InvalidDepth { depth });
        }
        Ok(Self {
            mode,
            text,
            confidence,
            rationale: rationale.into(),
            depth,
        })
    }

    pub fn mode(&self) -> ReasoningMode {
        self.mode
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// The generator's own explanation of how it got to `text`.
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// The excluded collaborator: anything that can answer a query for a cycle.
///
/// Implementations may block (e.g. a remote model call). Failures abort the
/// current session; the governor never retries.
pub trait HypothesisGenerator: Send + Sync {
    fn generate(
        &self,
        query: &str,
        cycle: u32,
        prior_wisdom: &[WisdomRecord],
    ) -> Result<HypothesisOutput, GenerationError>;
}

impl<F> HypothesisGenerator for F
where
    F: Fn(&str, u32, &[WisdomRecord]) -> Result<HypothesisOutput, GenerationError> + Send + Sync,
{
    fn generate(
        &self,
        query: &str,
        cycle: u32,
        prior_wisdom: &[WisdomRecord],
    ) -> Result<HypothesisOutput, GenerationError> {
        self(query, cycle, prior_wisdom)
    }
}

/// Deterministic stand-in generator used by the CLI and demos.
///
/// Produces a fixed framing of the query, informed by how many wisdom
/// records were retrieved. Confidence rises by 0.1 per record and depth
/// tracks the cycle number.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    mode: ReasoningMode,
    base_confidence: f64,
}

impl TemplateGenerator {
    pub fn constructive() -> Self {
        Self {
            mode: ReasoningMode::Constructive,
            base_confidence: 0.7,
        }
    }

    pub fn critical() -> Self {
        Self {
            mode: ReasoningMode::Critical,
            base_confidence: 0.65,
        }
    }
}

impl HypothesisGenerator for TemplateGenerator {
    fn generate(
        &self,
        query: &str,
        cycle: u32,
        prior_wisdom: &[WisdomRecord],
    ) -> Result<HypothesisOutput, GenerationError> {
        let head: String = query.chars().take(30).collect();
        let n = prior_wisdom.len();

        let (text, rationale) = match self.mode {
            ReasoningMode::Constructive => {
                let mut rationale = format!(
                    "[constructive, cycle {cycle}] building the strongest answer."
                );
                if n > 0 {
                    let prior: Vec<&str> = prior_wisdom
                        .iter()
                        .take(2)
                        .map(|w| w.resolution.as_str())
                        .collect();
                    rationale.push_str(&format!(
                        " Based on {n} similar past queries: {}",
                        prior.join("; ")
                    ));
                }
                (
                    format!(
                        "Constructive approach to '{head}...': prioritize user autonomy and \
                         information provision. Informed by {n} wisdom records."
                    ),
                    rationale,
                )
            }
            ReasoningMode::Critical => {
                let mut rationale =
                    format!("[critical, cycle {cycle}] stress-testing the constructive answer.");
                if n > 0 {
                    let alignment = prior_wisdom
                        .iter()
                        .map(|w| w.ethical_alignment)
                        .sum::<f64>()
                        / n as f64;
                    rationale.push_str(&format!(" Wisdom alignment: {alignment:.2}."));
                }
                (
                    format!(
                        "Critical perspective on '{head}...': identify risks, constraints, and \
                         unintended consequences. Cross-checked against {n} wisdom records."
                    ),
                    rationale,
                )
            }
        };

        let confidence = (self.base_confidence + 0.1 * n as f64).min(1.0);
        HypothesisOutput::new(self.mode, text, confidence, rationale, cycle.max(1))
            .map_err(|e| GenerationError::new(self.mode, cycle, e.to_string()))
    }
}
