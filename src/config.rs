//! Governor configuration, persisted as TOML.
//!
//! Every field has a serde default so a partial file only overrides what it
//! names. Validation runs once, when a [`Governor`](crate::governor::Governor)
//! is constructed or a file is loaded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Flat configuration for the halting machine, budget, wisdom use, energy
/// pricing, and output blending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Stop with `ConvergenceAchieved` once similarity reaches this.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Stop with `RiskThresholdExceeded` once damped risk exceeds this.
    #[serde(default = "default_risk_threshold")]
    pub risk_threshold: f64,
    /// Minimum composite-quality gain per cycle before a plateau is declared.
    #[serde(default = "default_quality_improvement_threshold")]
    pub quality_improvement_threshold: f64,
    /// Entropy proxy `1/(1+n)` must fall below this for irreducible uncertainty.
    #[serde(default = "default_uncertainty_entropy_threshold")]
    pub uncertainty_entropy_threshold: f64,
    /// Contradiction must stay above this for irreducible uncertainty.
    #[serde(default = "default_uncertainty_contradiction_floor")]
    pub uncertainty_contradiction_floor: f64,

    #[serde(default = "default_initial_budget")]
    pub initial_budget: f64,
    /// Budget spent per cycle is `contradiction * budget_decay_rate`.
    #[serde(default = "default_budget_decay_rate")]
    pub budget_decay_rate: f64,

    #[serde(default = "default_min_cycles")]
    pub min_cycles: u32,
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Minimum query similarity for a stored record to count as relevant.
    #[serde(default = "default_wisdom_similarity_threshold")]
    pub wisdom_similarity_threshold: f64,
    /// Multiplier on mean stored confidence that damps risk.
    #[serde(default = "default_wisdom_influence_weight")]
    pub wisdom_influence_weight: f64,
    /// Top record confidence must exceed this to skip the cycle loop.
    #[serde(default = "default_early_exit_confidence")]
    pub early_exit_confidence: f64,

    /// Abstract cost units for one single-generator cycle.
    #[serde(default = "default_base_cost")]
    pub base_cost: u64,
    #[serde(default = "default_dual_generator_multiplier")]
    pub dual_generator_multiplier: f64,

    /// A critical output below this confidence counts as evasion.
    #[serde(default = "default_evasion_confidence_floor")]
    pub evasion_confidence_floor: f64,

    /// Final contradiction below this yields a converged answer.
    #[serde(default = "default_converged_threshold")]
    pub converged_threshold: f64,
    /// Final contradiction below this (and above `converged_threshold`) is blended.
    #[serde(default = "default_partial_threshold")]
    pub partial_threshold: f64,
    /// Final contradiction at or above this is reported unresolved.
    #[serde(default = "default_unresolved_threshold")]
    pub unresolved_threshold: f64,

    /// Run both generators concurrently. Only safe for side-effect-free generators.
    #[serde(default)]
    pub parallel_generation: bool,
}

fn default_similarity_threshold() -> f64 {
    0.85
}
fn default_risk_threshold() -> f64 {
    0.7
}
fn default_quality_improvement_threshold() -> f64 {
    0.01
}
fn default_uncertainty_entropy_threshold() -> f64 {
    0.1
}
fn default_uncertainty_contradiction_floor() -> f64 {
    0.3
}
fn default_initial_budget() -> f64 {
    1.0
}
fn default_budget_decay_rate() -> f64 {
    0.15
}
fn default_min_cycles() -> u32 {
    1
}
fn default_max_cycles() -> u32 {
    7
}
fn default_wisdom_similarity_threshold() -> f64 {
    0.7
}
fn default_wisdom_influence_weight() -> f64 {
    0.3
}
fn default_early_exit_confidence() -> f64 {
    0.9
}
fn default_base_cost() -> u64 {
    1000
}
fn default_dual_generator_multiplier() -> f64 {
    1.9
}
fn default_evasion_confidence_floor() -> f64 {
    0.5
}
fn default_converged_threshold() -> f64 {
    0.01
}
fn default_partial_threshold() -> f64 {
    0.3
}
fn default_unresolved_threshold() -> f64 {
    0.3
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            risk_threshold: default_risk_threshold(),
            quality_improvement_threshold: default_quality_improvement_threshold(),
            uncertainty_entropy_threshold: default_uncertainty_entropy_threshold(),
            uncertainty_contradiction_floor: default_uncertainty_contradiction_floor(),
            initial_budget: default_initial_budget(),
            budget_decay_rate: default_budget_decay_rate(),
            min_cycles: default_min_cycles(),
            max_cycles: default_max_cycles(),
            wisdom_similarity_threshold: default_wisdom_similarity_threshold(),
            wisdom_influence_weight: default_wisdom_influence_weight(),
            early_exit_confidence: default_early_exit_confidence(),
            base_cost: default_base_cost(),
            dual_generator_multiplier: default_dual_generator_multiplier(),
            evasion_confidence_floor: default_evasion_confidence_floor(),
            converged_threshold: default_converged_threshold(),
            partial_threshold: default_partial_threshold(),
            unresolved_threshold: default_unresolved_threshold(),
            parallel_generation: false,
        }
    }
}

impl GovernorConfig {
    /// Check every numeric bound. Called once at governor construction.
    pub fn validate(&self) -> ConfigResult<()> {
        let unit_fields = [
            ("similarity_threshold", self.similarity_threshold),
            ("risk_threshold", self.risk_threshold),
            ("quality_improvement_threshold", self.quality_improvement_threshold),
            ("uncertainty_entropy_threshold", self.uncertainty_entropy_threshold),
            ("uncertainty_contradiction_floor", self.uncertainty_contradiction_floor),
            ("wisdom_similarity_threshold", self.wisdom_similarity_threshold),
            ("wisdom_influence_weight", self.wisdom_influence_weight),
            ("early_exit_confidence", self.early_exit_confidence),
            ("evasion_confidence_floor", self.evasion_confidence_floor),
            ("converged_threshold", self.converged_threshold),
            ("partial_threshold", self.partial_threshold),
            ("unresolved_threshold", self.unresolved_threshold),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(format!("{name} must be in [0,1], got {value}")));
            }
        }

        if self.min_cycles == 0 {
            return Err(invalid("min_cycles must be >= 1".into()));
        }
        if self.max_cycles < self.min_cycles {
            return Err(invalid(format!(
                "max_cycles ({}) must be >= min_cycles ({})",
                self.max_cycles, self.min_cycles
            )));
        }
        if !self.initial_budget.is_finite() || self.initial_budget < 0.0 {
            return Err(invalid(format!(
                "initial_budget must be finite and >= 0, got {}",
                self.initial_budget
            )));
        }
        if !self.budget_decay_rate.is_finite() || self.budget_decay_rate < 0.0 {
            return Err(invalid(format!(
                "budget_decay_rate must be finite and >= 0, got {}",
                self.budget_decay_rate
            )));
        }
        if self.base_cost == 0 {
            return Err(invalid("base_cost must be > 0".into()));
        }
        if !self.dual_generator_multiplier.is_finite() || self.dual_generator_multiplier <= 0.0 {
            return Err(invalid(format!(
                "dual_generator_multiplier must be finite and > 0, got {}",
                self.dual_generator_multiplier
            )));
        }
        if self.partial_threshold == 0.0 {
            return Err(invalid("partial_threshold must be > 0 (it divides blend weights)".into()));
        }
        if !(self.converged_threshold <= self.partial_threshold
            && self.partial_threshold <= self.unresolved_threshold)
        {
            return Err(invalid(format!(
                "blending thresholds must satisfy converged ({}) <= partial ({}) <= unresolved ({})",
                self.converged_threshold, self.partial_threshold, self.unresolved_threshold
            )));
        }
        Ok(())
    }

    /// Load and validate a config from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid { message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = GovernorConfig::default();
        config.validate().unwrap();
        assert_eq!(config.similarity_threshold, 0.85);
        assert_eq!(config.max_cycles, 7);
        assert_eq!(config.initial_budget, 1.0);
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let config = GovernorConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn nan_threshold_is_rejected() {
        let config = GovernorConfig {
            risk_threshold: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn max_below_min_is_rejected() {
        let config = GovernorConfig {
            min_cycles: 5,
            max_cycles: 3,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_cycles"));
    }

    #[test]
    fn negative_budget_is_rejected() {
        let config = GovernorConfig {
            initial_budget: -0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unordered_blending_thresholds_are_rejected() {
        let config = GovernorConfig {
            converged_threshold: 0.5,
            partial_threshold: 0.3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config: GovernorConfig =
            toml::from_str("max_cycles = 3\nrisk_threshold = 0.5\n").unwrap();
        assert_eq!(config.max_cycles, 3);
        assert_eq!(config.risk_threshold, 0.5);
        assert_eq!(config.similarity_threshold, 0.85);
        assert!(!config.parallel_generation);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("governor.toml");
        let config = GovernorConfig {
            max_cycles: 4,
            parallel_generation: true,
            ..Default::default()
        };
        config.save(&path).unwrap();
        assert_eq!(GovernorConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("governor.toml");
        std::fs::write(&path, "similarity_threshold = 2.0\n").unwrap();
        assert!(matches!(
            GovernorConfig::load(&path),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
