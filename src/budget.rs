//! Contradiction budget ledger.
//!
//! Each cycle spends `contradiction × decay_rate`. The balance never grows
//! within a session and may go negative; reaching zero or below is a halting
//! trigger, not an error. Only the starting balance is validated.

use serde::{Deserialize, Serialize};

use crate::error::{ValidationError, ValidationResult};

/// Reject negative and non-finite starting balances.
pub fn validate_budget(value: f64) -> ValidationResult<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(ValidationError::InvalidBudget { value });
    }
    Ok(value)
}

/// Amount consumed by a cycle at the given contradiction level.
pub fn spend_amount(contradiction: f64, decay_rate: f64) -> f64 {
    contradiction * decay_rate
}

/// One debit against the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spend {
    pub spent: f64,
    pub remaining: f64,
}

/// Session-scoped budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContradictionBudget {
    initial: f64,
    remaining: f64,
    decay_rate: f64,
}

impl ContradictionBudget {
    pub fn new(initial: f64, decay_rate: f64) -> ValidationResult<Self> {
        let initial = validate_budget(initial)?;
        Ok(Self {
            initial,
            remaining: initial,
            decay_rate,
        })
    }

    /// Debit a cycle. Negative contradiction levels never refund.
    pub fn spend(&mut self, contradiction: f64) -> Spend {
        let spent = spend_amount(contradiction, self.decay_rate).max(0.0);
        self.remaining -= spent;
        Spend {
            spent,
            remaining: self.remaining,
        }
    }

    pub fn remaining(&self) -> f64 {
        self.remaining
    }

    pub fn initial(&self) -> f64 {
        self.initial
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_negative_and_non_finite() {
        for bad in [-0.01, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(ContradictionBudget::new(bad, 0.15).is_err());
        }
        assert!(ContradictionBudget::new(0.0, 0.15).is_ok());
    }

    #[test]
    fn spend_formula() {
        assert!((spend_amount(0.5, 0.15) - 0.075).abs() < 1e-12);
        let mut budget = ContradictionBudget::new(1.0, 0.15).unwrap();
        let s = budget.spend(0.5);
        assert!((s.spent - 0.075).abs() < 1e-12);
        assert!((s.remaining - 0.925).abs() < 1e-12);
        assert_eq!(budget.initial() - budget.remaining(), s.spent);
    }

    #[test]
    fn monotonic_and_may_go_negative() {
        let mut budget = ContradictionBudget::new(0.1, 1.0).unwrap();
        let mut last = budget.remaining();
        for _ in 0..5 {
            let s = budget.spend(0.4);
            assert!(s.remaining <= last);
            last = s.remaining;
        }
        assert!(budget.remaining() < 0.0);

    }

    #[test]
    fn negative_contradiction_never_refunds() {
        let mut budget = ContradictionBudget::new(0.5, 0.15).unwrap();
        let s = budget.spend(-1.0);
        assert_eq!(s.spent, 0.0);
        assert_eq!(budget.remaining(), 0.5);
    }
}
