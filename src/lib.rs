//! # theos
//!
//! A dual-hypothesis reasoning governor. Two generators argue every query, one
//! constructive and one critical, and the governor decides cycle by cycle
//! whether they have converged, whether the disagreement has become too risky
//! to continue, or whether the contradiction budget or cycle limit is spent.
//! Resolved sessions are kept in a wisdom store that short-circuits repeat
//! questions and escalates its storage tier as it grows.
//!
//! ## Architecture
//!
//! - **Scoring** (`similarity`, `scoring`, `ethics`, `energy`, `budget`):
//!   pure per-cycle estimators
//! - **Halting** (`halting`, `evaluation`): ordered stop criteria over one
//!   immutable [`evaluation::CycleEvaluation`] per cycle
//! - **Wisdom store** (`wisdom`): flat file → redb index → HNSW vector tier
//! - **Governor** (`governor`): the cycle loop, output synthesis, and audit
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use theos::config::GovernorConfig;
//! use theos::governor::Governor;
//! use theos::wisdom::WisdomStore;
//!
//! let store = Arc::new(WisdomStore::open(".theos".as_ref()).unwrap());
//! let mut governor = Governor::with_templates(GovernorConfig::default(), store).unwrap();
//! let result = governor.reason("Should we ship on Friday?", "ops", None).unwrap();
//! println!("{} ({})", result.output.text(), result.stop_reason());
//! ```

pub mod audit;
pub mod budget;
pub mod config;
pub mod energy;
pub mod error;
pub mod ethics;
pub mod evaluation;
pub mod governor;
pub mod halting;
pub mod hypothesis;
pub mod output;
pub mod scoring;
pub mod similarity;
pub mod wisdom;
