//! Rich diagnostic error types for the THEOS governor.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so callers know exactly
//! which precondition was rejected and what to change.

use miette::Diagnostic;
use thiserror::Error;

use crate::hypothesis::ReasoningMode;

/// Top-level error type for the governor.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TheosError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),
}

// ---------------------------------------------------------------------------
// Validation errors (invalid arguments at the boundary)
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ValidationError {
    #[error("hypothesis text must not be empty")]
    #[diagnostic(
        code(theos::validation::empty_text),
        help("Generators must return a non-empty answer for every cycle.")
    )]
    EmptyText,

    #[error("{field} must be in [0, 1], got {value}")]
    #[diagnostic(
        code(theos::validation::out_of_range),
        help("Confidence-like values are probabilities. Clamp them before constructing the value.")
    )]
    OutOfUnitRange { field: &'static str, value: f64 },

    #[error("reasoning depth must be >= 1, got {depth}")]
    #[diagnostic(
        code(theos::validation::depth),
        help("Depth counts reasoning steps; a generator that produced an answer used at least one.")
    )]
    InvalidDepth { depth: u32 },

    #[error("contradiction budget must be a finite, non-negative number, got {value}")]
    #[diagnostic(
        code(theos::validation::budget),
        help(
            "Budgets may become negative while a session runs, but the budget handed to \
             a cycle evaluation must start at or above zero."
        )
    )]
    InvalidBudget { value: f64 },

    #[error("cycle number must be >= 1, got {cycle}")]
    #[diagnostic(
        code(theos::validation::cycle_number),
        help("Cycles are numbered from 1.")
    )]
    InvalidCycleNumber { cycle: u32 },

    #[error("max cycles override {requested} is outside [{min}, ..]")]
    #[diagnostic(
        code(theos::validation::max_cycles_override),
        help("The override must be at least `min_cycles` from the governor configuration.")
    )]
    InvalidCycleOverride { requested: u32, min: u32 },

    #[error("query must not be empty")]
    #[diagnostic(
        code(theos::validation::empty_query),
        help("Pass the question to reason about; whitespace-only input carries no tokens.")
    )]
    EmptyQuery,

    #[error("{mode} hypothesis supplied where a {expected} one was expected")]
    #[diagnostic(
        code(theos::validation::mode_mismatch),
        help("Pass the constructive output first and the critical output second.")
    )]
    ModeMismatch {
        mode: ReasoningMode,
        expected: ReasoningMode,
    },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(theos::config::invalid),
        help("Check the GovernorConfig fields. {message}")
    )]
    Invalid { message: String },

    #[error("failed to read governor config: {path}")]
    #[diagnostic(
        code(theos::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse governor config: {path}: {message}")]
    #[diagnostic(
        code(theos::config::parse),
        help("Check the TOML syntax. Unknown keys are ignored; missing keys take defaults.")
    )]
    Parse { path: String, message: String },

    #[error("failed to write governor config: {path}")]
    #[diagnostic(
        code(theos::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Generation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
#[error("{mode} generator failed at cycle {cycle}: {message}")]
#[diagnostic(
    code(theos::generation::failed),
    help(
        "The hypothesis generator could not produce an output, so the session was aborted \
         without recording the cycle. Retry policy belongs to the generator."
    )
)]
pub struct GenerationError {
    pub mode: ReasoningMode,
    pub cycle: u32,
    pub message: String,
}

impl GenerationError {
    pub fn new(mode: ReasoningMode, cycle: u32, message: impl Into<String>) -> Self {
        Self {
            mode,
            cycle,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(theos::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(theos::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption. Export what can be read and rebuild the store."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(theos::store::serde),
        help(
            "Failed to serialize or deserialize a wisdom record. \
             This usually means the stored format changed between versions."
        )
    )]
    Serialization { message: String },

    #[error("corrupt wisdom file {path} at line {line}: {message}")]
    #[diagnostic(
        code(theos::store::corrupt),
        help("Each line of the flat wisdom file must be one JSON-encoded record.")
    )]
    Corrupt {
        path: String,
        line: usize,
        message: String,
    },

    #[error("vector index error: {message}")]
    #[diagnostic(
        code(theos::store::vector_index),
        help("The HNSW approximate nearest-neighbor index encountered an internal error.")
    )]
    VectorIndex { message: String },

    #[error("migration to {tier} lost records: exported {expected}, imported {actual}")]
    #[diagnostic(
        code(theos::store::migration_mismatch),
        help(
            "The new tier did not confirm every record, so the previous tier stays active. \
             Inspect the staging files in the data directory."
        )
    )]
    MigrationMismatch {
        tier: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid wisdom record: {message}")]
    #[diagnostic(
        code(theos::store::invalid_record),
        help("Confidence, contradiction level, and ethical alignment must all lie in [0, 1].")
    )]
    InvalidRecord { message: String },

    #[error("wisdom store lock poisoned")]
    #[diagnostic(
        code(theos::store::poisoned),
        help("A thread panicked while holding the wisdom store lock. Reopen the store.")
    )]
    Poisoned,
}

impl From<std::io::Error> for StoreError {
    fn from(source: std::io::Error) -> Self {
        StoreError::Io { source }
    }
}

/// Convenience alias for functions returning governor results.
pub type TheosResult<T> = std::result::Result<T, TheosError>;

/// Result alias for argument validation.
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
