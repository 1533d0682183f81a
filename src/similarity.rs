//! Text agreement estimator.
//!
//! Bag-of-words Jaccard overlap remapped through a Gaussian kernel:
//! `S = exp(-β (1 - J)²)` with `β = 1`. This is a placeholder for a real
//! embedding distance; any replacement must keep the `[0, 1]` contract and
//! the symmetry of [`similarity`].
//!
//! The kernel never reaches zero for non-empty inputs: fully disjoint texts
//! score [`similarity_floor`] (`e⁻¹ ≈ 0.368`). That floor is almost certainly
//! unintended, but the halting thresholds were tuned against it, so it stays.

use std::collections::BTreeSet;

use unicode_normalization::UnicodeNormalization;

/// Kernel width.
const BETA: f64 = 1.0;

/// Similarity of two non-empty texts that share no token.
///
/// Computed through [`kernel`] so comparisons against it are bit-exact.
pub fn similarity_floor() -> f64 {
    kernel(0.0)
}

/// Case-folded whitespace tokens, NFC-normalized so canonically equal text
/// compares equal.
pub fn tokenize(text: &str) -> BTreeSet<String> {
    let normalized: String = text.nfc().collect();
    normalized
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect()
}

/// Jaccard overlap of two token sets; 0 when either is empty.
pub fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

/// Gaussian remap of a Jaccard score.
pub fn kernel(jaccard: f64) -> f64 {
    let distance = 1.0 - jaccard;
    (-BETA * distance * distance).exp().clamp(0.0, 1.0)
}

/// Similarity of two pre-tokenized texts.
pub fn token_similarity(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    kernel(jaccard(a, b))
}

/// Agreement between two texts in `[0, 1]`. Pure and symmetric.
pub fn similarity(a: &str, b: &str) -> f64 {
    token_similarity(&tokenize(a), &tokenize(b))
}
