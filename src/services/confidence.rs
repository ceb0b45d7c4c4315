//! Confidence filtering for decoder candidates.
//!
//! Linear symbologies are prone to partial reads: a scanline that clips a
//! bar can still produce a checksum-valid string. Engines that estimate a
//! per-module error report it on the candidate, and this module turns that
//! estimate into an accept/reject decision.
//!
//! The filter is pure. It holds no state between candidates, never sees the
//! session and never does I/O, so it can run inline in the tick consumer.

use crate::models::{DecodeCandidate, Symbology, SymbologySet};

/// Mean per-module error above which a candidate is discarded.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.10;

/// Outcome of evaluating one candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted,
    UnsupportedSymbology(Symbology),
    LowConfidence { mean_error: f64 },
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Mean of `rates` with each rate clamped to be non-negative.
///
/// Returns `None` for an empty slice. Engines that validate symbols
/// themselves report no rates at all.
pub fn mean_error_rate(rates: &[f64]) -> Option<f64> {
    if rates.is_empty() {
        return None;
    }

    let sum: f64 = rates.iter().map(|rate| rate.max(0.0)).sum();
    Some(sum / rates.len() as f64)
}

/// Accept `candidate` unless its mean error exceeds `threshold`.
///
/// A mean exactly equal to the threshold is accepted. A NaN mean never
/// compares greater, so candidates with NaN rates pass; engines must not
/// report NaN.
pub fn accept(candidate: &DecodeCandidate, threshold: f64) -> bool {
    match mean_error_rate(&candidate.per_module_error_rates) {
        Some(mean) => mean <= threshold || mean.is_nan(),
        None => true,
    }
}

/// Threshold plus symbology allow-list, evaluated together.
#[derive(Debug, Clone)]
pub struct ConfidenceFilter {
    threshold: f64,
    allowed: SymbologySet,
}

impl ConfidenceFilter {
    pub fn new(threshold: f64, allowed: SymbologySet) -> Self {
        Self { threshold, allowed }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn allowed(&self) -> &SymbologySet {
        &self.allowed
    }

    pub fn evaluate(&self, candidate: &DecodeCandidate) -> Verdict {
        if !self.allowed.contains(&candidate.symbology) {
            return Verdict::UnsupportedSymbology(candidate.symbology);
        }

        if accept(candidate, self.threshold) {
            Verdict::Accepted
        } else {
            Verdict::LowConfidence {
                mean_error: mean_error_rate(&candidate.per_module_error_rates).unwrap_or(0.0),
            }
        }
    }

    pub fn accept(&self, candidate: &DecodeCandidate) -> bool {
        self.evaluate(candidate).is_accepted()
    }
}
