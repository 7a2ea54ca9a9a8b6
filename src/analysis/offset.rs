//! Robust global wavelength correction.
//!
//! Instrument drift is usually small and near-uniform, so a single scalar
//! taken as the median of Tukey-trimmed residuals over loose matches is
//! enough to pull the measured axis onto the library.

use std::collections::BTreeSet;

use super::matcher::{match_candidates, Candidate};
use super::stats;
use crate::config::{CORRECTED_TOL_MIN_NM, INITIAL_TOL_MIN_NM, OFFSET_TOL_FACTOR, OFFSET_TOL_MIN_NM};
use crate::data::model::{LineLibrary, Match};

/// Median of the IQR-trimmed residuals `ref − measured`.
///
/// Matches are gathered at `max(3.0, 3 × tolerance)`. The trimmed set is
/// used when at least three residuals survive, otherwise the full set.
/// No matches means no correction.
pub fn estimate_offset(candidates: &[Candidate], library: &LineLibrary, tolerance_nm: f64) -> f64 {
    let wide = (tolerance_nm * OFFSET_TOL_FACTOR).max(OFFSET_TOL_MIN_NM);
    let residuals: Vec<f64> = match_candidates(candidates, library, wide, 0.0)
        .iter()
        .map(|m| m.ref_nm - m.measured_nm)
        .collect();
    robust_center(&residuals)
}

/// Median after Tukey fences, falling back to the untrimmed median.
pub fn robust_center(residuals: &[f64]) -> f64 {
    if residuals.is_empty() {
        return 0.0;
    }
    let sorted = stats::sorted(residuals);
    let q1 = stats::percentile_sorted(&sorted, 25.0);
    let q3 = stats::percentile_sorted(&sorted, 75.0);
    let iqr = q3 - q1;
    let (lo, hi) = (q1 - 1.5 * iqr, q3 + 1.5 * iqr);

    let trimmed: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|&d| d >= lo && d <= hi)
        .collect();
    if trimmed.len() >= 3 {
        stats::median(&trimmed)
    } else {
        stats::median(&sorted)
    }
}

/// Offset-corrected working match set.
///
/// Candidates are matched before and after correction; the union, keyed by
/// (species, reference), prefers the corrected pass. Every match is then
/// re-anchored at `measured + offset`.
pub fn corrected_matches(
    candidates: &[Candidate],
    library: &LineLibrary,
    tolerance_nm: f64,
) -> (Vec<Match>, f64) {
    let initial_tol = tolerance_nm.max(INITIAL_TOL_MIN_NM);
    let initial = match_candidates(candidates, library, initial_tol, 0.0);
    let offset = estimate_offset(candidates, library, tolerance_nm);
    let corrected_tol = tolerance_nm.max(CORRECTED_TOL_MIN_NM);
    let corrected = match_candidates(candidates, library, corrected_tol, offset);

    let mut seen = BTreeSet::new();
    let mut matches: Vec<Match> = corrected
        .into_iter()
        .chain(initial)
        .filter(|m| seen.insert(m.key()))
        .collect();
    for m in &mut matches {
        m.apply_offset(offset);
    }
    log::debug!(
        "offset {offset:+.3} nm, {} working matches from {} candidates",
        matches.len(),
        candidates.len()
    );
    (matches, offset)
}
