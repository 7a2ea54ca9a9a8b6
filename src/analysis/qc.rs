//! Post-hoc quality control: plateau augmentation and local-peak corroboration.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::plateau::{plateau_segments, PlateauSegment};
use super::stats;
use crate::config::{
    PLATEAU_EXISTING_NM, PLATEAU_GUESSES, PLATEAU_GUESS_SCORE, PLATEAU_REL_EPS, PLATEAU_REL_TOP,
    PLATEAU_SEARCH_NM,
};
use crate::data::model::{LineLibrary, Match, MatchFlag};

const GLOBAL_FRACTION: f64 = 0.05;
const LOCAL_STD_FACTOR: f64 = 2.0;
const LOCAL_MIN_RISE: f64 = 0.08;
const LOCAL_RANGE_FRACTION: f64 = 0.35;
const PLATEAU_FRACTION: f64 = 0.01;

/// Whether `x_nm` has a locally prominent feature within `± half_window_nm`.
///
/// The window maximum must be interior, and at least one of: it reaches 5%
/// of the trace maximum; it rises above the window median by
/// `max(2σ, 0.08)` or above the window minimum by 35% of the window range;
/// or at least two samples sit within 1% of it.
pub fn has_local_peak(nm: &[f64], intensity: &[f64], x_nm: f64, half_window_nm: f64) -> bool {
    let n = nm.len().min(intensity.len());
    if n == 0 {
        return false;
    }
    let left = stats::search_sorted(&nm[..n], x_nm - half_window_nm);
    let right = stats::search_sorted(&nm[..n], x_nm + half_window_nm).min(n - 1);
    if right <= left + 1 {
        return false;
    }
    let seg = &intensity[left..=right];

    let Some(peak_at) = stats::argmax(seg) else {
        return false;
    };
    let top = seg[peak_at];
    let bottom = seg.iter().copied().fold(f64::INFINITY, f64::min);
    let med = stats::median(seg);
    let std = stats::std_dev(seg);
    let trace_max = stats::max(&intensity[..n]).unwrap_or(0.0);

    let interior = peak_at > 0 && peak_at < seg.len() - 1;
    let global = top >= GLOBAL_FRACTION * (trace_max + 1e-12);
    let local = (top - med) >= (LOCAL_STD_FACTOR * std).max(LOCAL_MIN_RISE)
        || (top - bottom) >= LOCAL_RANGE_FRACTION * (top - bottom).max(1e-9);
    let plateau = seg
        .iter()
        .filter(|&&v| v >= top - PLATEAU_FRACTION * top)
        .count()
        >= 2;

    interior && (global || local || plateau)
}

/// Split matches into those with a local peak near their corrected
/// position and those without. Both keep input order.
pub fn corroborate(
    matches: Vec<Match>,
    nm: &[f64],
    intensity: &[f64],
    half_window_nm: f64,
) -> (Vec<Match>, Vec<Match>) {
    let (kept, dropped): (Vec<Match>, Vec<Match>) = matches
        .into_iter()
        .partition(|m| has_local_peak(nm, intensity, m.corrected_nm, half_window_nm));
    for m in &dropped {
        log::info!(
            "dropping {} {:.3} nm: no local peak near {:.2} nm",
            m.species,
            m.ref_nm,
            m.corrected_nm
        );
    }
    (kept, dropped)
}

/// Synthesize `plateau_guess` matches for saturated regions the peak
/// detector could not centre.
///
/// Plateaus within 3 nm of an existing match are skipped. Otherwise the two
/// references closest to the plateau midpoint (within 15 nm) are proposed.
/// Identity keys already present are never duplicated.
pub fn add_plateau_guesses(
    matches: &mut Vec<Match>,
    offset_nm: f64,
    nm: &[f64],
    intensity: &[f64],
    library: &LineLibrary,
) -> usize {
    let segments = plateau_segments(intensity, nm, PLATEAU_REL_TOP, PLATEAU_REL_EPS);
    if segments.is_empty() {
        return 0;
    }
    let existing: Vec<f64> = matches.iter().map(|m| m.corrected_nm).collect();
    let mut seen: BTreeSet<_> = matches.iter().map(Match::key).collect();
    let mut added = 0;

    for seg in &segments {
        if existing
            .iter()
            .any(|x| (x - seg.nm_mid).abs() <= PLATEAU_EXISTING_NM)
        {
            continue;
        }
        for guess in plateau_guesses(seg, offset_nm, intensity, library) {
            if seen.insert(guess.key()) {
                matches.push(guess);
                added += 1;
            }
        }
    }
    if added > 0 {
        log::debug!("plateau augmentation added {added} matches from {} segments", segments.len());
    }
    added
}

fn plateau_guesses(
    seg: &PlateauSegment,
    offset_nm: f64,
    intensity: &[f64],
    library: &LineLibrary,
) -> Vec<Match> {
    let mut nearby: Vec<_> = library
        .entries()
        .iter()
        .filter(|e| (e.ref_nm - seg.nm_mid).abs() <= PLATEAU_SEARCH_NM)
        .collect();
    nearby.sort_by(|a, b| {
        (a.ref_nm - seg.nm_mid)
            .abs()
            .partial_cmp(&(b.ref_nm - seg.nm_mid).abs())
            .unwrap_or(Ordering::Equal)
    });

    let strength = stats::max(&intensity[seg.left..=seg.right]).unwrap_or(0.0);
    nearby
        .into_iter()
        .take(PLATEAU_GUESSES)
        .map(|entry| {
            let d = (entry.ref_nm - seg.nm_mid).abs();
            let score = PLATEAU_GUESS_SCORE * (1.0 - d / PLATEAU_SEARCH_NM).max(0.0);
            let mut m = Match::new(entry, seg.nm_mid, offset_nm, strength, score);
            m.flags.insert(MatchFlag::PlateauGuess);
            m
        })
        .collect()
}
