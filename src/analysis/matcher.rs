use crate::data::model::{LibraryEntry, LineLibrary, Match};

/// A measured feature offered to the matcher.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub nm: f64,
    pub intensity: f64,
}

/// Proximity score of a reference at distance `d` from a feature.
pub fn proximity_score(d: f64, tolerance_nm: f64, intensity: f64) -> f64 {
    (1.0 - d / tolerance_nm).max(0.0) * 100.0 * intensity
}

/// Best library entry for a position, if any lies within tolerance.
///
/// Equal scores keep the entry seen first in library order.
pub fn best_entry<'a>(
    library: &'a LineLibrary,
    position_nm: f64,
    intensity: f64,
    tolerance_nm: f64,
) -> Option<(&'a LibraryEntry, f64)> {
    let mut best: Option<(&LibraryEntry, f64)> = None;
    for entry in library.entries() {
        let d = (entry.ref_nm - position_nm).abs();
        if d > tolerance_nm {
            continue;
        }
        let score = proximity_score(d, tolerance_nm, intensity);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((entry, score));
        }
    }
    best
}

/// Match every candidate against the library.
///
/// The lookup position is `candidate.nm + offset_nm`; the match keeps the
/// measured position and records the correction. Candidates without an
/// entry in tolerance produce nothing.
pub fn match_candidates(
    candidates: &[Candidate],
    library: &LineLibrary,
    tolerance_nm: f64,
    offset_nm: f64,
) -> Vec<Match> {
    candidates
        .iter()
        .filter_map(|c| {
            let (entry, score) = best_entry(library, c.nm + offset_nm, c.intensity, tolerance_nm)?;
            Some(Match::new(entry, c.nm, offset_nm, c.intensity, score))
        })
        .collect()
}
