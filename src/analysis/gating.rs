//! Caps on how many labels and species a run may report.

use std::cmp::Ordering;

use crate::config::{
    GATING_WINDOW_NM, MAX_LABELS, MAX_LABELS_PER_50NM, MAX_SPECIES_GLOBAL, MAX_SPECIES_PER_50NM,
};
use crate::data::model::Match;

/// Stable sort by descending score; equal scores keep encounter order.
pub fn sort_by_score(matches: &mut [Match]) {
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Greedy admission in the given order: a match whose species is new is
/// dropped once `max_species` distinct species have been admitted.
fn cap_species(matches: Vec<Match>, max_species: usize) -> Vec<Match> {
    let mut species: Vec<String> = Vec::new();
    matches
        .into_iter()
        .filter(|m| {
            let key = m.species_key();
            if species.iter().any(|s| s == key) {
                true
            } else if species.len() >= max_species {
                false
            } else {
                species.push(key.to_string());
                true
            }
        })
        .collect()
}

/// Apply the global species cap, the per-50-nm caps and the total cap.
///
/// Windows are `[w, w + 50)` on the reference wavelength, starting at
/// `floor(nm_min / 50) · 50` and ending at `ceil(nm_max / 50) · 50`. The
/// result is ordered by descending score.
pub fn gate_matches(matches: Vec<Match>, nm_min: f64, nm_max: f64) -> Vec<Match> {
    if matches.is_empty() {
        return matches;
    }
    let before = matches.len();

    let mut sorted = matches;
    sort_by_score(&mut sorted);
    let admitted = cap_species(sorted, MAX_SPECIES_GLOBAL);

    let w_lo = (nm_min / GATING_WINDOW_NM).floor() * GATING_WINDOW_NM;
    let w_hi = (nm_max / GATING_WINDOW_NM).ceil() * GATING_WINDOW_NM;
    let windows = ((w_hi - w_lo) / GATING_WINDOW_NM).round().max(0.0) as usize;

    let mut kept = Vec::new();
    for w in 0..windows {
        let start = w_lo + w as f64 * GATING_WINDOW_NM;
        let end = start + GATING_WINDOW_NM;
        let bucket: Vec<Match> = admitted
            .iter()
            .filter(|m| m.ref_nm >= start && m.ref_nm < end)
            .cloned()
            .collect();
        let mut bucket = cap_species(bucket, MAX_SPECIES_PER_50NM);
        sort_by_score(&mut bucket);
        bucket.truncate(MAX_LABELS_PER_50NM);
        kept.extend(bucket);
    }

    sort_by_score(&mut kept);
    kept.truncate(MAX_LABELS);
    if kept.len() < before {
        log::debug!("gating kept {} of {before} matches", kept.len());
    }
    kept
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::data::model::{LibraryEntry, LineKind};

    fn m(species: &str, ref_nm: f64, score: f64) -> Match {
        let entry = LibraryEntry {
            species: species.into(),
            ref_nm,
            kind: LineKind::Atom,
        };
        Match::new(&entry, ref_nm, 0.0, 1.0, score)
    }

    #[test]
    fn per_window_species_cap() {
        let matches = vec![
            m("A", 410.0, 90.0),
            m("B", 411.0, 80.0),
            m("C", 412.0, 70.0),
            m("D", 413.0, 60.0),
            m("E", 414.0, 50.0),
            m("A", 415.0, 40.0),
        ];
        let out = gate_matches(matches, 400.0, 700.0);
        let species: Vec<&str> = out.iter().map(|m| m.species.as_str()).collect();
        assert_eq!(species, vec!["A", "B", "C", "D", "A"]);
    }

    #[test]
    fn band_systems_share_a_slot() {
        let matches = vec![
            m("N2 2P", 337.1, 50.0),
            m("N2 1P", 338.0, 40.0),
            m("CN violet", 340.0, 30.0),
            m("Hg", 334.1, 20.0),
            m("Fe", 344.0, 10.0),
            m("Ca", 345.0, 5.0),
        ];
        let out = gate_matches(matches, 300.0, 400.0);
        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|m| m.species != "Ca"));
    }

    #[test]
    fn equal_scores_keep_encounter_order() {
        let matches = vec![m("X", 500.0, 10.0), m("Y", 501.0, 10.0), m("Z", 502.0, 10.0)];
        let out = gate_matches(matches, 400.0, 700.0);
        let species: Vec<&str> = out.iter().map(|m| m.species.as_str()).collect();
        assert_eq!(species, vec!["X", "Y", "Z"]);
    }

    #[test]
    fn caps_hold_for_a_crowded_run() {
        let mut matches = Vec::new();
        for i in 0..200 {
            let species = format!("S{}", i % 23);
            let ref_nm = 380.0 + (i as f64) * 1.7;
            matches.push(m(&species, ref_nm, ((i * 37) % 101) as f64));
        }
        let out = gate_matches(matches, 380.0, 720.0);

        assert!(out.len() <= MAX_LABELS);
        let global: BTreeSet<&str> = out.iter().map(|m| m.species_key()).collect();
        assert!(global.len() <= MAX_SPECIES_GLOBAL);

        let mut windows: BTreeMap<i64, Vec<&Match>> = BTreeMap::new();
        for mm in &out {
            windows
                .entry((mm.ref_nm / 50.0).floor() as i64)
                .or_default()
                .push(mm);
        }
        for bucket in windows.values() {
            assert!(bucket.len() <= MAX_LABELS_PER_50NM);
            let species: BTreeSet<&str> = bucket.iter().map(|m| m.species_key()).collect();
            assert!(species.len() <= MAX_SPECIES_PER_50NM);
        }
        assert!(out.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn references_outside_the_data_range_are_dropped() {
        let out = gate_matches(vec![m("K", 769.9, 10.0), m("Na", 589.0, 5.0)], 400.0, 700.0);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].species, "Na");
    }
}
