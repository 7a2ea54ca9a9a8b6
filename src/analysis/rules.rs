//! Physically motivated score adjustments for multi-line species.
//!
//! A species that always shows several lines is weak evidence when only one
//! of them turns up. Such matches are down-weighted, not removed, so gating
//! can still surface them when nothing better competes.

use std::collections::BTreeSet;

use crate::config::{HG_RESIDUAL_MIN_NM, WEAK_EVIDENCE_FACTOR};
use crate::data::model::{Match, MatchFlag};

const NA_DOUBLET_PM: [i64; 2] = [588_995, 589_592];
/// He signature lines in units of 0.01 nm.
const HE_SIGNATURE: [i64; 5] = [44_715, 47_131, 49_219, 50_157, 70_652];
const AR_RED_NM: (f64, f64) = (696.0, 912.5);
const MIN_HG_LINES: usize = 2;
const MIN_HE_LINES: usize = 2;
const MIN_AR_LINES: usize = 2;

/// Outcome of the group presence tests over one match set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEvidence {
    pub hg: bool,
    pub na: bool,
    pub he: bool,
    pub ar: bool,
}

impl GroupEvidence {
    pub fn assess(matches: &[Match], tolerance_nm: f64) -> Self {
        let hg_bound = tolerance_nm.max(HG_RESIDUAL_MIN_NM);
        let hg: BTreeSet<i64> = matches
            .iter()
            .filter(|m| m.species == "Hg" && m.residual_nm.abs() <= hg_bound)
            .map(|m| m.key().ref_pm)
            .collect();
        let na: BTreeSet<i64> = matches
            .iter()
            .filter(|m| m.species == "Na")
            .map(|m| m.key().ref_pm)
            .collect();
        let he: BTreeSet<i64> = matches
            .iter()
            .filter(|m| m.species == "He")
            .map(|m| (m.ref_nm * 100.0).round() as i64)
            .collect();
        let ar = matches
            .iter()
            .filter(|m| m.species == "Ar" && (AR_RED_NM.0..=AR_RED_NM.1).contains(&m.ref_nm))
            .count();

        Self {
            hg: hg.len() >= MIN_HG_LINES,
            na: NA_DOUBLET_PM.iter().all(|pm| na.contains(pm)),
            he: HE_SIGNATURE.iter().filter(|v| he.contains(v)).count() >= MIN_HE_LINES,
            ar: ar >= MIN_AR_LINES,
        }
    }

    /// Whether a match of `species` is backed by its group. Species without
    /// a rule are always backed.
    pub fn supports(&self, species: &str) -> bool {
        match species {
            "Hg" => self.hg,
            "Na" => self.na,
            "He" => self.he,
            "Ar" => self.ar,
            _ => true,
        }
    }
}

/// Flag unsupported group members as weak evidence and scale their score.
pub fn apply_domain_rules(matches: &mut [Match], tolerance_nm: f64) {
    let evidence = GroupEvidence::assess(matches, tolerance_nm);
    let mut weakened = 0usize;
    for m in matches.iter_mut() {
        if evidence.supports(&m.species) {
            continue;
        }
        m.flags.insert(MatchFlag::WeakEvidence);
        m.score = (m.score * WEAK_EVIDENCE_FACTOR).max(0.0);
        weakened += 1;
    }
    if weakened > 0 {
        log::debug!("domain rules: {weakened} matches flagged weak_evidence ({evidence:?})");
    }
}
