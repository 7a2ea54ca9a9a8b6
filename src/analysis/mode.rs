//! Emission / absorption disambiguation.
//!
//! The selector is a decision table: each rule is a named guard evaluated
//! over two pipeline summaries, the band-image hint and the lamp guess.
//! Rules run in order and the trail of rules that fired is kept for the
//! QC log.

use std::fmt;

use serde::Serialize;

use super::peaks::Peak;
use crate::config::{
    BROAD_FWHM_NM, EMISSION_VETO_CONFIDENCE, HG_BLUE_NM, HG_GREEN_NM, HINT_MIN_CONFIDENCE,
    HINT_OVERRIDE_EXTRA_MATCHES, HINT_OVERRIDE_SCORE_RATIO, NARROW_FWHM_NM, NO_HINT_EXTRA_MATCHES,
    NO_HINT_SCORE_RATIO,
};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Interpretation chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectrumMode {
    Emission,
    Absorption,
}

impl SpectrumMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectrumMode::Emission => "emission",
            SpectrumMode::Absorption => "absorption",
        }
    }

    /// Short tag used in the `Type` column of exports.
    pub fn short(&self) -> &'static str {
        match self {
            SpectrumMode::Emission => "em",
            SpectrumMode::Absorption => "abs",
        }
    }
}

impl fmt::Display for SpectrumMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintDirection {
    Emission,
    Absorption,
}

/// Bright-vs-dark verdict from the band photograph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BandHint {
    pub direction: Option<HintDirection>,
    /// `0..=1`.
    pub confidence: f64,
}

impl BandHint {
    pub const NONE: BandHint = BandHint {
        direction: None,
        confidence: 0.0,
    };

    pub fn new(direction: HintDirection, confidence: f64) -> Self {
        Self {
            direction: Some(direction),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    fn says(&self, direction: HintDirection, min_confidence: f64) -> bool {
        self.direction == Some(direction) && self.confidence >= min_confidence
    }
}

impl Default for BandHint {
    fn default() -> Self {
        Self::NONE
    }
}

/// Light source recognised from narrow/broad line signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LampGuess {
    Fluorescent,
    Neon,
    Mercury,
    Unknown,
}

impl fmt::Display for LampGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LampGuess::Fluorescent => "fluorescent",
            LampGuess::Neon => "neon",
            LampGuess::Mercury => "mercury",
            LampGuess::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

const BROAD_RED: (f64, f64) = (611.0, 6.0);
const BROAD_GREEN: (f64, f64) = (544.0, 4.0);
const NEON_BAND_NM: (f64, f64) = (585.0, 640.0);
const NEON_MIN_LINES: usize = 3;

/// Classify the lamp from emission-trace peaks with widths.
///
/// Fluorescent tubes show the narrow Hg 435.8/546.1 lines on top of broad
/// phosphor bands near 611 or 544 nm.
pub fn detect_lamp(peaks: &[Peak], tolerance_nm: f64) -> LampGuess {
    let narrow_near = |target: f64| {
        peaks
            .iter()
            .any(|p| (p.nm - target).abs() <= tolerance_nm && p.fwhm_nm < NARROW_FWHM_NM)
    };
    let broad_near = |(center, reach): (f64, f64)| {
        peaks
            .iter()
            .any(|p| (p.nm - center).abs() <= reach && p.fwhm_nm >= BROAD_FWHM_NM)
    };

    let hg_pair = narrow_near(HG_BLUE_NM) && narrow_near(HG_GREEN_NM);
    let broad = broad_near(BROAD_RED) || broad_near(BROAD_GREEN);
    let neon_lines = peaks
        .iter()
        .filter(|p| p.nm >= NEON_BAND_NM.0 && p.nm <= NEON_BAND_NM.1 && p.fwhm_nm < NARROW_FWHM_NM)
        .count();

    if hg_pair && broad {
        LampGuess::Fluorescent
    } else if neon_lines >= NEON_MIN_LINES && !broad {
        LampGuess::Neon
    } else if hg_pair {
        LampGuess::Mercury
    } else {
        LampGuess::Unknown
    }
}

// ---------------------------------------------------------------------------
// Decision table
// ---------------------------------------------------------------------------

/// What the selector needs to know about one sub-pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSummary {
    pub matches: usize,
    pub total_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ModeRule {
    /// Emission-leaning image; absorption needs a decisive advantage.
    EmissionHint,
    /// Absorption-leaning image; emission needs a decisive advantage.
    AbsorptionHint,
    /// No usable hint; absorption needs a modest advantage.
    Inconclusive,
    /// Fluorescent lamp signature forces emission.
    FluorescentLamp,
    /// Absorption chosen, but the image says emission.
    EmissionVeto,
}

impl fmt::Display for ModeRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModeRule::EmissionHint => "emission-hint",
            ModeRule::AbsorptionHint => "absorption-hint",
            ModeRule::Inconclusive => "inconclusive-hint",
            ModeRule::FluorescentLamp => "fluorescent-lamp",
            ModeRule::EmissionVeto => "emission-veto",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeDecision {
    pub mode: SpectrumMode,
    /// Rules that fired, in order.
    pub trail: Vec<ModeRule>,
}

/// `challenger` beats `incumbent` by at least `extra` matches and by a
/// total score strictly above `ratio ×` the incumbent's.
pub fn decisive_advantage(
    challenger: PipelineSummary,
    incumbent: PipelineSummary,
    extra: usize,
    ratio: f64,
) -> bool {
    challenger.matches >= incumbent.matches + extra
        && challenger.total_score > incumbent.total_score * ratio
}

/// Rules a–c: pick a sub-pipeline from the numbers and the image hint.
pub fn base_choice(
    emission: PipelineSummary,
    absorption: PipelineSummary,
    hint: BandHint,
) -> (SpectrumMode, ModeRule) {
    if hint.says(HintDirection::Emission, HINT_MIN_CONFIDENCE) {
        let mode = if decisive_advantage(
            absorption,
            emission,
            HINT_OVERRIDE_EXTRA_MATCHES,
            HINT_OVERRIDE_SCORE_RATIO,
        ) {
            SpectrumMode::Absorption
        } else {
            SpectrumMode::Emission
        };
        (mode, ModeRule::EmissionHint)
    } else if hint.says(HintDirection::Absorption, HINT_MIN_CONFIDENCE) {
        let mode = if decisive_advantage(
            emission,
            absorption,
            HINT_OVERRIDE_EXTRA_MATCHES,
            HINT_OVERRIDE_SCORE_RATIO,
        ) {
            SpectrumMode::Emission
        } else {
            SpectrumMode::Absorption
        };
        (mode, ModeRule::AbsorptionHint)
    } else {
        let mode = if decisive_advantage(
            absorption,
            emission,
            NO_HINT_EXTRA_MATCHES,
            NO_HINT_SCORE_RATIO,
        ) {
            SpectrumMode::Absorption
        } else {
            SpectrumMode::Emission
        };
        (mode, ModeRule::Inconclusive)
    }
}

/// Rule d.
pub fn fluorescent_override(lamp: LampGuess) -> bool {
    lamp == LampGuess::Fluorescent
}

/// Rule e.
pub fn emission_veto(mode: SpectrumMode, hint: BandHint) -> bool {
    mode == SpectrumMode::Absorption
        && hint.says(HintDirection::Emission, EMISSION_VETO_CONFIDENCE)
}

/// Run the full table.
pub fn select_mode(
    emission: PipelineSummary,
    absorption: PipelineSummary,
    hint: BandHint,
    lamp: LampGuess,
) -> ModeDecision {
    let (mut mode, rule) = base_choice(emission, absorption, hint);
    let mut trail = vec![rule];

    if fluorescent_override(lamp) {
        mode = SpectrumMode::Emission;
        trail.push(ModeRule::FluorescentLamp);
    }
    if emission_veto(mode, hint) {
        mode = SpectrumMode::Emission;
        trail.push(ModeRule::EmissionVeto);
    }
    ModeDecision { mode, trail }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(matches: usize, total_score: f64) -> PipelineSummary {
        PipelineSummary {
            matches,
            total_score,
        }
    }

    fn peak(nm: f64, fwhm_nm: f64) -> Peak {
        Peak {
            index: 0,
            nm,
            amplitude: 1.0,
            fwhm_nm,
        }
    }

    #[test]
    fn emission_hint_holds_against_small_advantage() {
        let hint = BandHint::new(HintDirection::Emission, 0.5);
        let (mode, rule) = base_choice(s(5, 100.0), s(9, 200.0), hint);
        assert_eq!((mode, rule), (SpectrumMode::Emission, ModeRule::EmissionHint));
    }

    #[test]
    fn emission_hint_yields_to_decisive_advantage_then_vetoes() {
        let hint = BandHint::new(HintDirection::Emission, 0.5);
        let (mode, _) = base_choice(s(5, 100.0), s(10, 116.0), hint);
        assert_eq!(mode, SpectrumMode::Absorption);
        // A confident emission image still wins in the end.
        let decision = select_mode(s(5, 100.0), s(10, 116.0), hint, LampGuess::Unknown);
        assert_eq!(decision.mode, SpectrumMode::Emission);
        assert_eq!(decision.trail, vec![ModeRule::EmissionHint, ModeRule::EmissionVeto]);
    }

    #[test]
    fn absorption_hint_is_symmetric() {
        let hint = BandHint::new(HintDirection::Absorption, 0.3);
        assert_eq!(base_choice(s(9, 200.0), s(5, 100.0), hint).0, SpectrumMode::Absorption);
        assert_eq!(base_choice(s(10, 116.0), s(5, 100.0), hint).0, SpectrumMode::Emission);
        // Score ratio must be strictly exceeded.
        assert_eq!(base_choice(s(10, 115.0), s(5, 100.0), hint).0, SpectrumMode::Absorption);
    }

    #[test]
    fn weak_hint_is_inconclusive() {
        let hint = BandHint::new(HintDirection::Absorption, 0.2);
        let (mode, rule) = base_choice(s(4, 100.0), s(7, 106.0), hint);
        assert_eq!((mode, rule), (SpectrumMode::Absorption, ModeRule::Inconclusive));
        assert_eq!(base_choice(s(4, 100.0), s(6, 200.0), BandHint::NONE).0, SpectrumMode::Emission);
        assert_eq!(base_choice(s(4, 100.0), s(7, 105.0), BandHint::NONE).0, SpectrumMode::Emission);
    }

    #[test]
    fn fluorescent_lamp_forces_emission() {
        let hint = BandHint::new(HintDirection::Absorption, 0.9);
        let decision = select_mode(s(3, 50.0), s(20, 900.0), hint, LampGuess::Fluorescent);
        assert_eq!(decision.mode, SpectrumMode::Emission);
        assert_eq!(decision.trail, vec![ModeRule::AbsorptionHint, ModeRule::FluorescentLamp]);
    }

    #[test]
    fn veto_needs_confidence() {
        let weak = BandHint::new(HintDirection::Emission, 0.19);
        assert!(!emission_veto(SpectrumMode::Absorption, weak));
        let ok = BandHint::new(HintDirection::Emission, 0.2);
        assert!(emission_veto(SpectrumMode::Absorption, ok));
        assert!(!emission_veto(SpectrumMode::Emission, ok));
    }

    #[test]
    fn lamp_signatures() {
        let fluorescent = [peak(435.9, 1.2), peak(546.0, 1.1), peak(611.5, 8.0)];
        assert_eq!(detect_lamp(&fluorescent, 2.0), LampGuess::Fluorescent);

        let mercury = [peak(435.9, 1.2), peak(546.0, 1.1), peak(577.0, 1.5)];
        assert_eq!(detect_lamp(&mercury, 2.0), LampGuess::Mercury);

        let neon = [peak(585.2, 1.0), peak(603.0, 1.0), peak(639.5, 1.0)];
        assert_eq!(detect_lamp(&neon, 2.0), LampGuess::Neon);

        let broad_hg = [peak(435.9, 3.0), peak(546.0, 1.1), peak(611.5, 8.0)];
        assert_eq!(detect_lamp(&broad_hg, 2.0), LampGuess::Unknown);
    }
}
