//! End-to-end identification run.
//!
//! ```text
//!  RawCapture ──► Spectrum (calibrated, normalised)
//!                    │
//!        ┌───────────┴───────────┐
//!        ▼                       ▼
//!   evaluate(emission)     evaluate(absorption)
//!   peaks → offset →       peaks → offset →
//!   rules → gating         rules → gating
//!        └───────────┬───────────┘
//!                    ▼
//!              select_mode
//!                    │
//!                    ▼
//!   plateau augmentation → corroboration → gating
//!                    │
//!        fewer than 3 matches? retry wider once
//!                    │
//!                    ▼
//!        sigma levels → AnalysisResult
//! ```

use serde::Serialize;

use super::calibration::{CalibrationSource, Spectrum};
use super::gating::gate_matches;
use super::matcher::Candidate;
use super::mode::{
    detect_lamp, select_mode, BandHint, LampGuess, ModeRule, PipelineSummary, SpectrumMode,
};
use super::offset::corrected_matches;
use super::peaks::{describe, detect_peaks, enforce_min_distance, Peak};
use super::plateau::{plateau_segments, PlateauSegment};
use super::qc::{add_plateau_guesses, corroborate};
use super::rules::apply_domain_rules;
use super::sigma::assign_sigma;
use super::stats;
use crate::config::{
    AnalysisConfig, ModeSetting, FALLBACK_MIN_MATCHES, FALLBACK_TOL_MIN_NM, LOCAL_PEAK_WINDOW_NM,
    PLATEAU_REL_EPS, PLATEAU_REL_TOP,
};
use crate::data::model::{LineLibrary, Match, RawCapture};
use crate::error::{DataQualityWarning, EngineResult};

// ---------------------------------------------------------------------------
// Context and per-trace evaluation
// ---------------------------------------------------------------------------

/// Everything a run reads. Nothing in here changes once the run starts.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub spectrum: &'a Spectrum,
    pub library: &'a LineLibrary,
    pub config: &'a AnalysisConfig,
    pub hint: BandHint,
}

impl AnalysisContext<'_> {
    /// The intensity array a mode works on.
    pub fn trace(&self, mode: SpectrumMode) -> Vec<f64> {
        match mode {
            SpectrumMode::Emission => self.spectrum.intensity.clone(),
            SpectrumMode::Absorption => self.spectrum.absorption_trace(),
        }
    }

    /// Detected peaks after the minimum-separation filter.
    fn candidates(&self, trace: &[f64]) -> Vec<usize> {
        let nm = &self.spectrum.nm;
        let detected = detect_peaks(nm, trace, &self.config.scales);
        enforce_min_distance(nm, trace, &detected, self.config.min_dist_nm)
    }

    fn lamp_guess(&self, emission_candidates: &[usize], tolerance_nm: f64) -> LampGuess {
        let spectrum = self.spectrum;
        let peaks = describe(&spectrum.nm, &spectrum.intensity, emission_candidates);
        detect_lamp(&peaks, tolerance_nm)
    }
}

/// One sub-pipeline's result over a single trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub mode: SpectrumMode,
    pub trace: Vec<f64>,
    /// Peak indices offered to the matcher.
    pub candidates: Vec<usize>,
    pub offset_nm: f64,
    pub matches: Vec<Match>,
}

impl Evaluation {
    pub fn summary(&self) -> PipelineSummary {
        PipelineSummary {
            matches: self.matches.len(),
            total_score: self.matches.iter().map(|m| m.score).sum(),
        }
    }
}

/// Peaks → offset-corrected matches → domain rules → gating, on one trace.
pub fn evaluate(ctx: &AnalysisContext<'_>, mode: SpectrumMode, tolerance_nm: f64) -> Evaluation {
    let nm = &ctx.spectrum.nm;
    let trace = ctx.trace(mode);
    let candidates = ctx.candidates(&trace);
    let offered: Vec<Candidate> = candidates
        .iter()
        .map(|&i| Candidate {
            nm: nm[i],
            intensity: trace[i],
        })
        .collect();

    let (mut matches, offset_nm) = corrected_matches(&offered, ctx.library, tolerance_nm);
    apply_domain_rules(&mut matches, tolerance_nm);
    let (lo, hi) = ctx.spectrum.nm_range();
    let matches = gate_matches(matches, lo, hi);

    log::debug!(
        "{mode}: {} candidates, offset {offset_nm:+.3} nm, {} matches",
        candidates.len(),
        matches.len()
    );
    Evaluation {
        mode,
        trace,
        candidates,
        offset_nm,
        matches,
    }
}

// ---------------------------------------------------------------------------
// One full pass at a fixed tolerance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Run {
    evaluation: Evaluation,
    lamp: LampGuess,
    rules: Vec<ModeRule>,
    tolerance_nm: f64,
    qc_log: Vec<String>,
}

impl Run {
    fn match_count(&self) -> usize {
        self.evaluation.matches.len()
    }
}

fn note(qc_log: &mut Vec<String>, warning: DataQualityWarning) {
    log::warn!("{warning}");
    qc_log.push(warning.to_string());
}

fn choose(ctx: &AnalysisContext<'_>, tolerance_nm: f64) -> (Evaluation, LampGuess, Vec<ModeRule>) {
    match ctx.config.mode {
        ModeSetting::Emission => {
            let em = evaluate(ctx, SpectrumMode::Emission, tolerance_nm);
            let lamp = ctx.lamp_guess(&em.candidates, tolerance_nm);
            (em, lamp, Vec::new())
        }
        ModeSetting::Absorption => {
            let emission_peaks = ctx.candidates(&ctx.spectrum.intensity);
            let lamp = ctx.lamp_guess(&emission_peaks, tolerance_nm);
            (evaluate(ctx, SpectrumMode::Absorption, tolerance_nm), lamp, Vec::new())
        }
        ModeSetting::Auto => {
            let em = evaluate(ctx, SpectrumMode::Emission, tolerance_nm);
            let abs = evaluate(ctx, SpectrumMode::Absorption, tolerance_nm);
            let lamp = ctx.lamp_guess(&em.candidates, tolerance_nm);
            let decision = select_mode(em.summary(), abs.summary(), ctx.hint, lamp);
            log::info!(
                "mode {} (emission {:?}, absorption {:?}, hint {:?}, lamp {lamp}, rules {:?})",
                decision.mode,
                em.summary(),
                abs.summary(),
                ctx.hint,
                decision.trail
            );
            let chosen = match decision.mode {
                SpectrumMode::Emission => em,
                SpectrumMode::Absorption => abs,
            };
            (chosen, lamp, decision.trail)
        }
    }
}

fn run_once(ctx: &AnalysisContext<'_>, tolerance_nm: f64) -> Run {
    let mut qc_log = Vec::new();
    let (mut evaluation, lamp, rules) = choose(ctx, tolerance_nm);
    if evaluation.candidates.is_empty() {
        note(
            &mut qc_log,
            DataQualityWarning::NoPeaksDetected {
                trace: evaluation.mode.as_str(),
            },
        );
    }

    let nm = &ctx.spectrum.nm;
    add_plateau_guesses(
        &mut evaluation.matches,
        evaluation.offset_nm,
        nm,
        &evaluation.trace,
        ctx.library,
    );
    let working = std::mem::take(&mut evaluation.matches);
    let (kept, dropped) = corroborate(working, nm, &evaluation.trace, LOCAL_PEAK_WINDOW_NM);
    for m in &dropped {
        qc_log.push(format!(
            "Dropped {} {:.3} nm: no local peak near {:.2} nm.",
            m.species, m.ref_nm, m.corrected_nm
        ));
    }
    if !dropped.is_empty() {
        note(
            &mut qc_log,
            DataQualityWarning::NoLocalPeak {
                removed: dropped.len(),
            },
        );
    }
    let (lo, hi) = ctx.spectrum.nm_range();
    evaluation.matches = gate_matches(kept, lo, hi);

    Run {
        evaluation,
        lamp,
        rules,
        tolerance_nm,
        qc_log,
    }
}

/// Retry once at a wider tolerance; keep the retry only if it finds more.
fn retry_wider(ctx: &AnalysisContext<'_>, first: Run, qc_log: &mut Vec<String>) -> Run {
    note(
        qc_log,
        DataQualityWarning::TooFewMatches {
            found: first.match_count(),
            tolerance_nm: first.tolerance_nm,
        },
    );
    let wider = (2.0 * first.tolerance_nm).max(FALLBACK_TOL_MIN_NM);
    let mut second = run_once(ctx, wider);
    qc_log.append(&mut second.qc_log);

    if second.match_count() > first.match_count() {
        note(
            qc_log,
            DataQualityWarning::FallbackAdopted {
                tolerance_nm: wider,
                matches: second.match_count(),
            },
        );
        second
    } else {
        note(
            qc_log,
            DataQualityWarning::FallbackRejected {
                tolerance_nm: wider,
                matches: second.match_count(),
            },
        );
        first
    }
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Outcome of [`analyze`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub mode: SpectrumMode,
    /// Decision-table rules that fired; empty for a fixed mode.
    pub mode_rules: Vec<ModeRule>,
    pub lamp_guess: LampGuess,
    pub calibration: CalibrationSource,
    pub offset_nm: f64,
    /// Peaks offered to the matcher in the chosen trace.
    pub candidate_peak_count: usize,
    /// Tolerance of the run that was kept.
    pub tolerance_nm: f64,
    /// Final labels, by reference wavelength ascending.
    pub matches: Vec<Match>,
    pub qc_log: Vec<String>,
    pub peaks: Vec<Peak>,
    pub plateaus: Vec<PlateauSegment>,
    #[serde(skip)]
    pub nm: Vec<f64>,
    /// The intensity array the chosen mode worked on.
    #[serde(skip)]
    pub trace: Vec<f64>,
}

/// Identify the lines of one capture.
///
/// Configuration problems fail before any matching. Data quality problems
/// never fail; they are logged and collected in `qc_log`.
pub fn analyze(
    capture: &RawCapture,
    library: &LineLibrary,
    config: &AnalysisConfig,
    hint: BandHint,
) -> EngineResult<AnalysisResult> {
    config.validate()?;
    let spectrum = Spectrum::from_capture(capture)?;
    let mut qc_log = Vec::new();
    if spectrum.resorted {
        note(&mut qc_log, DataQualityWarning::UnsortedWavelengths);
    }

    let ctx = AnalysisContext {
        spectrum: &spectrum,
        library,
        config,
        hint,
    };
    let mut first = run_once(&ctx, config.tolerance_nm);
    qc_log.append(&mut first.qc_log);
    let run = if first.match_count() < FALLBACK_MIN_MATCHES {
        retry_wider(&ctx, first, &mut qc_log)
    } else {
        first
    };

    let Run {
        evaluation,
        lamp,
        rules,
        tolerance_nm,
        ..
    } = run;
    let Evaluation {
        mode,
        trace,
        candidates,
        offset_nm,
        mut matches,
    } = evaluation;

    assign_sigma(&mut matches);
    for m in &mut matches {
        m.pixel = stats::interp(m.measured_nm, &spectrum.nm, &spectrum.pixel);
    }
    matches.sort_by(|a, b| {
        a.ref_nm
            .total_cmp(&b.ref_nm)
            .then_with(|| a.species.cmp(&b.species))
    });

    let peaks = describe(&spectrum.nm, &trace, &candidates);
    let plateaus = plateau_segments(&trace, &spectrum.nm, PLATEAU_REL_TOP, PLATEAU_REL_EPS);
    log::info!(
        "{mode}: {} labels at tolerance {tolerance_nm:.2} nm, offset {offset_nm:+.3} nm",
        matches.len()
    );

    Ok(AnalysisResult {
        mode,
        mode_rules: rules,
        lamp_guess: lamp,
        calibration: spectrum.calibration,
        offset_nm,
        candidate_peak_count: candidates.len(),
        tolerance_nm,
        matches,
        qc_log,
        peaks,
        plateaus,
        nm: spectrum.nm,
        trace,
    })
}
