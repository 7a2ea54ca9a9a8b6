use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use rusty_lines::analysis::calibration::CalibrationSource;
use rusty_lines::analysis::mode::ModeRule;
use rusty_lines::analysis::qc::has_local_peak;
use rusty_lines::config::{
    LOCAL_PEAK_WINDOW_NM, MAX_LABELS, MAX_LABELS_PER_50NM, MAX_SPECIES_GLOBAL, MAX_SPECIES_PER_50NM,
};
use rusty_lines::data::loader::{load_capture, load_library};
use rusty_lines::data::model::{LibraryEntry, LineKind};
use rusty_lines::EngineError;
use rusty_lines::{
    analyze, AnalysisConfig, AnalysisResult, BandHint, HintDirection, LampGuess, LineLibrary,
    MatchFlag, ModeSetting, RawCapture, Signal, SpectrumMode,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn axis(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    let n = ((hi - lo) / step).round() as usize + 1;
    (0..n).map(|i| lo + i as f64 * step).collect()
}

/// Sum of Gaussians `(centre, sigma, amplitude)` on `nm`.
fn spectrum(nm: &[f64], lines: &[(f64, f64, f64)]) -> Vec<f64> {
    nm.iter()
        .map(|&x| {
            lines
                .iter()
                .map(|&(mu, s, a)| a * (-(x - mu).powi(2) / (2.0 * s * s)).exp())
                .sum()
        })
        .collect()
}

fn capture(nm: Vec<f64>, signal: Vec<f64>) -> RawCapture {
    RawCapture {
        pixel: (0..nm.len()).map(|i| i as f64).collect(),
        wavelength: Some(nm),
        signal: Signal::Intensity(signal),
    }
}

fn library(species: &str, refs: &[f64]) -> LineLibrary {
    LineLibrary::new(
        refs.iter()
            .map(|&ref_nm| LibraryEntry {
                species: species.into(),
                ref_nm,
                kind: LineKind::Atom,
            })
            .collect(),
    )
    .unwrap()
}

fn hg_library() -> LineLibrary {
    library("Hg", &[404.656, 435.833, 546.074, 576.960, 579.066])
}

fn default_library() -> LineLibrary {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/line_library.json");
    load_library(&path).unwrap()
}

/// Default settings, no band hint.
fn run(capture: &RawCapture, library: &LineLibrary) -> AnalysisResult {
    analyze(capture, library, &AnalysisConfig::default(), BandHint::NONE).unwrap()
}

fn fluorescent_capture() -> RawCapture {
    let nm = axis(400.0, 700.0, 0.25);
    let y = spectrum(
        &nm,
        &[(435.833, 0.5, 0.8), (546.074, 0.5, 1.0), (611.0, 4.0, 0.6)],
    );
    capture(nm, y)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn identical_inputs_give_identical_results() {
    let lib = default_library();
    let config = AnalysisConfig::default();
    let hint = BandHint::new(HintDirection::Emission, 0.6);
    let a = analyze(&fluorescent_capture(), &lib, &config, hint).unwrap();
    let b = analyze(&fluorescent_capture(), &lib, &config, hint).unwrap();
    assert_eq!(a, b);
}

#[test]
fn isolated_mercury_peak_is_weak_evidence() {
    let nm = axis(400.0, 600.0, 0.25);
    let y = spectrum(&nm, &[(435.833, 0.5, 1.0)]);
    let result = run(&capture(nm, y), &hg_library());

    assert_eq!(result.mode, SpectrumMode::Emission);
    assert_eq!(result.matches.len(), 1);
    let m = &result.matches[0];
    assert_eq!(m.species, "Hg");
    assert_eq!(m.ref_nm, 435.833);
    assert!(m.has_flag(MatchFlag::WeakEvidence));
    assert!((m.score - 60.0).abs() < 1e-6, "score {}", m.score);
    assert!((m.corrected_nm - 435.833).abs() < 1e-9);
    assert_eq!(m.sigma, 6);
    // One match is below the fallback threshold; the retry finds no more.
    assert!(result.qc_log.iter().any(|l| l.starts_with("Only 1 matches")));
    assert_eq!(result.tolerance_nm, 2.0);
}

#[test]
fn mercury_pair_is_unflagged() {
    let nm = axis(400.0, 600.0, 0.25);
    let y = spectrum(&nm, &[(435.833, 0.5, 1.0), (546.074, 0.5, 1.0)]);
    let result = run(&capture(nm, y), &hg_library());
    let refs: Vec<f64> = result.matches.iter().map(|m| m.ref_nm).collect();
    assert_eq!(refs, vec![435.833, 546.074]);
    assert!(result.matches.iter().all(|m| m.flags.is_empty()));
    assert!(result.matches.iter().all(|m| m.score > 90.0));
}

#[test]
fn fluorescent_lamp_forces_emission() {
    let hint = BandHint::new(HintDirection::Absorption, 0.9);
    let config = AnalysisConfig::default();
    let result = analyze(&fluorescent_capture(), &default_library(), &config, hint).unwrap();
    assert_eq!(result.lamp_guess, LampGuess::Fluorescent);
    assert_eq!(result.mode, SpectrumMode::Emission);
    assert!(result.mode_rules.contains(&ModeRule::FluorescentLamp));
    let hg: BTreeSet<u64> = result
        .matches
        .iter()
        .filter(|m| m.species == "Hg")
        .map(|m| (m.ref_nm * 1000.0).round() as u64)
        .collect();
    assert!(hg.contains(&435_833) && hg.contains(&546_074));
}

#[test]
fn flat_zero_trace_gives_empty_result_with_warning() {
    let nm = axis(400.0, 500.0, 0.5);
    let y = vec![0.0; nm.len()];
    let result = run(&capture(nm, y), &hg_library());
    assert!(result.matches.is_empty());
    assert_eq!(result.candidate_peak_count, 0);
    assert!(result
        .qc_log
        .iter()
        .any(|l| l == "No peaks detected in the emission trace."));
}

#[test]
fn known_shift_is_cancelled() {
    let shift = 0.8;
    let refs = [404.656, 435.833, 546.074, 576.960, 579.066];
    let nm = axis(390.0, 600.0, 0.1);
    let lines: Vec<(f64, f64, f64)> = refs.iter().map(|&r| (r + shift, 0.4, 1.0)).collect();
    let result = run(&capture(nm.clone(), spectrum(&nm, &lines)), &hg_library());

    assert!((result.offset_nm + shift).abs() < 0.06, "offset {}", result.offset_nm);
    assert_eq!(result.matches.len(), refs.len());
    for m in &result.matches {
        assert!(m.residual_nm.abs() < 0.1, "{} residual {}", m.ref_nm, m.residual_nm);
        assert!((m.corrected_nm - (m.measured_nm + result.offset_nm)).abs() < 1e-12);
    }
}

#[test]
fn busy_spectrum_respects_caps_and_local_peaks() {
    let nm = axis(380.0, 720.0, 0.2);
    let lines: Vec<(f64, f64, f64)> = (0..60)
        .map(|i| {
            let centre = 385.0 + i as f64 * 5.5;
            let amp = 0.2 + 0.8 * (((i * 7) % 11) as f64 / 10.0);
            (centre, 0.6, amp)
        })
        .collect();
    let raw = capture(nm.clone(), spectrum(&nm, &lines));
    let result = run(&raw, &default_library());

    assert!(result.matches.len() <= MAX_LABELS);
    let global: BTreeSet<&str> = result.matches.iter().map(|m| m.species_key()).collect();
    assert!(global.len() <= MAX_SPECIES_GLOBAL);

    let mut windows: BTreeMap<i64, Vec<&str>> = BTreeMap::new();
    for m in &result.matches {
        windows
            .entry((m.ref_nm / 50.0).floor() as i64)
            .or_default()
            .push(m.species_key());
    }
    for species in windows.values() {
        assert!(species.len() <= MAX_LABELS_PER_50NM);
        let distinct: BTreeSet<&&str> = species.iter().collect();
        assert!(distinct.len() <= MAX_SPECIES_PER_50NM);
    }

    for m in &result.matches {
        let x = m.corrected_nm;
        assert!(has_local_peak(&result.nm, &result.trace, x, LOCAL_PEAK_WINDOW_NM));
        assert!((1..=6).contains(&m.sigma));
    }
    assert!(result.matches.windows(2).all(|w| w[0].ref_nm <= w[1].ref_nm));
}

#[test]
fn csv_capture_on_disk_uses_its_wavelength_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.csv");
    let nm = axis(400.0, 600.0, 0.25);
    let y = spectrum(&nm, &[(435.833, 0.5, 1.0), (546.074, 0.5, 1.0)]);
    let mut text = String::from("px,nm,R,G,B\n");
    for (i, (x, v)) in nm.iter().zip(&y).enumerate() {
        let level = (v * 200.0).round();
        text.push_str(&format!("{i},{x},{level},{},0\n", (level / 2.0).round()));
    }
    std::fs::write(&path, text).unwrap();

    let loaded = load_capture(&path).unwrap();
    let result = run(&loaded, &hg_library());
    assert_eq!(result.calibration, CalibrationSource::Dataset);
    assert_eq!(result.matches.len(), 2);
    assert!(result.matches.iter().all(|m| m.pixel.is_some()));
}

#[test]
fn wider_retry_is_adopted_when_it_finds_more() {
    // Lines sit 3.5 nm off their references in alternating directions, so
    // the robust offset stays near zero and nothing matches at 2 nm. Only
    // the strongest line is tall enough to form a plateau.
    let refs = [500.0, 540.0, 585.0, 640.0];
    let shifts = [3.5, -3.5, 3.5, -3.5];
    let amplitudes = [1.0, 0.6, 0.45, 0.3];
    let nm = axis(480.0, 660.0, 0.1);
    let lines: Vec<(f64, f64, f64)> = refs
        .iter()
        .zip(shifts)
        .zip(amplitudes)
        .map(|((&r, s), a)| (r + s, 0.5, a))
        .collect();
    let raw = capture(nm.clone(), spectrum(&nm, &lines));
    let result = run(&raw, &library("X", &refs));

    assert_eq!(result.tolerance_nm, 4.0);
    assert_eq!(result.mode, SpectrumMode::Emission);
    let matched: Vec<f64> = result.matches.iter().map(|m| m.ref_nm).collect();
    assert_eq!(matched, refs.to_vec());
    assert!(result.matches.iter().all(|m| m.flags.is_empty()));
    assert!(result.offset_nm.abs() < 1e-6, "offset {}", result.offset_nm);

    assert!(result.qc_log.iter().any(|l| l.starts_with("Only 1 matches")));
    let adopted = "Fallback at tolerance 4.00 nm adopted (4 matches).";
    assert!(result.qc_log.iter().any(|l| l == adopted));
}

#[test]
fn sodium_doublet_collapses_to_one_weak_match() {
    // The doublet is 0.597 nm apart, inside the 1.5 nm peak merge distance,
    // so only one line reaches the matcher and the doublet test fails.
    let nm = axis(580.0, 600.0, 0.001);
    let y = spectrum(&nm, &[(588.995, 0.1, 1.0), (589.592, 0.1, 1.0)]);
    let config = AnalysisConfig {
        mode: ModeSetting::Emission,
        ..AnalysisConfig::default()
    };
    let na = library("Na", &[588.995, 589.592]);
    let result = analyze(&capture(nm, y), &na, &config, BandHint::NONE).unwrap();

    assert_eq!(result.candidate_peak_count, 1);
    assert_eq!(result.matches.len(), 1);
    let m = &result.matches[0];
    assert_eq!(m.species, "Na");
    assert!(m.has_flag(MatchFlag::WeakEvidence));
    assert!((m.score - 60.0).abs() < 0.1, "score {}", m.score);
    assert_eq!(result.tolerance_nm, 2.0);
}

#[test]
fn non_positive_tolerance_is_a_configuration_error() {
    let nm = axis(400.0, 600.0, 0.25);
    let y = spectrum(&nm, &[(435.833, 0.5, 1.0), (546.074, 0.5, 1.0)]);
    for tolerance_nm in [0.0, -1.0, f64::NAN] {
        let config = AnalysisConfig {
            tolerance_nm,
            ..AnalysisConfig::default()
        };
        let raw = capture(nm.clone(), y.clone());
        let outcome = analyze(&raw, &hg_library(), &config, BandHint::NONE);
        assert!(matches!(outcome, Err(EngineError::InvalidSetting { .. })));
    }
}
