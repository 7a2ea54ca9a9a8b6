use std::cmp::Ordering;

use crate::analysis::pipeline::AnalysisResult;
use crate::config::PLATEAU_REL_TOP;
use crate::data::model::Match;

const MAX_PLATEAUS: usize = 20;
const MAX_PEAKS: usize = 20;
const MAX_LABELS_LISTED: usize = 60;

/// Human-readable account of one run, for the report.
pub fn analysis_log(result: &AnalysisResult) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Run: mode={}, robust offset (median Δλ)={:+.3} nm, tolerance {:.2} nm.",
        result.mode, result.offset_nm, result.tolerance_nm
    ));
    if !result.mode_rules.is_empty() {
        let rules: Vec<String> = result.mode_rules.iter().map(ToString::to_string).collect();
        lines.push(format!("Mode rules: {}.", rules.join(" → ")));
    }
    lines.push(format!("Lamp guess: {}.", result.lamp_guess));
    lines.push(format!(
        "Candidate peaks before matching: {}.",
        result.candidate_peak_count
    ));

    if !result.plateaus.is_empty() {
        lines.push(format!(
            "Plateau segments (rel_top={PLATEAU_REL_TOP}): {}:",
            result.plateaus.len()
        ));
        for seg in result.plateaus.iter().take(MAX_PLATEAUS) {
            lines.push(format!(
                "  • {:.2}-{:.2} nm (centre {:.2} nm, width {:.2} nm, pix {}-{})",
                seg.nm_lo,
                seg.nm_hi,
                seg.nm_mid,
                seg.width_nm(),
                seg.left,
                seg.right
            ));
        }
    }

    if !result.peaks.is_empty() {
        let mut peaks = result.peaks.clone();
        peaks.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude));
        lines.push("Top peaks (nm, I_norm):".to_string());
        for p in peaks.iter().take(MAX_PEAKS) {
            lines.push(format!("  • {:.2} nm: {:.3}", p.nm, p.amplitude));
        }
    }

    lines.push(format!("Labels after QC/gating: {}:", result.matches.len()));
    let mut by_score: Vec<&Match> = result.matches.iter().collect();
    by_score.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    for m in by_score.into_iter().take(MAX_LABELS_LISTED) {
        lines.push(format!(
            "  • {} ref {:.2} nm; corr {:.2} nm; Δλ={:+.2}; σ={}; score={:.1}; flags={}",
            m.species,
            m.ref_nm,
            m.corrected_nm,
            m.residual_nm,
            m.sigma,
            m.score,
            m.flags_label()
        ));
    }

    if !result.qc_log.is_empty() {
        lines.push("QC log:".to_string());
        for entry in &result.qc_log {
            lines.push(format!("  • {entry}"));
        }
    }
    lines.join("\n")
}
