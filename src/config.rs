use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Tuned constants
// ---------------------------------------------------------------------------

/// Factory quadratic fit `nm = A2·px² + A1·px + A0`.
pub const FACTORY_A2: f64 = 8.45736375e-06;
pub const FACTORY_A1: f64 = 0.406760986;
pub const FACTORY_A0: f64 = 375.834988;

/// Denominator guard for normalisation.
pub const NORM_EPS: f64 = 1e-12;

pub const DEFAULT_TOLERANCE_NM: f64 = 2.0;
pub const DEFAULT_MIN_DIST_NM: f64 = 2.0;

pub const PEAK_REL_EPS: f64 = 0.01;
pub const PEAK_MERGE_NM: f64 = 1.5;

pub const PLATEAU_REL_TOP: f64 = 0.92;
pub const PLATEAU_REL_EPS: f64 = 0.012;

/// Tolerance floors for the three matching passes.
pub const OFFSET_TOL_FACTOR: f64 = 3.0;
pub const OFFSET_TOL_MIN_NM: f64 = 3.0;
pub const INITIAL_TOL_MIN_NM: f64 = 3.0;
pub const CORRECTED_TOL_MIN_NM: f64 = 2.5;

// Mode selection. Empirically tuned; the asymmetry between the hinted and
// the inconclusive case is intentional.
pub const HINT_MIN_CONFIDENCE: f64 = 0.25;
pub const HINT_OVERRIDE_EXTRA_MATCHES: usize = 5;
pub const HINT_OVERRIDE_SCORE_RATIO: f64 = 1.15;
pub const NO_HINT_EXTRA_MATCHES: usize = 3;
pub const NO_HINT_SCORE_RATIO: f64 = 1.05;
pub const EMISSION_VETO_CONFIDENCE: f64 = 0.20;

/// Fluorescent lamp signature.
pub const HG_BLUE_NM: f64 = 435.833;
pub const HG_GREEN_NM: f64 = 546.074;
pub const NARROW_FWHM_NM: f64 = 2.5;
pub const BROAD_FWHM_NM: f64 = 5.0;

pub const WEAK_EVIDENCE_FACTOR: f64 = 0.6;
pub const HG_RESIDUAL_MIN_NM: f64 = 2.5;

pub const MAX_LABELS: usize = 56;
pub const MAX_LABELS_PER_50NM: usize = 8;
pub const MAX_SPECIES_PER_50NM: usize = 4;
pub const MAX_SPECIES_GLOBAL: usize = 14;
pub const GATING_WINDOW_NM: f64 = 50.0;

pub const PLATEAU_EXISTING_NM: f64 = 3.0;
pub const PLATEAU_SEARCH_NM: f64 = 15.0;
pub const PLATEAU_GUESSES: usize = 2;
pub const PLATEAU_GUESS_SCORE: f64 = 10.0;

pub const LOCAL_PEAK_WINDOW_NM: f64 = 3.2;

pub const FALLBACK_MIN_MATCHES: usize = 3;
pub const FALLBACK_TOL_MIN_NM: f64 = 4.0;

// ---------------------------------------------------------------------------
// Mode setting
// ---------------------------------------------------------------------------

/// How the intensity trace should be interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    #[default]
    Auto,
    Emission,
    Absorption,
}

impl fmt::Display for ModeSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModeSetting::Auto => write!(f, "auto"),
            ModeSetting::Emission => write!(f, "emission"),
            ModeSetting::Absorption => write!(f, "absorption"),
        }
    }
}

impl FromStr for ModeSetting {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ModeSetting::Auto),
            "emission" | "em" => Ok(ModeSetting::Emission),
            "absorption" | "abs" => Ok(ModeSetting::Absorption),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection scales
// ---------------------------------------------------------------------------

/// One smoothing strength of the multi-scale peak detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Boxcar kernel size in samples.
    pub kernel: usize,
    /// Height threshold relative to the smoothed maximum.
    pub rel_height: f64,
}

pub fn default_scales() -> Vec<Scale> {
    [(9, 0.08), (7, 0.06), (5, 0.04), (3, 0.03)]
        .into_iter()
        .map(|(kernel, rel_height)| Scale { kernel, rel_height })
        .collect()
}

// ---------------------------------------------------------------------------
// AnalysisConfig
// ---------------------------------------------------------------------------

/// User-facing knobs of a run. Everything else is a named constant above.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub mode: ModeSetting,
    /// Matching tolerance (nm).
    pub tolerance_nm: f64,
    /// Minimum separation between matched peaks (nm).
    pub min_dist_nm: f64,
    pub scales: Vec<Scale>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            mode: ModeSetting::Auto,
            tolerance_nm: DEFAULT_TOLERANCE_NM,
            min_dist_nm: DEFAULT_MIN_DIST_NM,
            scales: default_scales(),
        }
    }
}

impl AnalysisConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let cfg: AnalysisConfig = serde_json::from_str(&text).context("parsing config JSON")?;
        Ok(cfg)
    }

    /// Tolerance and minimum separation must be positive and finite.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in [
            ("tolerance_nm", self.tolerance_nm),
            ("min_dist_nm", self.min_dist_nm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(EngineError::InvalidSetting { name, value });
            }
        }
        Ok(())
    }
}
