use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// RawCapture – the rows of one spectrometer dataset
// ---------------------------------------------------------------------------

/// Intensity columns of a capture: either colour channels or a precomputed trace.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Rgb(Vec<[f64; 3]>),
    Intensity(Vec<f64>),
}

impl Signal {
    pub fn len(&self) -> usize {
        match self {
            Signal::Rgb(v) => v.len(),
            Signal::Intensity(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scalar intensity per sample: `max(R, G, B)` or the trace itself.
    pub fn scalar(&self) -> Vec<f64> {
        match self {
            Signal::Rgb(v) => v.iter().map(|c| c[0].max(c[1]).max(c[2])).collect(),
            Signal::Intensity(v) => v.clone(),
        }
    }
}

/// Columnar capture as read from a dataset or derived from a band photo.
///
/// Pixel values need not be sorted; calibration orders the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCapture {
    pub pixel: Vec<f64>,
    /// Calibrated wavelength column (nm), used verbatim when present.
    pub wavelength: Option<Vec<f64>>,
    pub signal: Signal,
}

impl RawCapture {
    pub fn len(&self) -> usize {
        self.pixel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixel.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reference line library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Atom,
    Band,
}

impl LineKind {
    /// Library files are loose here: anything mentioning "band" is a band.
    pub fn from_label(label: &str) -> Self {
        if label.trim().to_ascii_lowercase().contains("band") {
            LineKind::Band
        } else {
            LineKind::Atom
        }
    }
}

/// One reference line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub species: String,
    pub ref_nm: f64,
    pub kind: LineKind,
}

/// The reference lines of a run, in load order. Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LineLibrary {
    entries: Vec<LibraryEntry>,
}

impl LineLibrary {
    /// Validate and wrap entries. Load order is kept; it breaks matcher ties.
    pub fn new(entries: Vec<LibraryEntry>) -> EngineResult<Self> {
        if entries.is_empty() {
            return Err(EngineError::EmptyLibrary);
        }
        for (index, e) in entries.iter().enumerate() {
            if e.species.trim().is_empty() {
                return Err(EngineError::InvalidLibraryEntry {
                    index,
                    reason: "empty species".into(),
                });
            }
            if !e.ref_nm.is_finite() {
                return Err(EngineError::InvalidLibraryEntry {
                    index,
                    reason: format!("ref_nm {} is not finite", e.ref_nm),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[LibraryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Species tag used for gating: the first whitespace token, so band systems
/// such as "N2 2P" and "N2 1P" count as one species "N2".
pub fn species_key(species: &str) -> &str {
    species.split_whitespace().next().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Match – one candidate identification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchFlag {
    /// A multi-line species seen without its companion lines.
    WeakEvidence,
    /// Synthesised from a saturated plateau rather than a detected peak.
    PlateauGuess,
}

impl MatchFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchFlag::WeakEvidence => "weak_evidence",
            MatchFlag::PlateauGuess => "plateau_guess",
        }
    }
}

impl fmt::Display for MatchFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key: species plus reference wavelength in picometres.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub species: String,
    pub ref_pm: i64,
}

impl MatchKey {
    pub fn new(species: &str, ref_nm: f64) -> Self {
        Self {
            species: species.to_string(),
            ref_pm: (ref_nm * 1000.0).round() as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Match {
    pub measured_nm: f64,
    /// `measured_nm + offset`.
    pub corrected_nm: f64,
    pub ref_nm: f64,
    pub species: String,
    pub kind: LineKind,
    /// `ref_nm - corrected_nm`.
    pub residual_nm: f64,
    pub rel_strength: f64,
    pub score: f64,
    /// Relative confidence 1..=6, assigned once the final set is known.
    pub sigma: u8,
    pub flags: BTreeSet<MatchFlag>,
    /// Detector pixel interpolated from the calibration, if known.
    pub pixel: Option<f64>,
}

impl Match {
    pub fn new(
        entry: &LibraryEntry,
        measured_nm: f64,
        offset_nm: f64,
        rel_strength: f64,
        score: f64,
    ) -> Self {
        let corrected_nm = measured_nm + offset_nm;
        Self {
            measured_nm,
            corrected_nm,
            ref_nm: entry.ref_nm,
            species: entry.species.clone(),
            kind: entry.kind,
            residual_nm: entry.ref_nm - corrected_nm,
            rel_strength,
            score,
            sigma: 3,
            flags: BTreeSet::new(),
            pixel: None,
        }
    }

    pub fn key(&self) -> MatchKey {
        MatchKey::new(&self.species, self.ref_nm)
    }

    pub fn species_key(&self) -> &str {
        species_key(&self.species)
    }

    /// Re-anchor the correction, keeping the measured position.
    pub fn apply_offset(&mut self, offset_nm: f64) {
        self.corrected_nm = self.measured_nm + offset_nm;
        self.residual_nm = self.ref_nm - self.corrected_nm;
    }

    pub fn has_flag(&self, flag: MatchFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn flags_label(&self) -> String {
        self.flags
            .iter()
            .map(MatchFlag::as_str)
            .collect::<Vec<_>>()
            .join("|")
    }
}
