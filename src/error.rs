use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Fatal errors – the run is aborted before any matching starts
// ---------------------------------------------------------------------------

/// Configuration problems that make a run impossible.
///
/// These are raised before matching begins, so a caller never sees a partial
/// match set.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("pixel column missing (expected one of px/pixel/pix/x)")]
    MissingPixelColumn,

    #[error("could not resolve R, G, B (or intensity) columns")]
    MissingColorColumns,

    #[error("capture has {0} samples, at least 3 are required")]
    TooFewSamples(usize),

    #[error("column '{column}' has {found} values but the pixel column has {expected}")]
    LengthMismatch {
        column: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("wavelength axis contains a non-finite value at sample {0}")]
    NonFiniteWavelength(usize),

    #[error("line library not found: {}", .0.display())]
    LibraryNotFound(PathBuf),

    #[error("could not read line library: {0}")]
    LibraryLoad(String),

    #[error("invalid line library entry at index {index}: {reason}")]
    InvalidLibraryEntry { index: usize, reason: String },

    #[error("line library is empty")]
    EmptyLibrary,

    #[error("{name} must be a positive finite number, got {value}")]
    InvalidSetting { name: &'static str, value: f64 },
}

pub type EngineResult<T> = Result<T, EngineError>;

// ---------------------------------------------------------------------------
// Non-fatal data quality findings
// ---------------------------------------------------------------------------

/// Problems with the data that degrade, but never abort, a run.
///
/// They end up in the QC log handed to the reporting side.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQualityWarning {
    NoPeaksDetected { trace: &'static str },
    TooFewMatches { found: usize, tolerance_nm: f64 },
    FallbackAdopted { tolerance_nm: f64, matches: usize },
    FallbackRejected { tolerance_nm: f64, matches: usize },
    NoLocalPeak { removed: usize },
    UnsortedWavelengths,
}

impl fmt::Display for DataQualityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQualityWarning::NoPeaksDetected { trace } => {
                write!(f, "No peaks detected in the {trace} trace.")
            }
            DataQualityWarning::TooFewMatches {
                found,
                tolerance_nm,
            } => write!(
                f,
                "Only {found} matches after QC at tolerance {tolerance_nm:.2} nm; \
                 retrying with a wider tolerance."
            ),
            DataQualityWarning::FallbackAdopted {
                tolerance_nm,
                matches,
            } => write!(
                f,
                "Fallback at tolerance {tolerance_nm:.2} nm adopted ({matches} matches)."
            ),
            DataQualityWarning::FallbackRejected {
                tolerance_nm,
                matches,
            } => write!(
                f,
                "Fallback at tolerance {tolerance_nm:.2} nm found {matches} matches; \
                 kept the first result."
            ),
            DataQualityWarning::NoLocalPeak { removed } => write!(
                f,
                "Removed {removed} labels without clear local peak \
                 near corrected/measured nm (plateau-aware)."
            ),
            DataQualityWarning::UnsortedWavelengths => {
                write!(f, "Wavelength axis was not monotonic; samples were re-sorted.")
            }
        }
    }
}
