//! Spectral line identification for hobbyist spectrometer captures.
//!
//! ```text
//!   .csv / .json / .parquet        band photo (.png / .jpg)
//!          │                          │           │
//!          ▼                          ▼           ▼
//!     data::loader            band::capture   band::hint
//!          │                          │           │
//!          ▼                          ▼           │
//!     RawCapture ──────────────► analysis::pipeline::analyze ◄── LineLibrary
//!                                         │
//!                                         ▼
//!                                  AnalysisResult
//!                                         │
//!                                         ▼
//!                             report (union, export, summary)
//! ```

pub mod analysis;
pub mod band;
pub mod config;
pub mod data;
pub mod error;
pub mod report;

pub use analysis::mode::{BandHint, HintDirection, LampGuess, SpectrumMode};
pub use analysis::pipeline::{analyze, AnalysisResult};
pub use config::{AnalysisConfig, ModeSetting};
pub use data::model::{LineLibrary, Match, MatchFlag, RawCapture, Signal};
pub use error::{DataQualityWarning, EngineError, EngineResult};
