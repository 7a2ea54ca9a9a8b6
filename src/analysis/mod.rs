//! Line identification engine.
//!
//! Architecture:
//! ```text
//!   Spectrum (calibration)
//!        │
//!        ├──────────────┐
//!        ▼              ▼
//!   ┌────────┐    ┌──────────┐
//!   │ peaks  │    │ plateau  │  flat-top segments
//!   └────────┘    └──────────┘
//!        │              │
//!        ▼              │
//!   ┌─────────────────┐ │
//!   │ matcher, offset │ │      library lookup + robust drift correction
//!   └─────────────────┘ │
//!        │              │
//!        ▼              │
//!   ┌──────────────┐    │
//!   │ rules, gating│    │      weak evidence, label caps
//!   └──────────────┘    │
//!        │              │
//!        ▼              ▼
//!   ┌──────────────────────┐
//!   │ mode → qc → sigma    │   see `pipeline`
//!   └──────────────────────┘
//! ```

pub mod calibration;
pub mod gating;
pub mod matcher;
pub mod mode;
pub mod offset;
pub mod peaks;
pub mod pipeline;
pub mod plateau;
pub mod qc;
pub mod rules;
pub mod sigma;
pub mod stats;
