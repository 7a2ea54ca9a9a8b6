//! Reporting side: what leaves a run.
//!
//! ```text
//!   AnalysisResult (dataset)   AnalysisResult (band)
//!            │                        │
//!            └──────────┬─────────────┘
//!                       ▼
//!                 ┌───────────┐
//!                 │  union    │  merge by (species, ref), tag source
//!                 └───────────┘
//!                       │
//!                       ▼
//!                 ┌───────────┐
//!                 │  export   │  lines.csv, result.json
//!                 └───────────┘
//!
//!   summary: human-readable analysis log of one result
//! ```

pub mod export;
pub mod summary;
pub mod union;
