//! Data layer: core types and loading.
//!
//! Architecture:
//! ```text
//!  .csv / .json / .parquet        line_library.json
//!        │                              │
//!        ▼                              ▼
//!   ┌──────────┐                 ┌──────────────┐
//!   │  loader  │  normalise      │    loader    │  validate entries
//!   └──────────┘  column names   └──────────────┘
//!        │                              │
//!        ▼                              ▼
//!   ┌────────────┐               ┌─────────────┐
//!   │ RawCapture │  px, nm?,     │ LineLibrary │  species, ref_nm, kind
//!   └────────────┘  RGB | I      └─────────────┘
//! ```

pub mod loader;
pub mod model;
