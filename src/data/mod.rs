//! Data layer: core types, loading, filtering and snapshots.
//!
//! Architecture:
//! ```text
//!  raw INE .csv (`;` or `,`)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  parse file → SourceTable (Vec<RawRecord>)
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter   │  YearRange, category selection
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  writer   │  ConsolidatedTable / WideTable → .csv, .parquet
//!   └──────────┘
//! ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod writer;
