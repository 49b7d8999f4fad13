//! Cleaning pipeline for the INE tables on R&D spending in Spain.
//!
//! Raw publications are consolidated per metric family, their
//! locale-formatted figures parsed, pivoted to one row per year and renamed
//! to stable column names. See [`pipeline`] for the stage layout.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
