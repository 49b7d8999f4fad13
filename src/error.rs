use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Structural errors – abort the stage that raised them
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A wide-table column has no entry in the family's rename dictionary.
    #[error("{family}: column '{column}' has no mapping in the rename dictionary")]
    Schema { family: String, column: String },

    /// Two wide-table columns were renamed to the same name.
    #[error("{family}: columns '{first}' and '{second}' both rename to '{name}'")]
    DuplicateColumn {
        family: String,
        name: String,
        first: String,
        second: String,
    },

    /// The same (year, category, metric) reached the pivot twice.
    #[error("duplicate cell for year {year}, column '{column}' (lines {first_line} and {second_line})")]
    DuplicateKey {
        year: i32,
        column: String,
        first_line: usize,
        second_line: usize,
    },

    #[error("record for year {year} lies outside {start}-{end}")]
    YearOutOfRange { year: i32, start: i32, end: i32 },

    /// Two sources with the same coverage window disagree on one cell.
    #[error(
        "sources '{first}' and '{second}' share coverage {start}-{end} but disagree on \
         year {year}, column '{column}' ({first_raw:?} vs {second_raw:?})"
    )]
    AmbiguousSource {
        first: String,
        second: String,
        start: i32,
        end: i32,
        year: i32,
        column: String,
        first_raw: Option<String>,
        second_raw: Option<String>,
    },

    #[error("invalid year range {start}-{end}")]
    InvalidRange { start: i32, end: i32 },

    /// Malformed source file (missing column, unreadable year, ...).
    #[error("{}:{line}: {message}", .path.display())]
    Source {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ---------------------------------------------------------------------------
// Row-level issues – collected, reported at the end of a stage
// ---------------------------------------------------------------------------

/// Where a raw value came from, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowContext {
    pub source: String,
    pub line: usize,
    pub year: i32,
    pub category: String,
}

impl fmt::Display for RowContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} (year {}, '{}')",
            self.source, self.line, self.year, self.category
        )
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Issue {
    /// No source covers this year; its cells stay absent.
    #[error("{family}: year {year} is not covered by any source")]
    MissingYear { family: String, year: i32 },

    /// The value could not be parsed and is treated as absent.
    #[error("{context}: cannot parse {raw:?}: {reason}")]
    Parse {
        context: RowContext,
        raw: String,
        reason: String,
    },
}

/// Issues collected by one stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReport {
    pub stage: &'static str,
    pub issues: Vec<Issue>,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn missing_years(&self) -> Vec<i32> {
        self.issues
            .iter()
            .filter_map(|i| match i {
                Issue::MissingYear { year, .. } => Some(*year),
                _ => None,
            })
            .collect()
    }

    pub fn parse_failures(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| matches!(i, Issue::Parse { .. }))
            .count()
    }

    /// Emit every collected issue as one batch of warnings.
    pub fn log(&self) {
        if self.issues.is_empty() {
            log::debug!("{}: no issues", self.stage);
            return;
        }
        log::warn!("{}: {} issue(s)", self.stage, self.issues.len());
        for issue in &self.issues {
            log::warn!("  {issue}");
        }
    }
}
