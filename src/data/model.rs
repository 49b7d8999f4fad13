use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::filter::YearRange;

// ---------------------------------------------------------------------------
// Family – which INE table a record belongs to
// ---------------------------------------------------------------------------

/// Metric family of an INE table. Each family has its own rename dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    /// Internal R&D expenditure by execution sector.
    Expenditure,
    /// Internal R&D expenditure by origin of funds.
    Funding,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::Expenditure => write!(f, "expenditure"),
            Family::Funding => write!(f, "funding"),
        }
    }
}

// ---------------------------------------------------------------------------
// RawRecord – one row of a source table
// ---------------------------------------------------------------------------

/// A single row as read from a source file, value still in source format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub year: i32,
    /// Sector or fund-origin label, e.g. `"Empresas: Total (miles de euros)"`.
    pub category: String,
    /// `None` when the source carries a single measure.
    pub metric: Option<String>,
    /// `None` when the cell was empty in the file.
    pub raw: Option<String>,
    /// 1-based line in the source file (header is line 1).
    pub line: usize,
}

impl RawRecord {
    pub fn key(&self) -> ColumnKey {
        ColumnKey {
            category: self.category.clone(),
            metric: self.metric.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceTable – one raw file
// ---------------------------------------------------------------------------

/// All records read from one raw file plus the window it was published for.
#[derive(Debug, Clone)]
pub struct SourceTable {
    /// Short display name (file name for loaded sources).
    pub name: String,
    pub path: PathBuf,
    /// Years the publication covers; later windows win on overlap.
    pub coverage: YearRange,
    pub records: Vec<RawRecord>,
}

impl SourceTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// ConsolidatedTable – one table per family, years restricted
// ---------------------------------------------------------------------------

/// A consolidated record remembers which source it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcedRecord {
    pub record: RawRecord,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct ConsolidatedTable {
    pub family: String,
    pub range: YearRange,
    /// Sorted by (year, category, metric).
    pub records: Vec<SourcedRecord>,
}

impl ConsolidatedTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct years that have at least one record.
    pub fn years(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.records.iter().map(|r| r.record.year).collect();
        years.dedup();
        years
    }
}

// ---------------------------------------------------------------------------
// ColumnKey / CleanRecord
// ---------------------------------------------------------------------------

/// Identifies one wide-table column: a (category, metric) pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnKey {
    pub category: String,
    pub metric: Option<String>,
}

impl ColumnKey {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            metric: None,
        }
    }

    pub fn with_metric(category: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            metric: Some(metric.into()),
        }
    }

    /// Raw column label used before renaming.
    pub fn label(&self) -> String {
        match &self.metric {
            Some(m) => format!("{} / {}", self.category, m),
            None => self.category.clone(),
        }
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A record after numeric normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanRecord {
    pub year: i32,
    pub key: ColumnKey,
    /// Absolute value, `None` when missing or unparseable.
    pub value: Option<f64>,
    /// Percentage carried alongside the value, e.g. `"1.234 (5,6%)"`.
    pub share: Option<f64>,
    pub line: usize,
}

// ---------------------------------------------------------------------------
// WideTable – one row per year
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WideColumn {
    pub key: ColumnKey,
    /// Output name; starts as `key.label()` and changes on rename.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub year: i32,
    /// One cell per column, same order as `WideTable::columns`.
    pub values: Vec<Option<f64>>,
    pub shares: Vec<Option<f64>>,
}

/// Year-indexed table. Every year of `range` appears exactly once, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct WideTable {
    pub family: String,
    pub range: YearRange,
    pub columns: Vec<WideColumn>,
    pub rows: Vec<WideRow>,
}

impl WideTable {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn row(&self, year: i32) -> Option<&WideRow> {
        if !self.range.contains(year) {
            return None;
        }
        self.rows.get((year - self.range.start) as usize)
    }

    /// Cell lookup by year and output column name.
    pub fn value(&self, year: i32, column: &str) -> Option<f64> {
        let idx = self.column_index(column)?;
        self.row(year).and_then(|r| r.values[idx])
    }

    /// `(year, value)` pairs of one column, absent cells included.
    pub fn series(&self, column: &str) -> Option<Vec<(i32, Option<f64>)>> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(|r| (r.year, r.values[idx])).collect())
    }

    /// Whether any row carries a share for this column.
    pub fn has_shares(&self, idx: usize) -> bool {
        self.rows.iter().any(|r| r.shares[idx].is_some())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
