use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::model::RawRecord;
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// YearRange – inclusive period of interest
// ---------------------------------------------------------------------------

/// Inclusive `[start, end]` range of years. Written as `[2000, 2024]` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(i32, i32)", into = "(i32, i32)")]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    pub fn new(start: i32, end: i32) -> Result<Self, PipelineError> {
        if start > end {
            return Err(PipelineError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, year: i32) -> bool {
        (self.start..=self.end).contains(&year)
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    /// Ordering used to pick the more recent of two publication windows.
    pub fn recency(&self) -> (i32, i32) {
        (self.end, self.start)
    }
}

impl Default for YearRange {
    /// The period studied: 2000–2024.
    fn default() -> Self {
        Self {
            start: 2000,
            end: 2024,
        }
    }
}

impl fmt::Display for YearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl TryFrom<(i32, i32)> for YearRange {
    type Error = PipelineError;

    fn try_from((start, end): (i32, i32)) -> Result<Self, Self::Error> {
        YearRange::new(start, end)
    }
}

impl From<YearRange> for (i32, i32) {
    fn from(r: YearRange) -> Self {
        (r.start, r.end)
    }
}

// ---------------------------------------------------------------------------
// Record filters
// ---------------------------------------------------------------------------

/// Keep only records whose year falls inside `range`.
pub fn filter_period(records: &[RawRecord], range: YearRange) -> Vec<RawRecord> {
    let kept: Vec<RawRecord> = records
        .iter()
        .filter(|r| range.contains(r.year))
        .cloned()
        .collect();
    log::debug!(
        "period {range}: kept {} of {} records",
        kept.len(),
        records.len()
    );
    kept
}

/// Keep only records of the selected categories.
/// An empty selection means "no filter".
pub fn filter_categories(records: &[RawRecord], selected: &BTreeSet<String>) -> Vec<RawRecord> {
    if selected.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|r| selected.contains(&r.category))
        .cloned()
        .collect()
}

/// Sorted set of distinct categories.
pub fn unique_categories(records: &[RawRecord]) -> BTreeSet<String> {
    records.iter().map(|r| r.category.clone()).collect()
}
