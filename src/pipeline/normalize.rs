//! Locale-aware numeric parsing.
//!
//! INE publishes figures with `.` as thousands separator and `,` as decimal
//! separator (`17.249.048`, `1,25`). Some exports append the share of the
//! total in parentheses: `9.568.216 (55,5%)`.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::data::model::{CleanRecord, ConsolidatedTable, SourcedRecord};
use crate::error::{Issue, RowContext, StageReport};

const NUMBER: &str = r"[+-]?(?:\d{1,3}(?:\.\d{3})+|\d+)(?:,\d+)?";

static VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^(?P<value>{NUMBER})\s*(?:\(\s*(?P<share>{NUMBER})\s*%\s*\))?$"
    ))
    .expect("value pattern compiles")
});

static SHARE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^(?P<share>{NUMBER})\s*%$")).expect("share pattern compiles"));

/// Markers INE and derived exports use for "not available".
pub const DEFAULT_MISSING_MARKERS: &[&str] = &["", "..", "...", "N/A", "n/a", "NA", "-"];

/// A parsed cell. Both fields absent means the source marked it missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Normalized {
    pub value: Option<f64>,
    pub share: Option<f64>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct ParseFailure {
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Normalizer {
    missing_markers: BTreeSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_markers(std::iter::empty::<String>())
    }
}

impl Normalizer {
    /// Default markers plus `extra`.
    pub fn with_markers<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut missing_markers: BTreeSet<String> =
            DEFAULT_MISSING_MARKERS.iter().map(|m| m.to_string()).collect();
        missing_markers.extend(extra.into_iter().map(Into::into));
        Self { missing_markers }
    }

    pub fn is_missing(&self, s: &str) -> bool {
        self.missing_markers.contains(s)
    }

    /// Parse one raw cell.
    pub fn parse(&self, raw: &str) -> Result<Normalized, ParseFailure> {
        let s = strip_quotes(raw.trim()).trim();
        if self.is_missing(s) {
            return Ok(Normalized::default());
        }

        if let Some(caps) = VALUE_RE.captures(s) {
            let value = locale_to_f64(&caps["value"])?;
            let share = caps
                .name("share")
                .map(|m| locale_to_f64(m.as_str()))
                .transpose()?;
            return Ok(Normalized {
                value: Some(value),
                share,
            });
        }

        if let Some(caps) = SHARE_RE.captures(s) {
            return Ok(Normalized {
                value: None,
                share: Some(locale_to_f64(&caps["share"])?),
            });
        }

        Err(ParseFailure {
            reason: "not a locale-formatted number".into(),
        })
    }

    /// Normalize every record of a consolidated table.
    ///
    /// Parse failures are collected into the returned report; the affected
    /// cell is kept with an absent value.
    pub fn normalize_table(&self, table: &ConsolidatedTable) -> (Vec<CleanRecord>, StageReport) {
        let mut report = StageReport::new("normalize");
        let mut missing = 0usize;

        let records: Vec<CleanRecord> = table
            .records
            .iter()
            .map(|sr| {
                let rec = &sr.record;
                let parsed = match rec.raw.as_deref() {
                    None => Normalized::default(),
                    Some(raw) => self.parse(raw).unwrap_or_else(|failure| {
                        report.push(Issue::Parse {
                            context: RowContext {
                                source: sr.source.clone(),
                                line: rec.line,
                                year: rec.year,
                                category: rec.category.clone(),
                            },
                            raw: raw.to_string(),
                            reason: failure.reason,
                        });
                        Normalized::default()
                    }),
                };
                if parsed.value.is_none() {
                    missing += 1;
                }
                CleanRecord {
                    year: rec.year,
                    key: rec.key(),
                    value: parsed.value,
                    share: parsed.share,
                    line: rec.line,
                }
            })
            .collect();

        log::info!(
            "{}: normalized {} records ({} absent, {} unparseable)",
            table.family,
            records.len(),
            missing,
            report.parse_failures()
        );
        (records, report)
    }
}

/// Parse with the default missing markers.
pub fn normalize_value(raw: &str) -> Result<Normalized, ParseFailure> {
    static DEFAULT: Lazy<Normalizer> = Lazy::new(Normalizer::default);
    DEFAULT.parse(raw)
}

// ---------------------------------------------------------------------------
// Percentage rows
// ---------------------------------------------------------------------------

/// Split off rows whose unit label is a percentage
/// (e.g. `"Empresas: Porcentaje sobre el total (%)"`).
///
/// Returns `(absolute, percentage)`; the table keeps only absolute rows.
pub fn separate_percentage_rows(table: ConsolidatedTable) -> (ConsolidatedTable, Vec<SourcedRecord>) {
    let (percentage, absolute): (Vec<SourcedRecord>, Vec<SourcedRecord>) = table
        .records
        .into_iter()
        .partition(|sr| sr.record.category.contains('%'));

    log::info!(
        "{}: {} absolute rows, {} percentage rows set aside",
        table.family,
        absolute.len(),
        percentage.len()
    );

    (
        ConsolidatedTable {
            family: table.family,
            range: table.range,
            records: absolute,
        },
        percentage,
    )
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn strip_quotes(s: &str) -> &str {
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// `"1.234,56"` → `1234.56`. Input must already match `NUMBER`.
fn locale_to_f64(s: &str) -> Result<f64, ParseFailure> {
    let standard: String = s
        .chars()
        .filter(|c| *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    standard.parse::<f64>().map_err(|e| ParseFailure {
        reason: format!("{standard:?}: {e}"),
    })
}
