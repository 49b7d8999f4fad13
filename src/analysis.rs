//! Descriptive statistics over cleaned wide tables.
//!
//! Absent cells are skipped. They never count as zero.

use std::path::Path;

use serde::Serialize;

use crate::data::model::WideTable;
use crate::data::writer::create;
use crate::error::Result;

/// Column that holds the family total after renaming.
pub const TOTAL_COLUMN: &str = "Total";

/// Periods the exploratory analysis comments on: the 2008 financial crisis
/// down to the 2013 trough, and the COVID-19 shock and rebound.
pub const MILESTONES: &[(i32, i32)] = &[(2008, 2013), (2019, 2020), (2020, 2021)];

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct YearValue {
    pub year: i32,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Moments {
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` below two observations.
    pub std_dev: Option<f64>,
    pub min: YearValue,
    pub max: YearValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub column: String,
    pub observations: usize,
    pub first: YearValue,
    pub last: YearValue,
    /// `(last / first - 1) * 100`.
    pub growth_pct: Option<f64>,
    /// Compound annual growth rate between first and last, in percent.
    pub cagr_pct: Option<f64>,
    pub levels: Moments,
    /// Year-over-year change in percent, for consecutive years with data.
    pub yoy_pct: Vec<YearValue>,
    pub yoy: Option<Moments>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub column: String,
    pub value: f64,
    pub pct_of_total: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodChange {
    pub from: i32,
    pub to: i32,
    pub pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: String,
    pub total: Option<SeriesSummary>,
    /// Change of the total over each of [`MILESTONES`] inside the range.
    pub milestones: Vec<PeriodChange>,
    /// Growth of every component between the first and last year.
    pub components: Vec<SeriesSummary>,
    pub composition_first: Vec<Share>,
    pub composition_last: Vec<Share>,
}

// ---------------------------------------------------------------------------
// Series statistics
// ---------------------------------------------------------------------------

/// Observed `(year, value)` pairs of a column.
pub fn observed(table: &WideTable, column: &str) -> Vec<YearValue> {
    table
        .series(column)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(year, v)| v.map(|value| YearValue { year, value }))
        .collect()
}

pub fn moments(points: &[YearValue]) -> Option<Moments> {
    let n = points.len();
    if n == 0 {
        return None;
    }
    let mean = points.iter().map(|p| p.value).sum::<f64>() / n as f64;

    let mut sorted: Vec<f64> = points.iter().map(|p| p.value).collect();
    sorted.sort_by(f64::total_cmp);
    let median = if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    } else {
        sorted[n / 2]
    };

    let std_dev = (n > 1).then(|| {
        let var = points.iter().map(|p| (p.value - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        var.sqrt()
    });

    // First occurrence wins on ties, like pandas idxmax / idxmin.
    let mut min = points[0];
    let mut max = points[0];
    for p in &points[1..] {
        if p.value < min.value {
            min = *p;
        }
        if p.value > max.value {
            max = *p;
        }
    }

    Some(Moments {
        mean,
        median,
        std_dev,
        min,
        max,
    })
}

/// Percent change from `from` to `to`; `None` if either is absent or `from` is 0.
pub fn period_change(table: &WideTable, column: &str, from: i32, to: i32) -> Option<f64> {
    let a = table.value(from, column)?;
    let b = table.value(to, column)?;
    pct_change(a, b)
}

pub fn year_over_year(points: &[YearValue]) -> Vec<YearValue> {
    points
        .windows(2)
        .filter(|w| w[1].year == w[0].year + 1)
        .filter_map(|w| {
            pct_change(w[0].value, w[1].value).map(|value| YearValue {
                year: w[1].year,
                value,
            })
        })
        .collect()
}

pub fn summarize(table: &WideTable, column: &str) -> Option<SeriesSummary> {
    let points = observed(table, column);
    let first = *points.first()?;
    let last = *points.last()?;

    let span = (last.year - first.year) as f64;
    let cagr_pct = (span > 0.0 && first.value > 0.0 && last.value > 0.0)
        .then(|| ((last.value / first.value).powf(1.0 / span) - 1.0) * 100.0);

    let yoy_pct = year_over_year(&points);
    Some(SeriesSummary {
        column: column.to_string(),
        observations: points.len(),
        first,
        last,
        growth_pct: pct_change(first.value, last.value),
        cagr_pct,
        levels: moments(&points)?,
        yoy: moments(&yoy_pct),
        yoy_pct,
    })
}

// ---------------------------------------------------------------------------
// Composition
// ---------------------------------------------------------------------------

/// Share of every non-total column in the total for `year`.
/// Components with an absent cell are left out.
pub fn composition(table: &WideTable, year: i32, total_column: &str) -> Vec<Share> {
    let Some(total) = table.value(year, total_column).filter(|t| *t != 0.0) else {
        return Vec::new();
    };
    table
        .columns
        .iter()
        .filter(|c| c.name != total_column)
        .filter_map(|c| {
            let value = table.value(year, &c.name)?;
            Some(Share {
                column: c.name.clone(),
                value,
                pct_of_total: value / total * 100.0,
            })
        })
        .collect()
}

pub fn summarize_family(table: &WideTable) -> FamilySummary {
    let components = table
        .columns
        .iter()
        .filter(|c| c.name != TOTAL_COLUMN)
        .filter_map(|c| summarize(table, &c.name))
        .collect();
    let milestones = MILESTONES
        .iter()
        .filter_map(|&(from, to)| {
            let pct = period_change(table, TOTAL_COLUMN, from, to)?;
            Some(PeriodChange { from, to, pct })
        })
        .collect();
    FamilySummary {
        family: table.family.clone(),
        total: summarize(table, TOTAL_COLUMN),
        milestones,
        components,
        composition_first: composition(table, table.range.start, TOTAL_COLUMN),
        composition_last: composition(table, table.range.end, TOTAL_COLUMN),
    }
}

/// Log the headline figures of a family summary.
pub fn log_summary(summary: &FamilySummary) {
    let Some(total) = &summary.total else {
        log::warn!("{}: no '{TOTAL_COLUMN}' column to summarize", summary.family);
        return;
    };
    log::info!(
        "{}: {} {:.0} -> {} {:.0} (growth {:.1}%, CAGR {:.2}%)",
        summary.family,
        total.first.year,
        total.first.value,
        total.last.year,
        total.last.value,
        total.growth_pct.unwrap_or(f64::NAN),
        total.cagr_pct.unwrap_or(f64::NAN),
    );
    log::info!(
        "{}: max {:.0} ({}), min {:.0} ({}), mean {:.0}",
        summary.family,
        total.levels.max.value,
        total.levels.max.year,
        total.levels.min.value,
        total.levels.min.year,
        total.levels.mean,
    );
    for m in &summary.milestones {
        log::info!("{}: {}-{} {:+.1}%", summary.family, m.from, m.to, m.pct);
    }
    for share in &summary.composition_last {
        log::info!(
            "{}: {} {:.0} ({:.1}% of {})",
            summary.family,
            share.column,
            share.value,
            share.pct_of_total,
            total.last.year
        );
    }
}

pub fn write_summary_json(summaries: &[FamilySummary], path: &Path) -> Result<()> {
    serde_json::to_writer_pretty(create(path)?, summaries)?;
    log::info!("wrote summary to {}", path.display());
    Ok(())
}

fn pct_change(from: f64, to: f64) -> Option<f64> {
    (from != 0.0).then(|| (to / from - 1.0) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::YearRange;
    use crate::data::model::{ColumnKey, WideColumn, WideRow};

    fn table(rows: &[(i32, Option<f64>, Option<f64>)]) -> WideTable {
        let start = rows[0].0;
        let end = rows[rows.len() - 1].0;
        WideTable {
            family: "gastos".into(),
            range: YearRange::new(start, end).unwrap(),
            columns: vec![
                WideColumn {
                    key: ColumnKey::new("Empresas: Total (miles de euros)"),
                    name: "Empresas".into(),
                },
                WideColumn {
                    key: ColumnKey::new("Total (miles de euros)"),
                    name: "Total".into(),
                },
            ],
            rows: rows
                .iter()
                .map(|(year, e, t)| WideRow {
                    year: *year,
                    values: vec![*e, *t],
                    shares: vec![None, None],
                })
                .collect(),
        }
    }

    #[test]
    fn growth_and_cagr() {
        let t = table(&[
            (2000, Some(50.0), Some(100.0)),
            (2001, None, Some(110.0)),
            (2002, Some(120.0), Some(121.0)),
        ]);
        let s = summarize(&t, "Total").unwrap();
        assert_eq!(s.observations, 3);
        assert!((s.growth_pct.unwrap() - 21.0).abs() < 1e-9);
        assert!((s.cagr_pct.unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(s.yoy_pct.len(), 2);
        assert!((s.yoy_pct[0].value - 10.0).abs() < 1e-9);
        assert_eq!(s.levels.max, YearValue { year: 2002, value: 121.0 });
        assert_eq!(s.levels.min, YearValue { year: 2000, value: 100.0 });
    }

    #[test]
    fn absent_cells_are_skipped_not_zero() {
        let t = table(&[
            (2000, Some(50.0), Some(100.0)),
            (2001, None, Some(110.0)),
            (2002, Some(70.0), Some(121.0)),
        ]);
        let s = summarize(&t, "Empresas").unwrap();
        assert_eq!(s.observations, 2);
        assert_eq!(s.levels.mean, 60.0);
        assert_eq!(s.levels.min.value, 50.0);
        // 2000 and 2002 are not consecutive
        assert!(s.yoy_pct.is_empty());
        assert!(s.yoy.is_none());
    }

    #[test]
    fn moments_use_sample_std_and_even_median() {
        let pts: Vec<YearValue> = [2.0, 4.0, 4.0, 6.0]
            .iter()
            .enumerate()
            .map(|(i, v)| YearValue {
                year: 2000 + i as i32,
                value: *v,
            })
            .collect();
        let m = moments(&pts).unwrap();
        assert_eq!(m.mean, 4.0);
        assert_eq!(m.median, 4.0);
        assert!((m.std_dev.unwrap() - (8.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!(moments(&pts[..1]).unwrap().std_dev.is_none());
        assert!(moments(&[]).is_none());
    }

    #[test]
    fn composition_excludes_total_and_absent_parts() {
        let t = table(&[(2000, Some(25.0), Some(100.0)), (2001, None, Some(50.0))]);
        let first = composition(&t, 2000, "Total");
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].column, "Empresas");
        assert_eq!(first[0].pct_of_total, 25.0);
        assert!(composition(&t, 2001, "Total").is_empty());

        let fam = summarize_family(&t);
        assert_eq!(fam.composition_first, first);
        assert_eq!(fam.components.len(), 1);
    }

    #[test]
    fn period_change_between_two_years() {
        let t = table(&[(2000, None, Some(200.0)), (2001, None, Some(150.0))]);
        assert_eq!(period_change(&t, "Total", 2000, 2001), Some(-25.0));
        assert_eq!(period_change(&t, "Empresas", 2000, 2001), None);
        assert_eq!(period_change(&t, "Nope", 2000, 2001), None);
    }

    #[test]
    fn summary_json_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/2024/summary.json");
        let t = table(&[(2000, Some(25.0), Some(100.0)), (2001, Some(30.0), Some(120.0))]);

        write_summary_json(&[summarize_family(&t)], &path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 1);
    }
}
