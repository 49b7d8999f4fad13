use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::data::filter::{filter_period, YearRange};
use crate::data::model::{ColumnKey, ConsolidatedTable, RawRecord, SourceTable, SourcedRecord};
use crate::error::{Issue, PipelineError, Result, StageReport};

/// Which source currently owns a (year, column) cell.
struct Owner<'a> {
    source: usize,
    raw: Option<&'a str>,
}

/// Merge the sources of one family into a single table restricted to `range`.
///
/// Each source only contributes rows inside its own coverage window. When a
/// cell appears in several sources the one with the latest window wins.
/// Sources tied at that window must agree, otherwise consolidation fails with
/// [`PipelineError::AmbiguousSource`]. The outcome does not depend on the
/// order of `sources`. Years in `range` that no source covers are reported as
/// [`Issue::MissingYear`].
///
/// Duplicates inside a single source are kept as-is; the pivot rejects them.
pub fn consolidate(
    family: &str,
    sources: &[SourceTable],
    range: YearRange,
) -> Result<(ConsolidatedTable, StageReport)> {
    let mut report = StageReport::new("consolidate");

    let restricted: Vec<Vec<RawRecord>> = sources
        .iter()
        .map(|s| {
            let in_range = filter_period(&s.records, range);
            let total = in_range.len();
            let kept: Vec<RawRecord> = in_range
                .into_iter()
                .filter(|r| s.coverage.contains(r.year))
                .collect();
            if kept.len() < total {
                log::warn!(
                    "{}: ignoring {} record(s) outside its coverage {}",
                    s.name,
                    total - kept.len(),
                    s.coverage
                );
            }
            kept
        })
        .collect();

    // Pass 1a: latest window that carries each cell.
    let mut latest: BTreeMap<(i32, ColumnKey), (i32, i32)> = BTreeMap::new();
    for (idx, records) in restricted.iter().enumerate() {
        let recency = sources[idx].coverage.recency();
        for rec in records {
            latest
                .entry((rec.year, rec.key()))
                .and_modify(|r| *r = (*r).max(recency))
                .or_insert(recency);
        }
    }

    // Pass 1b: owner among the sources at that window; ties must agree.
    let mut owners: BTreeMap<(i32, ColumnKey), Owner<'_>> = BTreeMap::new();
    let mut overridden = 0usize;

    for (idx, records) in restricted.iter().enumerate() {
        let recency = sources[idx].coverage.recency();
        for rec in records {
            let key = (rec.year, rec.key());
            if latest[&key] != recency {
                overridden += 1;
                continue;
            }
            match owners.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(Owner {
                        source: idx,
                        raw: rec.raw.as_deref(),
                    });
                }
                Entry::Occupied(slot) => {
                    let current = slot.get();
                    if current.source != idx && current.raw != rec.raw.as_deref() {
                        let window = sources[idx].coverage;
                        return Err(PipelineError::AmbiguousSource {
                            first: sources[current.source].name.clone(),
                            second: sources[idx].name.clone(),
                            start: window.start,
                            end: window.end,
                            year: rec.year,
                            column: rec.key().label(),
                            first_raw: current.raw.map(str::to_string),
                            second_raw: rec.raw.clone(),
                        });
                    }
                }
            }
        }
    }

    // Pass 2: keep every record of its owning source.
    let mut records: Vec<SourcedRecord> = Vec::new();
    for (idx, recs) in restricted.iter().enumerate() {
        for rec in recs {
            let owned = owners
                .get(&(rec.year, rec.key()))
                .is_some_and(|o| o.source == idx);
            if owned {
                records.push(SourcedRecord {
                    record: rec.clone(),
                    source: sources[idx].name.clone(),
                });
            }
        }
    }
    records.sort_by(|a, b| {
        (a.record.year, &a.record.category, &a.record.metric).cmp(&(
            b.record.year,
            &b.record.category,
            &b.record.metric,
        ))
    });

    let covered: BTreeSet<i32> = records.iter().map(|r| r.record.year).collect();
    for year in range.years().filter(|y| !covered.contains(y)) {
        report.push(Issue::MissingYear {
            family: family.to_string(),
            year,
        });
    }

    log::info!(
        "{family}: consolidated {} sources into {} records for {range} ({} overlapping cells resolved by recency)",
        sources.len(),
        records.len(),
        overridden
    );

    Ok((
        ConsolidatedTable {
            family: family.to_string(),
            range,
            records,
        },
        report,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn source(name: &str, coverage: (i32, i32), rows: &[(i32, &str, &str)]) -> SourceTable {
        SourceTable {
            name: name.into(),
            path: PathBuf::from(name),
            coverage: YearRange::new(coverage.0, coverage.1).unwrap(),
            records: rows
                .iter()
                .enumerate()
                .map(|(i, (year, cat, raw))| RawRecord {
                    year: *year,
                    category: cat.to_string(),
                    metric: None,
                    raw: Some(raw.to_string()),
                    line: i + 2,
                })
                .collect(),
        }
    }

    fn range(start: i32, end: i32) -> YearRange {
        YearRange::new(start, end).unwrap()
    }

    #[test]
    fn overlapping_year_comes_from_later_source() {
        let old = source(
            "old.csv",
            (2019, 2021),
            &[(2019, "Total", "1"), (2020, "Total", "2"), (2021, "Total", "3")],
        );
        let new = source(
            "new.csv",
            (2021, 2022),
            &[(2021, "Total", "30"), (2022, "Total", "40")],
        );

        // Order of the inputs must not matter.
        for sources in [vec![old.clone(), new.clone()], vec![new, old]] {
            let (table, report) = consolidate("gastos", &sources, range(2019, 2022)).unwrap();
            let y2021: Vec<_> = table.records.iter().filter(|r| r.record.year == 2021).collect();
            assert_eq!(y2021.len(), 1);
            assert_eq!(y2021[0].record.raw.as_deref(), Some("30"));
            assert_eq!(y2021[0].source, "new.csv");
            assert_eq!(table.years(), vec![2019, 2020, 2021, 2022]);
            assert!(report.is_clean());
        }
    }

    #[test]
    fn restricts_to_range_and_reports_gaps() {
        let s = source(
            "s.csv",
            (1998, 2003),
            &[(1998, "Total", "1"), (2000, "Total", "2"), (2003, "Total", "3")],
        );
        let (table, report) = consolidate("fondos", &[s], range(2000, 2003)).unwrap();
        assert_eq!(table.years(), vec![2000, 2003]);
        assert_eq!(report.missing_years(), vec![2001, 2002]);
    }

    #[test]
    fn equal_windows_that_disagree_are_flagged() {
        let a = source("a.csv", (2020, 2021), &[(2021, "Total", "1")]);
        let b = source("b.csv", (2020, 2021), &[(2021, "Total", "2")]);
        let err = consolidate("gastos", &[a, b], range(2020, 2021)).unwrap_err();
        assert!(matches!(err, PipelineError::AmbiguousSource { year: 2021, .. }));
    }

    #[test]
    fn tied_older_sources_are_ignored_once_a_newer_one_wins() {
        let a1 = source("a1.csv", (2000, 2021), &[(2021, "Total", "1")]);
        let a2 = source("a2.csv", (2000, 2021), &[(2021, "Total", "2")]);
        let b = source("b.csv", (2021, 2024), &[(2021, "Total", "3")]);

        let orders = [
            vec![a1.clone(), a2.clone(), b.clone()],
            vec![a1.clone(), b.clone(), a2.clone()],
            vec![b, a2, a1],
        ];
        for sources in orders {
            let (table, _) = consolidate("gastos", &sources, range(2021, 2021)).unwrap();
            assert_eq!(table.len(), 1);
            assert_eq!(table.records[0].source, "b.csv");
            assert_eq!(table.records[0].record.raw.as_deref(), Some("3"));
        }
    }

    #[test]
    fn tied_newest_sources_are_flagged_in_any_order() {
        let old = source("old.csv", (2000, 2021), &[(2021, "Total", "1")]);
        let b1 = source("b1.csv", (2021, 2024), &[(2021, "Total", "2")]);
        let b2 = source("b2.csv", (2021, 2024), &[(2021, "Total", "3")]);

        let orders = [
            vec![b1.clone(), b2.clone(), old.clone()],
            vec![b1.clone(), old.clone(), b2.clone()],
            vec![old, b2, b1],
        ];
        for sources in orders {
            let err = consolidate("gastos", &sources, range(2021, 2021)).unwrap_err();
            assert!(matches!(err, PipelineError::AmbiguousSource { year: 2021, .. }));
        }
    }

    #[test]
    fn rows_outside_source_coverage_are_ignored() {
        let old = source("old.csv", (2000, 2021), &[(2019, "Total", "1")]);
        let new = source("new.csv", (2021, 2024), &[(2019, "Total", "99"), (2021, "Total", "3")]);
        for sources in [vec![old.clone(), new.clone()], vec![new, old]] {
            let (table, _) = consolidate("gastos", &sources, range(2019, 2021)).unwrap();
            let y2019: Vec<_> = table.records.iter().filter(|r| r.record.year == 2019).collect();
            assert_eq!(y2019.len(), 1);
            assert_eq!(y2019[0].source, "old.csv");
        }
    }

    #[test]
    fn equal_windows_that_agree_keep_one_copy() {
        let a = source("a.csv", (2020, 2021), &[(2021, "Total", "1")]);
        let b = source("b.csv", (2020, 2021), &[(2021, "Total", "1")]);
        let (table, _) = consolidate("gastos", &[a, b], range(2021, 2021)).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].source, "a.csv");
    }

    #[test]
    fn duplicates_within_one_source_survive() {
        let s = source("s.csv", (2020, 2020), &[(2020, "Total", "1"), (2020, "Total", "2")]);
        let (table, _) = consolidate("gastos", &[s], range(2020, 2020)).unwrap();
        assert_eq!(table.len(), 2);
    }
}
