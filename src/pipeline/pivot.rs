use std::collections::{BTreeMap, BTreeSet};

use crate::data::filter::YearRange;
use crate::data::model::{CleanRecord, ColumnKey, WideColumn, WideRow, WideTable};
use crate::error::{PipelineError, Result};

/// Reshape long records into one row per year of `range`.
///
/// Columns are the distinct (category, metric) keys, sorted. A key missing for
/// a year leaves the cell absent. No aggregation happens: a second record for
/// the same (year, key) fails with [`PipelineError::DuplicateKey`].
pub fn pivot(family: &str, records: &[CleanRecord], range: YearRange) -> Result<WideTable> {
    let keys: BTreeSet<&ColumnKey> = records.iter().map(|r| &r.key).collect();
    let columns: Vec<WideColumn> = keys
        .into_iter()
        .map(|k| WideColumn {
            key: k.clone(),
            name: k.label(),
        })
        .collect();
    let col_index: BTreeMap<&ColumnKey, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (&c.key, i))
        .collect();

    let mut rows: Vec<WideRow> = range
        .years()
        .map(|year| WideRow {
            year,
            values: vec![None; columns.len()],
            shares: vec![None; columns.len()],
        })
        .collect();

    // Line of the record that filled each cell, to report duplicates.
    let mut seen: BTreeMap<(i32, usize), usize> = BTreeMap::new();

    for rec in records {
        if !range.contains(rec.year) {
            return Err(PipelineError::YearOutOfRange {
                year: rec.year,
                start: range.start,
                end: range.end,
            });
        }
        let col = col_index[&rec.key];
        if let Some(first_line) = seen.insert((rec.year, col), rec.line) {
            return Err(PipelineError::DuplicateKey {
                year: rec.year,
                column: rec.key.label(),
                first_line,
                second_line: rec.line,
            });
        }
        let row = &mut rows[(rec.year - range.start) as usize];
        row.values[col] = rec.value;
        row.shares[col] = rec.share;
    }

    log::info!(
        "{family}: pivoted {} records into {} years x {} columns",
        records.len(),
        rows.len(),
        columns.len()
    );

    Ok(WideTable {
        family: family.to_string(),
        range,
        columns,
        rows,
    })
}

/// Inverse of [`pivot`]: the cells holding a value or a share, as long records
/// sorted by (year, key). Line numbers are not recoverable and are set to 0.
pub fn unpivot(table: &WideTable) -> Vec<CleanRecord> {
    let mut order: Vec<usize> = (0..table.columns.len()).collect();
    order.sort_by(|a, b| table.columns[*a].key.cmp(&table.columns[*b].key));

    table
        .rows
        .iter()
        .flat_map(|row| {
            order.iter().filter_map(move |&c| {
                let (value, share) = (row.values[c], row.shares[c]);
                if value.is_none() && share.is_none() {
                    return None;
                }
                Some(CleanRecord {
                    year: row.year,
                    key: table.columns[c].key.clone(),
                    value,
                    share,
                    line: 0,
                })
            })
        })
        .collect()
}
