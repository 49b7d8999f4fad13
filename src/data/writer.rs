use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int32Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use super::model::{ConsolidatedTable, WideTable};
use crate::error::Result;

/// Name of the index column in wide snapshots.
pub const YEAR_COLUMN: &str = "Años";

// ---------------------------------------------------------------------------
// CSV snapshots
// ---------------------------------------------------------------------------

/// Long-format snapshot: `year,category,metric,raw,source`, values untouched.
pub fn write_consolidated_csv(table: &ConsolidatedTable, path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(create(path)?);
    wtr.write_record(["year", "category", "metric", "raw", "source"])?;
    for sr in &table.records {
        let r = &sr.record;
        wtr.write_record([
            r.year.to_string().as_str(),
            r.category.as_str(),
            r.metric.as_deref().unwrap_or(""),
            r.raw.as_deref().unwrap_or(""),
            sr.source.as_str(),
        ])?;
    }
    wtr.flush()?;
    log::info!(
        "{}: wrote {} consolidated records to {}",
        table.family,
        table.len(),
        path.display()
    );
    Ok(())
}

/// Wide snapshot indexed by year. Absent cells are empty fields; columns that
/// carry shares get a `<name>_pct` companion.
pub fn write_wide_csv(table: &WideTable, path: &Path) -> Result<()> {
    let share_cols: Vec<usize> = (0..table.columns.len())
        .filter(|&i| table.has_shares(i))
        .collect();

    let mut header = vec![YEAR_COLUMN.to_string()];
    header.extend(table.columns.iter().map(|c| c.name.clone()));
    header.extend(share_cols.iter().map(|&i| share_column_name(&table.columns[i].name)));

    let mut wtr = csv::Writer::from_writer(create(path)?);
    wtr.write_record(&header)?;
    for row in &table.rows {
        let mut fields = vec![row.year.to_string()];
        fields.extend(row.values.iter().map(|v| format_cell(*v)));
        fields.extend(share_cols.iter().map(|&i| format_cell(row.shares[i])));
        wtr.write_record(&fields)?;
    }
    wtr.flush()?;
    log::info!(
        "{}: wrote {} years x {} columns to {}",
        table.family,
        table.len(),
        header.len() - 1,
        path.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet export
// ---------------------------------------------------------------------------

/// Same layout as [`write_wide_csv`]: `Int32` year, nullable `Float64` cells.
pub fn write_wide_parquet(table: &WideTable, path: &Path) -> Result<()> {
    let batch = wide_to_record_batch(table)?;
    let mut writer = ArrowWriter::try_new(create(path)?, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;
    log::info!("{}: wrote parquet {}", table.family, path.display());
    Ok(())
}

pub fn wide_to_record_batch(table: &WideTable) -> Result<RecordBatch> {
    let mut fields = vec![Field::new(YEAR_COLUMN, DataType::Int32, false)];
    let mut arrays: Vec<ArrayRef> = vec![Arc::new(Int32Array::from(
        table.rows.iter().map(|r| r.year).collect::<Vec<_>>(),
    ))];

    for (i, col) in table.columns.iter().enumerate() {
        fields.push(Field::new(&col.name, DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(
            table.rows.iter().map(|r| r.values[i]).collect::<Vec<_>>(),
        )));
    }
    for (i, col) in table.columns.iter().enumerate() {
        if !table.has_shares(i) {
            continue;
        }
        fields.push(Field::new(share_column_name(&col.name), DataType::Float64, true));
        arrays.push(Arc::new(Float64Array::from(
            table.rows.iter().map(|r| r.shares[i]).collect::<Vec<_>>(),
        )));
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn share_column_name(name: &str) -> String {
    format!("{name}_pct")
}

fn format_cell(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

/// Create `path`, making its parent directories first.
pub(crate) fn create(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(File::create(path)?)
}
