use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};

use super::filter::{unique_categories, YearRange};
use super::model::{RawRecord, SourceTable};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Source layout
// ---------------------------------------------------------------------------

/// Column names and delimiter of an INE-style CSV export.
///
/// The defaults match the tables downloaded from the INE web site:
///
/// ```text
/// Sectores/unidad;Años;Total
/// Total (miles de euros);2021;17.249.048
/// Empresas: Total (miles de euros);2021;9.568.216
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceLayout {
    /// Field delimiter; sniffed from the header line when absent.
    pub delimiter: Option<char>,
    pub category_column: String,
    pub year_column: String,
    pub value_column: String,
    /// Only set for tables that carry several measures per category.
    pub metric_column: Option<String>,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            delimiter: None,
            category_column: "Sectores/unidad".into(),
            year_column: "Años".into(),
            value_column: "Total".into(),
            metric_column: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load one raw source file.
pub fn load_source(path: &Path, layout: &SourceLayout, coverage: YearRange) -> Result<SourceTable> {
    let delimiter = match layout.delimiter {
        Some(d) => delimiter_byte(d, path)?,
        None => sniff_delimiter(BufReader::new(File::open(path)?))?,
    };
    let file = File::open(path)?;
    let records = read_records(file, layout, delimiter, path)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    log::info!(
        "loaded {name}: {} records, {} categories, coverage {coverage}",
        records.len(),
        unique_categories(&records).len()
    );

    Ok(SourceTable {
        name,
        path: path.to_path_buf(),
        coverage,
        records,
    })
}

/// Parse records from any reader. `path` is only used in error messages.
pub fn read_records<R: Read>(
    reader: R,
    layout: &SourceLayout,
    delimiter: u8,
    path: &Path,
) -> Result<Vec<RawRecord>> {
    let mut rdr = ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let find = |name: &str| -> Result<usize> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| PipelineError::Source {
                path: path.to_path_buf(),
                line: 1,
                message: format!("missing column '{name}' (found {headers:?})"),
            })
    };

    let category_idx = find(&layout.category_column)?;
    let year_idx = find(&layout.year_column)?;
    let value_idx = find(&layout.value_column)?;
    let metric_idx = layout.metric_column.as_deref().map(find).transpose()?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let field = |idx: usize| record.get(idx).unwrap_or("");

        let year = parse_year(field(year_idx)).ok_or_else(|| PipelineError::Source {
            path: path.to_path_buf(),
            line,
            message: format!("unreadable year '{}'", field(year_idx)),
        })?;

        records.push(RawRecord {
            year,
            category: field(category_idx).to_string(),
            metric: metric_idx.map(|i| field(i).to_string()),
            raw: non_empty(&record, value_idx),
            line,
        });
    }

    Ok(records)
}

/// Pick the most frequent of `;`, `,` and tab in the header line.
pub fn sniff_delimiter<R: BufRead>(mut reader: R) -> Result<u8> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let candidates = [b';', b',', b'\t'];
    let best = candidates
        .iter()
        .copied()
        .max_by_key(|c| header.bytes().filter(|b| b == c).count())
        .unwrap_or(b';');
    if header.bytes().all(|b| !candidates.contains(&b)) {
        log::debug!("no delimiter in header line, defaulting to ';'");
        return Ok(b';');
    }
    Ok(best)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn delimiter_byte(d: char, path: &Path) -> Result<u8> {
    if d.is_ascii() {
        Ok(d as u8)
    } else {
        Err(PipelineError::Config(format!(
            "{}: delimiter {d:?} is not a single-byte character",
            path.display()
        )))
    }
}

/// Accepts `2021` as well as annotated years such as `2021 (P)`.
fn parse_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if let Ok(y) = s.parse() {
        return Some(y);
    }
    let digits: String = s.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.len() == 4 {
        digits.parse().ok()
    } else {
        None
    }
}

fn non_empty(record: &StringRecord, idx: usize) -> Option<String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\u{feff}Sectores/unidad;Años;Total\n\
        Total (miles de euros);2021;17.249.048\n\
        Empresas: Total (miles de euros);2021 (P);9.568.216\n\
        IPSFL: Total (miles de euros);2021;\n";

    #[test]
    fn reads_ine_layout() {
        let records = read_records(
            Cursor::new(SAMPLE),
            &SourceLayout::default(),
            b';',
            Path::new("gastos.csv"),
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].category, "Total (miles de euros)");
        assert_eq!(records[0].raw.as_deref(), Some("17.249.048"));
        assert_eq!(records[0].line, 2);
        assert_eq!(records[1].year, 2021);
        assert_eq!(records[2].raw, None);
        assert!(records.iter().all(|r| r.metric.is_none()));
    }

    #[test]
    fn missing_column_is_a_source_error() {
        let layout = SourceLayout {
            value_column: "Valor".into(),
            ..SourceLayout::default()
        };
        let err = read_records(Cursor::new(SAMPLE), &layout, b';', Path::new("x.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::Source { line: 1, .. }));
    }

    #[test]
    fn bad_year_reports_line() {
        let data = "Sectores/unidad;Años;Total\nTotal;dos mil;1\n";
        let err = read_records(
            Cursor::new(data),
            &SourceLayout::default(),
            b';',
            Path::new("x.csv"),
        )
        .unwrap_err();
        match err {
            PipelineError::Source { line, message, .. } => {
                assert_eq!(line, 2);
                assert!(message.contains("dos mil"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn metric_column_is_optional() {
        let data = "Sector,Medida,Año,Valor\nEmpresas,Gasto,2020,\"1.000\"\n";
        let layout = SourceLayout {
            delimiter: Some(','),
            category_column: "Sector".into(),
            year_column: "Año".into(),
            value_column: "Valor".into(),
            metric_column: Some("Medida".into()),
        };
        let records = read_records(Cursor::new(data), &layout, b',', Path::new("x.csv")).unwrap();
        assert_eq!(records[0].metric.as_deref(), Some("Gasto"));
        assert_eq!(records[0].raw.as_deref(), Some("1.000"));
    }

    #[test]
    fn sniffs_common_delimiters() {
        assert_eq!(sniff_delimiter(Cursor::new("a;b;c\n1;2;3")).unwrap(), b';');
        assert_eq!(sniff_delimiter(Cursor::new("a,b,c\n")).unwrap(), b',');
        assert_eq!(sniff_delimiter(Cursor::new("a\tb\n")).unwrap(), b'\t');
        assert_eq!(sniff_delimiter(Cursor::new("single\n")).unwrap(), b';');
    }
}
