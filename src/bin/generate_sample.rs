//! Writes the four raw INE-style tables of the standard layout:
//! `{gastos,fondos}_2000_2021.csv` and `{gastos,fondos}_2021_2024.csv`.
//!
//! Figures are in thousands of euros and follow the published series closely
//! enough for the pipeline and its summary to be exercised end to end.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Total internal R&D expenditure, thousands of euros, 2000–2024.
const TOTALS: [(i32, i64); 25] = [
    (2000, 5_718_988),
    (2001, 6_227_157),
    (2002, 7_193_538),
    (2003, 8_213_036),
    (2004, 8_945_761),
    (2005, 10_196_871),
    (2006, 11_815_218),
    (2007, 13_342_371),
    (2008, 14_701_393),
    (2009, 14_581_676),
    (2010, 14_588_455),
    (2011, 14_184_295),
    (2012, 13_391_607),
    (2013, 13_011_798),
    (2014, 12_820_756),
    (2015, 13_171_807),
    (2016, 13_259_730),
    (2017, 14_052_028),
    (2018, 14_946_055),
    (2019, 15_572_041),
    (2020, 15_768_000),
    (2021, 17_249_048),
    (2022, 19_325_408),
    (2023, 22_379_000),
    (2024, 23_954_000),
];

/// 2021 as first published in the 2000–2021 table, before revision.
const PROVISIONAL_2021: i64 = 17_100_000;

const TOTAL: &str = "Total (miles de euros)";

/// Execution sectors: label prefix and share of the total at t=0 and t=1.
const SECTORS: [(&str, f64, f64); 3] = [
    ("Administración Pública", 0.157, 0.170),
    ("Enseñanza Superior", 0.300, 0.260),
    ("Empresas", 0.540, 0.565),
];
const SECTOR_REMAINDER: &str = "IPSFL";

/// Fund origins, same convention.
const ORIGINS: [(&str, f64, f64); 3] = [
    ("Administración Pública", 0.390, 0.400),
    ("IPSFL", 0.007, 0.007),
    ("Resto del Mundo", 0.070, 0.080),
];
const ORIGIN_REMAINDER: &str = "Empresas";

/// Years for which the IPSFL funding figure was not published.
const UNPUBLISHED_IPSFL: [i32; 3] = [2000, 2001, 2002];

#[derive(Clone, Copy, PartialEq)]
enum Style {
    /// One absolute row per sector plus a percentage row.
    PercentageRows,
    /// `value (share%)` in a single cell.
    Combined,
    Plain,
}

struct Row {
    category: String,
    year: i32,
    value: String,
}

fn main() -> Result<()> {
    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data"));
    let raw_dir = out_dir.join("raw");
    fs::create_dir_all(&raw_dir).with_context(|| format!("creating {}", raw_dir.display()))?;

    let old: Vec<(i32, i64)> = TOTALS
        .iter()
        .filter(|(y, _)| *y <= 2021)
        .map(|&(y, t)| if y == 2021 { (y, PROVISIONAL_2021) } else { (y, t) })
        .collect();
    let new: Vec<(i32, i64)> = TOTALS.iter().copied().filter(|(y, _)| *y >= 2021).collect();

    let files = [
        ("gastos_2000_2021.csv", expenditure(&old, Style::PercentageRows)),
        ("gastos_2021_2024.csv", expenditure(&new, Style::Plain)),
        ("fondos_2000_2021.csv", funding(&old, Style::Plain)),
        ("fondos_2021_2024.csv", funding(&new, Style::Combined)),
    ];

    for (name, rows) in &files {
        let path = raw_dir.join(name);
        write_ine_csv(&path, rows)?;
        println!("Wrote {} rows to {}", rows.len(), path.display());
    }
    Ok(())
}

fn expenditure(totals: &[(i32, i64)], style: Style) -> Vec<Row> {
    split_totals(totals, &SECTORS, SECTOR_REMAINDER, style, |_, _| false)
}

fn funding(totals: &[(i32, i64)], style: Style) -> Vec<Row> {
    split_totals(totals, &ORIGINS, ORIGIN_REMAINDER, style, |label, year| {
        label == "IPSFL" && UNPUBLISHED_IPSFL.contains(&year)
    })
}

/// Rows grouped by category, most recent year first, as INE exports them.
fn split_totals(
    totals: &[(i32, i64)],
    parts: &[(&str, f64, f64)],
    remainder: &str,
    style: Style,
    unpublished: impl Fn(&str, i32) -> bool,
) -> Vec<Row> {
    let mut labels: Vec<&str> = parts.iter().map(|p| p.0).collect();
    labels.push(remainder);

    // Per year: (label, value) for every component.
    let components: Vec<Vec<(&str, i64)>> = totals
        .iter()
        .map(|&(year, total)| {
            let t = (year - 2000) as f64 / 24.0;
            let mut values: Vec<(&str, i64)> = parts
                .iter()
                .map(|&(label, a, b)| (label, (total as f64 * (a + (b - a) * t)).round() as i64))
                .collect();
            let assigned: i64 = values.iter().map(|v| v.1).sum();
            values.push((remainder, total - assigned));
            values
        })
        .collect();

    let mut rows = Vec::new();
    for &(year, total) in totals.iter().rev() {
        rows.push(Row {
            category: TOTAL.to_string(),
            year,
            value: format_thousands(total),
        });
    }
    for label in &labels {
        for (i, &(year, total)) in totals.iter().enumerate().rev() {
            let value = components[i]
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, v)| *v)
                .unwrap_or_default();
            let share = value as f64 / total as f64 * 100.0;
            let cell = if unpublished(*label, year) {
                "..".to_string()
            } else if style == Style::Combined {
                format!("{} ({}%)", format_thousands(value), format_decimal(share))
            } else {
                format_thousands(value)
            };
            rows.push(Row {
                category: format!("{label}: {TOTAL}"),
                year,
                value: cell,
            });
        }
        if style == Style::PercentageRows {
            for (i, &(year, total)) in totals.iter().enumerate().rev() {
                let value = components[i]
                    .iter()
                    .find(|(l, _)| l == label)
                    .map(|(_, v)| *v)
                    .unwrap_or_default();
                rows.push(Row {
                    category: format!("{label}: Porcentaje sobre el total (%)"),
                    year,
                    value: format_decimal(value as f64 / total as f64 * 100.0),
                });
            }
        }
    }
    rows
}

fn write_ine_csv(path: &Path, rows: &[Row]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["Sectores/unidad", "Años", "Total"])?;
    for row in rows {
        wtr.write_record([
            row.category.as_str(),
            row.year.to_string().as_str(),
            row.value.as_str(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// `5718988` → `"5.718.988"`.
fn format_thousands(v: i64) -> String {
    let digits = v.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if v < 0 {
        out.push('-');
    }
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// One decimal with a comma: `55.23` → `"55,2"`.
fn format_decimal(v: f64) -> String {
    format!("{v:.1}").replace('.', ",")
}
