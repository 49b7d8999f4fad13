//! Cleaning pipeline: one pure stage per module, composed per family.
//!
//! ```text
//!  raw CSV (x2 windows)
//!        │  data::loader
//!        ▼
//!   ┌─────────────┐
//!   │ consolidate │  restrict years, newer window wins ──► interim CSV
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │  normalize  │  "1.234,56 (5,1%)" → (1234.56, 5.1)
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │    pivot    │  long → one row per year
//!   └─────────────┘
//!        │
//!        ▼
//!   ┌─────────────┐
//!   │   rename    │  raw labels → stable names ──► processed CSV
//!   └─────────────┘
//! ```

pub mod consolidate;
pub mod normalize;
pub mod pivot;
pub mod rename;

use crate::config::{FamilyConfig, PipelineConfig};
use crate::data::filter::{filter_categories, YearRange};
use crate::data::loader::load_source;
use crate::data::model::{CleanRecord, ConsolidatedTable, SourceTable, WideTable};
use crate::data::writer::{write_consolidated_csv, write_wide_csv, write_wide_parquet};
use crate::error::{Result, StageReport};

use self::consolidate::consolidate;
use self::normalize::{separate_percentage_rows, Normalizer};
use self::pivot::pivot;
use self::rename::ColumnRenamer;

/// Everything one family produced.
#[derive(Debug, Clone)]
pub struct FamilyOutcome {
    pub consolidated: ConsolidatedTable,
    /// Rows dropped because their unit is a percentage.
    pub percentage_rows: usize,
    pub clean: Vec<CleanRecord>,
    pub wide: WideTable,
    pub reports: Vec<StageReport>,
}

impl FamilyOutcome {
    pub fn issue_count(&self) -> usize {
        self.reports.iter().map(|r| r.issues.len()).sum()
    }
}

/// Output of the stages after consolidation.
#[derive(Debug, Clone)]
pub struct Cleaned {
    pub percentage_rows: usize,
    pub clean: Vec<CleanRecord>,
    pub wide: WideTable,
    pub report: StageReport,
}

// ---------------------------------------------------------------------------
// Pure composition
// ---------------------------------------------------------------------------

/// Category selection, then consolidation.
pub fn consolidate_family(
    family: &FamilyConfig,
    sources: &[SourceTable],
    range: YearRange,
) -> Result<(ConsolidatedTable, StageReport)> {
    if family.categories.is_empty() {
        return consolidate(&family.name, sources, range);
    }
    let selected: Vec<SourceTable> = sources
        .iter()
        .map(|s| SourceTable {
            records: filter_categories(&s.records, &family.categories),
            ..s.clone()
        })
        .collect();
    consolidate(&family.name, &selected, range)
}

/// Percentage split, normalization, pivot and renaming.
pub fn clean_consolidated(
    family: &FamilyConfig,
    table: ConsolidatedTable,
    normalizer: &Normalizer,
) -> Result<Cleaned> {
    let range = table.range;
    let (absolute, percentage) = separate_percentage_rows(table);
    let (clean, report) = normalizer.normalize_table(&absolute);
    report.log();

    let wide = pivot(&family.name, &clean, range)?;
    let wide = ColumnRenamer::for_family(&family.name, family.kind, &family.rename).apply(wide)?;

    Ok(Cleaned {
        percentage_rows: percentage.len(),
        clean,
        wide,
        report,
    })
}

/// All stages over already-loaded sources, without touching the filesystem.
pub fn clean_family(
    family: &FamilyConfig,
    sources: &[SourceTable],
    range: YearRange,
    normalizer: &Normalizer,
) -> Result<FamilyOutcome> {
    let (consolidated, consolidate_report) = consolidate_family(family, sources, range)?;
    consolidate_report.log();
    let cleaned = clean_consolidated(family, consolidated.clone(), normalizer)?;
    Ok(FamilyOutcome {
        consolidated,
        percentage_rows: cleaned.percentage_rows,
        clean: cleaned.clean,
        wide: cleaned.wide,
        reports: vec![consolidate_report, cleaned.report],
    })
}

// ---------------------------------------------------------------------------
// File-backed runs
// ---------------------------------------------------------------------------

/// Load, clean and persist one family.
///
/// The consolidated snapshot is written before cleaning starts, so it is
/// available even when a later stage fails.
pub fn run_family(family: &FamilyConfig, config: &PipelineConfig) -> Result<FamilyOutcome> {
    log::info!("── {} ({}) ──", family.name, family.kind);

    let sources = family
        .sources
        .iter()
        .map(|s| load_source(&s.path, &s.layout, s.coverage))
        .collect::<Result<Vec<_>>>()?;

    let (consolidated, consolidate_report) = consolidate_family(family, &sources, config.years)?;
    consolidate_report.log();
    write_consolidated_csv(&consolidated, &family.consolidated)?;

    let normalizer = Normalizer::with_markers(config.missing_markers.iter().cloned());
    let cleaned = clean_consolidated(family, consolidated.clone(), &normalizer)?;

    write_wide_csv(&cleaned.wide, &family.cleaned)?;
    if let Some(path) = &family.parquet {
        write_wide_parquet(&cleaned.wide, path)?;
    }

    Ok(FamilyOutcome {
        consolidated,
        percentage_rows: cleaned.percentage_rows,
        clean: cleaned.clean,
        wide: cleaned.wide,
        reports: vec![consolidate_report, cleaned.report],
    })
}

/// Run every configured family in order; the first structural error stops the run.
pub fn run(config: &PipelineConfig) -> Result<Vec<FamilyOutcome>> {
    config.validate()?;
    let mut outcomes = Vec::with_capacity(config.families.len());
    for family in &config.families {
        let outcome = run_family(family, config)?;
        log::info!(
            "{}: {} years x {} columns, {} issue(s)",
            family.name,
            outcome.wide.len(),
            outcome.wide.columns.len(),
            outcome.issue_count()
        );
        outcomes.push(outcome);
    }
    Ok(outcomes)
}
