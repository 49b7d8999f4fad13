use std::collections::{BTreeMap, BTreeSet};

use crate::data::model::{Family, WideTable};
use crate::error::{PipelineError, Result};

const EXPENDITURE: &[(&str, &str)] = &[
    ("Total (miles de euros)", "Total"),
    ("Administración Pública: Total (miles de euros)", "Admin_Publica"),
    ("Enseñanza Superior: Total (miles de euros)", "Enseñanza_Superior"),
    ("Empresas: Total (miles de euros)", "Empresas"),
    ("IPSFL: Total (miles de euros)", "IPSFL"),
];

const FUNDING: &[(&str, &str)] = &[
    ("Total (miles de euros)", "Total"),
    ("Administración Pública: Total (miles de euros)", "Admin_Publica"),
    ("Empresas: Total (miles de euros)", "Empresas"),
    ("IPSFL: Total (miles de euros)", "IPSFL"),
    ("Resto del Mundo: Total (miles de euros)", "Resto_Mundo"),
];

/// Maps raw source labels to stable column names.
#[derive(Debug, Clone)]
pub struct ColumnRenamer {
    family: String,
    mapping: BTreeMap<String, String>,
    targets: BTreeSet<String>,
}

impl ColumnRenamer {
    /// Built-in dictionary of `kind`, extended (or overridden) by `extra`.
    pub fn for_family(family: &str, kind: Family, extra: &BTreeMap<String, String>) -> Self {
        let base = match kind {
            Family::Expenditure => EXPENDITURE,
            Family::Funding => FUNDING,
        };
        let mut mapping: BTreeMap<String, String> = base
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect();
        mapping.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        let targets = mapping.values().cloned().collect();
        Self {
            family: family.to_string(),
            mapping,
            targets,
        }
    }

    /// New name for `label`. Already-renamed labels map to themselves.
    pub fn resolve(&self, label: &str) -> Result<String> {
        if let Some(to) = self.mapping.get(label) {
            return Ok(to.clone());
        }
        if self.targets.contains(label) {
            return Ok(label.to_string());
        }
        Err(PipelineError::Schema {
            family: self.family.clone(),
            column: label.to_string(),
        })
    }

    /// Rename every column, failing on the first unmapped one.
    ///
    /// Output names must be unique; two columns landing on the same name is
    /// a [`PipelineError::DuplicateColumn`].
    pub fn apply(&self, mut table: WideTable) -> Result<WideTable> {
        let renamed: Vec<String> = table
            .columns
            .iter()
            .map(|c| self.resolve(&c.name))
            .collect::<Result<_>>()?;

        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for (column, name) in table.columns.iter().zip(&renamed) {
            if let Some(first) = seen.insert(name.as_str(), column.name.as_str()) {
                return Err(PipelineError::DuplicateColumn {
                    family: self.family.clone(),
                    name: name.clone(),
                    first: first.to_string(),
                    second: column.name.clone(),
                });
            }
        }

        for (column, name) in table.columns.iter_mut().zip(renamed) {
            if column.name != name {
                log::debug!("{}: '{}' → '{}'", self.family, column.name, name);
                column.name = name;
            }
        }
        log::info!("{}: columns {:?}", self.family, table.column_names());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::YearRange;
    use crate::data::model::{ColumnKey, WideColumn, WideRow};

    fn table(labels: &[&str]) -> WideTable {
        WideTable {
            family: "gastos".into(),
            range: YearRange::new(2000, 2000).unwrap(),
            columns: labels
                .iter()
                .map(|l| WideColumn {
                    key: ColumnKey::new(*l),
                    name: l.to_string(),
                })
                .collect(),
            rows: vec![WideRow {
                year: 2000,
                values: vec![Some(1.0); labels.len()],
                shares: vec![None; labels.len()],
            }],
        }
    }

    #[test]
    fn renames_expenditure_columns() {
        let r = ColumnRenamer::for_family("gastos", Family::Expenditure, &BTreeMap::new());
        let t = r
            .apply(table(&[
                "Empresas: Total (miles de euros)",
                "Total (miles de euros)",
            ]))
            .unwrap();
        assert_eq!(t.column_names(), vec!["Empresas", "Total"]);
        // keys are untouched so the table can still be un-pivoted
        assert_eq!(t.columns[1].key.category, "Total (miles de euros)");
    }

    #[test]
    fn renaming_twice_is_idempotent() {
        let r = ColumnRenamer::for_family("fondos", Family::Funding, &BTreeMap::new());
        let once = r
            .apply(table(&["Resto del Mundo: Total (miles de euros)", "IPSFL: Total (miles de euros)"]))
            .unwrap();
        let twice = r.apply(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.column_names(), vec!["Resto_Mundo", "IPSFL"]);
    }

    #[test]
    fn unmapped_column_is_fatal() {
        let r = ColumnRenamer::for_family("fondos", Family::Funding, &BTreeMap::new());
        // Higher education is an execution sector, not a fund origin.
        let err = r
            .apply(table(&["Enseñanza Superior: Total (miles de euros)"]))
            .unwrap_err();
        match err {
            PipelineError::Schema { family, column } => {
                assert_eq!(family, "fondos");
                assert!(column.starts_with("Enseñanza Superior"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_and_renamed_label_cannot_share_a_name() {
        let r = ColumnRenamer::for_family("gastos", Family::Expenditure, &BTreeMap::new());
        let err = r
            .apply(table(&["Total", "Total (miles de euros)"]))
            .unwrap_err();
        match err {
            PipelineError::DuplicateColumn {
                name,
                first,
                second,
                ..
            } => {
                assert_eq!(name, "Total");
                assert_eq!(first, "Total");
                assert_eq!(second, "Total (miles de euros)");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn two_raw_labels_mapped_to_one_name_are_rejected() {
        let extra: BTreeMap<String, String> =
            [("Total general".to_string(), "Total".to_string())].into_iter().collect();
        let r = ColumnRenamer::for_family("gastos", Family::Expenditure, &extra);
        let err = r
            .apply(table(&["Total (miles de euros)", "Total general"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateColumn { .. }));
    }

    #[test]
    fn extra_entries_extend_the_dictionary() {
        let extra: BTreeMap<String, String> =
            [("Sin clasificar".to_string(), "Otros".to_string())].into_iter().collect();
        let r = ColumnRenamer::for_family("gastos", Family::Expenditure, &extra);
        assert_eq!(r.resolve("Sin clasificar").unwrap(), "Otros");
        assert_eq!(r.resolve("Otros").unwrap(), "Otros");
        assert_eq!(r.resolve("Total (miles de euros)").unwrap(), "Total");
    }
}
