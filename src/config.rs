use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::filter::YearRange;
use crate::data::loader::SourceLayout;
use crate::data::model::Family;
use crate::error::{PipelineError, Result};

/// Pipeline configuration, usually read from `pipeline.toml`:
///
/// ```toml
/// years = [2000, 2024]
///
/// [[families]]
/// name = "gastos"
/// kind = "expenditure"
/// consolidated = "data/interim/gastos_consolidado.csv"
/// cleaned = "data/processed/gastos_limpio.csv"
///
/// [[families.sources]]
/// path = "data/raw/gastos_2000_2021.csv"
/// coverage = [2000, 2021]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub years: YearRange,
    /// Added to the built-in "not available" markers.
    #[serde(default)]
    pub missing_markers: Vec<String>,
    /// Where to write the JSON analysis summary, if anywhere.
    #[serde(default)]
    pub summary: Option<PathBuf>,
    pub families: Vec<FamilyConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyConfig {
    pub name: String,
    pub kind: Family,
    pub sources: Vec<SourceConfig>,
    /// Intermediate long-format snapshot.
    pub consolidated: PathBuf,
    /// Final wide-format snapshot.
    pub cleaned: PathBuf,
    #[serde(default)]
    pub parquet: Option<PathBuf>,
    /// Entries added to the family's rename dictionary.
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    /// Restrict to these categories; empty keeps all.
    #[serde(default)]
    pub categories: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub coverage: YearRange,
    #[serde(flatten)]
    pub layout: SourceLayout,
}

impl PipelineConfig {
    /// Read a TOML file. Relative paths are taken relative to its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {e}", path.display()))
        })?;
        let mut config: PipelineConfig = toml::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    /// The documented layout: two families, each split in a 2000–2021 and a
    /// 2021–2024 publication.
    ///
    /// ```text
    /// <dir>/raw/{gastos,fondos}_2000_2021.csv
    /// <dir>/raw/{gastos,fondos}_2021_2024.csv
    /// <dir>/interim/{gastos,fondos}_consolidado.csv
    /// <dir>/processed/{gastos,fondos}_limpio.csv
    /// ```
    pub fn standard(dir: &Path) -> Self {
        let family = |name: &str, kind: Family| {
            let source = |first: i32, last: i32| SourceConfig {
                path: dir.join("raw").join(format!("{name}_{first}_{last}.csv")),
                coverage: YearRange {
                    start: first,
                    end: last,
                },
                layout: SourceLayout::default(),
            };
            FamilyConfig {
                name: name.to_string(),
                kind,
                sources: vec![source(2000, 2021), source(2021, 2024)],
                consolidated: dir.join("interim").join(format!("{name}_consolidado.csv")),
                cleaned: dir.join("processed").join(format!("{name}_limpio.csv")),
                parquet: None,
                rename: BTreeMap::new(),
                categories: BTreeSet::new(),
            }
        };
        Self {
            years: YearRange::default(),
            missing_markers: Vec::new(),
            summary: None,
            families: vec![
                family("gastos", Family::Expenditure),
                family("fondos", Family::Funding),
            ],
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.families.is_empty() {
            return Err(PipelineError::Config("no families configured".into()));
        }
        let mut names = BTreeSet::new();
        for f in &self.families {
            if !names.insert(f.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "family '{}' is configured twice",
                    f.name
                )));
            }
            if f.sources.is_empty() {
                return Err(PipelineError::Config(format!(
                    "family '{}' has no sources",
                    f.name
                )));
            }
        }
        Ok(())
    }

    pub fn family(&self, name: &str) -> Option<&FamilyConfig> {
        self.families.iter().find(|f| f.name == name)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let join = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        if let Some(s) = self.summary.as_mut() {
            join(s);
        }
        for f in &mut self.families {
            join(&mut f.consolidated);
            join(&mut f.cleaned);
            if let Some(p) = f.parquet.as_mut() {
                join(p);
            }
            for s in &mut f.sources {
                join(&mut s.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOML: &str = r#"
years = [2005, 2020]
missing_markers = ["s.d."]

[[families]]
name = "fondos"
kind = "funding"
consolidated = "interim/fondos.csv"
cleaned = "processed/fondos.csv"
parquet = "processed/fondos.parquet"

[families.rename]
"Extranjero: Total (miles de euros)" = "Resto_Mundo"

[[families.sources]]
path = "raw/fondos_a.csv"
coverage = [2000, 2021]
delimiter = ","
category_column = "Origen"

[[families.sources]]
path = "/abs/fondos_b.csv"
coverage = [2021, 2024]
"#;

    #[test]
    fn parses_toml_and_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        fs::write(&path, TOML).unwrap();

        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.years, YearRange::new(2005, 2020).unwrap());
        assert_eq!(cfg.missing_markers, vec!["s.d."]);

        let f = cfg.family("fondos").unwrap();
        assert_eq!(f.kind, Family::Funding);
        assert_eq!(f.cleaned, dir.path().join("processed/fondos.csv"));
        assert_eq!(f.sources[0].path, dir.path().join("raw/fondos_a.csv"));
        assert_eq!(f.sources[1].path, PathBuf::from("/abs/fondos_b.csv"));
        assert_eq!(f.sources[0].layout.delimiter, Some(','));
        assert_eq!(f.sources[0].layout.category_column, "Origen");
        assert_eq!(f.sources[0].layout.year_column, "Años");
        assert_eq!(f.sources[1].layout, SourceLayout::default());
        assert_eq!(f.rename.len(), 1);
    }

    #[test]
    fn year_range_defaults_to_study_period() {
        let cfg: PipelineConfig = toml::from_str(
            r#"
[[families]]
name = "gastos"
kind = "expenditure"
consolidated = "c.csv"
cleaned = "w.csv"
sources = [{ path = "a.csv", coverage = [2000, 2021] }]
"#,
        )
        .unwrap();
        assert_eq!(cfg.years, YearRange::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn duplicate_family_names_are_rejected() {
        let mut cfg = PipelineConfig::standard(Path::new("data"));
        cfg.families[1].name = "gastos".into();
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn standard_layout_has_four_sources() {
        let cfg = PipelineConfig::standard(Path::new("data"));
        let sources: Vec<_> = cfg.families.iter().flat_map(|f| &f.sources).collect();
        assert_eq!(sources.len(), 4);
        assert_eq!(
            sources[1].path,
            Path::new("data/raw/gastos_2021_2024.csv")
        );
        assert!(cfg.validate().is_ok());
    }
}
