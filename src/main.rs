use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rd_spain::analysis::{log_summary, summarize_family, write_summary_json};
use rd_spain::data::filter::YearRange;
use rd_spain::{pipeline, PipelineConfig};

/// Consolidate, clean and summarize the INE R&D tables.
#[derive(Parser, Debug)]
#[command(name = "rd-spain", version, about)]
struct Cli {
    /// TOML configuration; without it the standard layout under --data-dir is used.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root of raw/, interim/ and processed/ for the standard layout.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// First year of the period (overrides the configuration).
    #[arg(long)]
    start: Option<i32>,

    /// Last year of the period (overrides the configuration).
    #[arg(long)]
    end: Option<i32>,

    /// Also write every cleaned table as Parquet next to its CSV.
    #[arg(long)]
    parquet: bool,

    /// Write the descriptive summary as JSON.
    #[arg(long)]
    summary: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => PipelineConfig::standard(&cli.data_dir),
    };

    if cli.start.is_some() || cli.end.is_some() {
        config.years = YearRange::new(
            cli.start.unwrap_or(config.years.start),
            cli.end.unwrap_or(config.years.end),
        )?;
    }
    if cli.parquet {
        for family in &mut config.families {
            if family.parquet.is_none() {
                family.parquet = Some(family.cleaned.with_extension("parquet"));
            }
        }
    }
    if cli.summary.is_some() {
        config.summary = cli.summary.clone();
    }

    log::info!(
        "period {}, {} families",
        config.years,
        config.families.len()
    );

    let outcomes = pipeline::run(&config).context("running cleaning pipeline")?;

    let summaries: Vec<_> = outcomes.iter().map(|o| summarize_family(&o.wide)).collect();
    for summary in &summaries {
        log_summary(summary);
    }
    if let Some(path) = &config.summary {
        write_summary_json(&summaries, path)
            .with_context(|| format!("writing summary {}", path.display()))?;
    }

    log::info!("done");
    Ok(())
}
