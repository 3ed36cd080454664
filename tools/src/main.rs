//! cohort-runner: headless pipeline runner for the synthetic cohort dataset.
//!
//! Usage:
//!   cohort-runner generate --seed 42 --out-dir data/raw
//!   cohort-runner metrics --raw-dir data/raw --out-dir data/processed
//!   cohort-runner report --raw-dir data/raw --processed-dir data/processed --out-dir outputs
//!   cohort-runner all --seed 42 --data-dir data --out-dir outputs

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cohort_core::{
    config::{GeneratorConfig, MetricsConfig},
    generator::{CohortGenerator, Generation},
    metrics::{build_kpis, read_kpis, write_kpis},
    report::{build_report, write_report},
    tables::{read_dataset, write_dataset},
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cohort-runner", about = "Generate, aggregate and report on a calibrated synthetic cohort")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate the client, engagement and access-site tables.
    Generate {
        /// Master seed. Overrides the seed in the profile.
        #[arg(long)]
        seed: Option<u64>,
        /// JSON calibration profile. Defaults to the built-in 2022-2023 profile.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "data/raw")]
        out_dir: PathBuf,
    },
    /// Aggregate generated tables into KPI tables and the watchlist.
    Metrics {
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,
        #[arg(long, default_value = "data/processed")]
        out_dir: PathBuf,
    },
    /// Render the Markdown summary report.
    Report {
        #[arg(long, default_value = "data/raw")]
        raw_dir: PathBuf,
        #[arg(long, default_value = "data/processed")]
        processed_dir: PathBuf,
        #[arg(long, default_value = "outputs")]
        out_dir: PathBuf,
    },
    /// Run generate, metrics and report end to end.
    All {
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "data")]
        data_dir: PathBuf,
        #[arg(long, default_value = "outputs")]
        out_dir: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Generate { seed, config, out_dir } => {
            run_generate(seed, config.as_deref(), &out_dir)?;
        }
        Command::Metrics { raw_dir, out_dir } => {
            run_metrics(&raw_dir, &out_dir)?;
        }
        Command::Report { raw_dir, processed_dir, out_dir } => {
            run_report(&raw_dir, &processed_dir, &out_dir)?;
        }
        Command::All { seed, config, data_dir, out_dir } => {
            let raw_dir = data_dir.join("raw");
            let processed_dir = data_dir.join("processed");
            run_generate(seed, config.as_deref(), &raw_dir)?;
            run_metrics(&raw_dir, &processed_dir)?;
            run_report(&raw_dir, &processed_dir, &out_dir)?;
        }
    }
    Ok(())
}

fn load_config(seed: Option<u64>, path: Option<&Path>) -> Result<GeneratorConfig> {
    let config = match path {
        Some(p) => GeneratorConfig::load(p)
            .with_context(|| format!("Cannot read profile {}", p.display()))?,
        None => GeneratorConfig::calibrated_2022_2023(),
    };
    Ok(match seed {
        Some(s) => config.with_seed(s),
        None => config,
    })
}

fn run_generate(seed: Option<u64>, config: Option<&Path>, out_dir: &Path) -> Result<()> {
    let config = load_config(seed, config)?;
    let generator = CohortGenerator::new(config).context("Invalid generator profile")?;
    let generation = generator.generate()?;
    let paths = write_dataset(out_dir, &generation.dataset)
        .with_context(|| format!("Cannot write tables to {}", out_dir.display()))?;

    print_summary(&generation);
    println!("Wrote:");
    for p in paths.all() {
        println!("  - {}", p.display());
    }
    Ok(())
}

fn run_metrics(raw_dir: &Path, out_dir: &Path) -> Result<()> {
    let dataset = read_dataset(raw_dir)
        .with_context(|| format!("Cannot read generated tables from {}", raw_dir.display()))?;
    let kpis = build_kpis(&dataset.clients, &dataset.engagements, &MetricsConfig::default())?;
    let paths = write_kpis(out_dir, &kpis)
        .with_context(|| format!("Cannot write KPI tables to {}", out_dir.display()))?;

    println!("Wrote:");
    for p in [&paths.monthly, &paths.programs, &paths.watchlist, &paths.extract] {
        println!("  - {}", p.display());
    }
    Ok(())
}

fn run_report(raw_dir: &Path, processed_dir: &Path, out_dir: &Path) -> Result<()> {
    let dataset = read_dataset(raw_dir)
        .with_context(|| format!("Cannot read generated tables from {}", raw_dir.display()))?;
    let kpis = read_kpis(processed_dir)
        .with_context(|| format!("Cannot read KPI tables from {}", processed_dir.display()))?;
    let report = build_report(&dataset, &kpis)?;
    let paths = write_report(out_dir, &report)
        .with_context(|| format!("Cannot write report to {}", out_dir.display()))?;

    println!("Wrote:");
    println!("  - {}", paths.markdown.display());
    println!("  - {}", paths.watchlist_top.display());
    Ok(())
}

fn print_summary(generation: &Generation) {
    let dataset = &generation.dataset;
    let outcome = &generation.outcome;
    println!("=== GENERATION SUMMARY ===");
    println!("  seed:              {}", generation.seed);
    println!("  clients:           {}", dataset.clients.len());
    println!("  engagements:       {}", dataset.engagements.len());
    println!("  exits:             {}", dataset.exit_count());
    println!("  perm housing:      {}", dataset.perm_housing_count());
    println!("  access visits:     {}", dataset.access_visits.len());
    println!(
        "  exit flips:        {} (draft {})",
        outcome.exits.flip_count(),
        outcome.exits.realized
    );
    println!(
        "  perm flips:        {} (draft {})",
        outcome.perm_housing.flip_count(),
        outcome.perm_housing.realized
    );
    println!("  sentinel fixes:    {}", outcome.consistency_fixes);
    println!();
}
