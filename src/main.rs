//! formulab CLI
//!
//! Runs a descriptor search over a CSV file, evaluates a saved report on new
//! rows, or writes a default configuration to start from.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use formulab::utils::stats;
use formulab::{AppConfig, ConfigManager, CsvConnector, RunReport, SearchEngine};
use std::path::PathBuf;

/// Closed-form regression by descriptor search
#[derive(Parser, Debug)]
#[command(name = "formulab")]
#[command(version)]
#[command(about, long_about = None)]
struct Cli {
    /// Debug-level logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for a formula explaining the target column
    Run {
        /// CSV file with a header row; every column but the target is a feature
        #[arg(short, long)]
        data: PathBuf,

        /// Name of the response column
        #[arg(short, long)]
        target: String,

        /// TOML configuration; defaults are used when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Where to write the human-readable run log
        #[arg(long)]
        log: Option<PathBuf>,
    },

    /// Evaluate a saved report on a CSV file
    Eval {
        #[arg(short, long)]
        report: PathBuf,

        #[arg(short, long)]
        data: PathBuf,

        #[arg(short, long)]
        target: String,
    },

    /// Write the default configuration to a TOML file
    InitConfig { path: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    match cli.command {
        Command::Run {
            data,
            target,
            config,
            output,
            log,
        } => run(data, target, config, output, log),
        Command::Eval {
            report,
            data,
            target,
        } => eval(report, data, target),
        Command::InitConfig { path } => {
            let manager = ConfigManager::new();
            manager
                .save_to_file(&path)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn run(
    data: PathBuf,
    target: String,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    log_path: Option<PathBuf>,
) -> Result<()> {
    let manager = ConfigManager::new();
    match &config {
        Some(path) => manager
            .load_from_file(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => manager.load_from_env().context("reading FORMULAB_ overrides")?,
    }
    let config: AppConfig = manager.get()?;

    let dataset = CsvConnector::load_dataset(&data, &target)
        .with_context(|| format!("loading {}", data.display()))?;

    let engine = SearchEngine::new(config)?;
    let report = engine.run(&dataset)?;

    println!("{}", report.formula());
    println!("train rmse: {:.6e}", report.train_rmse);
    if let Some(test) = report.test_rmse {
        println!("test rmse: {:.6e}", test);
    }

    if let Some(path) = output {
        std::fs::write(&path, report.to_json()?)
            .with_context(|| format!("writing {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }
    if let Some(path) = log_path {
        report
            .write_log(&path)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

fn eval(report: PathBuf, data: PathBuf, target: String) -> Result<()> {
    let text = std::fs::read_to_string(&report)
        .with_context(|| format!("reading {}", report.display()))?;
    let report: RunReport = serde_json::from_str(&text).context("parsing report")?;
    let dataset = CsvConnector::load_dataset(&data, &target)
        .with_context(|| format!("loading {}", data.display()))?;

    let predicted = report.predict(&dataset.primitives)?;
    println!("{}", report.formula());
    println!(
        "rmse on {} rows: {:.6e}",
        dataset.n_rows(),
        stats::rmse(predicted.view(), dataset.response.view())
    );
    Ok(())
}
