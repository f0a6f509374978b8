//! # guisplit - command-line front
//!
//! Reads the JSON models written by the front-end, reports which widgets
//! trigger each listener command and optionally splits shared listeners.
//!
//! ## Usage
//!
//! ```bash
//! # Attribute the commands of every model under a directory
//! guisplit models/
//!
//! # Split listeners, writing the rewritten models elsewhere
//! guisplit models/ --refactor -o split/
//!
//! # Split into closures and show the resulting classes without writing
//! guisplit app.json --refactor --as-lambda --print -n
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use guisplit::config::Config;
use guisplit::model::{discover_models, AnalysisModel};
use guisplit::pipeline::{AnalysisReport, Pipeline};
use guisplit::printer::render_tree;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for guisplit
#[derive(Parser)]
#[command(name = "guisplit")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Model files or directories holding them
    ///
    /// Directories are searched recursively for `*.json` files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Split listeners holding several commands
    ///
    /// Overrides configuration file if specified.
    #[arg(short, long)]
    refactor: bool,

    /// Build closures rather than anonymous classes when splitting
    #[arg(short = 'l', long)]
    as_lambda: bool,

    /// Output directory for refactored models
    ///
    /// Models are rewritten in place when neither this option nor the
    /// configuration names a directory.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Dry run - report and refactor in memory without writing models
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Print the classes of each model after refactoring
    #[arg(short, long)]
    print: bool,

    /// Print the attribution report as JSON
    #[arg(long)]
    json: bool,

    /// Path to configuration file
    ///
    /// If not specified, guisplit will search for `.guisplit.toml` in the
    /// current directory and its parents.
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is unset
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();
}

/// Where the refactored model of `input` is written.
fn output_path(input: &Path, directory: Option<&Path>) -> PathBuf {
    match (directory, input.file_name()) {
        (Some(dir), Some(name)) => dir.join(name),
        _ => input.to_path_buf(),
    }
}

fn print_report(path: &Path, report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(report).context("Failed to serialize the report")?;
        println!("{}", rendered);
    } else {
        println!("== {}", path.display());
        print!("{}", report);
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path).context(format!(
            "Failed to load configuration from {:?}",
            config_path
        ))?
    } else {
        Config::load_from_current_dir()
    };

    // Merge command-line arguments with configuration
    config.merge_with_args(
        args.refactor.then_some(true),
        args.as_lambda.then_some(true),
        args.output.clone(),
        args.print.then_some(true),
    );
    if args.json {
        config.output.json = true;
    }

    let models = discover_models(&args.inputs);
    if models.is_empty() {
        bail!("No model files found under {:?}", args.inputs);
    }
    tracing::info!("{} model file(s) to analyse", models.len());

    let pipeline = Pipeline::from_config(&config);
    let directory = config.output.directory.as_deref();
    if let Some(dir) = directory {
        if config.analysis.refactor && !args.dry_run {
            fs::create_dir_all(dir)
                .context(format!("Failed to create output directory {:?}", dir))?;
        }
    }

    let mut failures = 0;
    for path in &models {
        let mut model = match AnalysisModel::from_file(path) {
            Ok(model) => model,
            Err(err) => {
                tracing::error!("{}", err);
                failures += 1;
                continue;
            }
        };

        let report = pipeline.run(&mut model);
        print_report(path, &report, config.output.json)?;

        let rewritten = report.refactorings.iter().any(|r| r.is_applied());
        if rewritten && !args.dry_run {
            let target = output_path(path, directory);
            model
                .save_to_file(&target)
                .context(format!("Failed to write refactored model {:?}", target))?;
            tracing::info!("wrote {}", target.display());
        }
        if config.output.print {
            print!("{}", render_tree(&model.tree));
        }
    }

    if failures > 0 {
        bail!("{} of {} model file(s) could not be read", failures, models.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_directory() {
        let input = Path::new("models/app.json");
        assert_eq!(
            output_path(input, Some(Path::new("split"))),
            PathBuf::from("split/app.json")
        );
        assert_eq!(output_path(input, None), PathBuf::from("models/app.json"));
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["guisplit", "models", "--refactor", "-l", "-o", "out"]);
        assert!(args.refactor);
        assert!(args.as_lambda);
        assert_eq!(args.output, Some(PathBuf::from("out")));
        assert_eq!(args.log_level, "warn");
    }
}
