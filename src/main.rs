//! tainthound CLI - scan a source tree and gate CI on the findings.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use tainthound::{render_text, AnalysisConfig, Analyzer, Severity};

/// Taint-flow and vulnerability-pattern analyzer.
#[derive(Parser)]
#[command(
    name = "tainthound",
    version,
    about = "Taint-flow and vulnerability-pattern analyzer",
    long_about = "\
Scans a source tree for injected flaws: SQL injection, command injection,
SSRF, unsafe deserialization, resource leaks, lock-order deadlocks,
check-then-act races, and missing transactions. Every finding carries a
source-to-sink evidence chain.

Exit codes: 0 clean, 1 findings at or above --fail-on, 2 bad configuration."
)]
struct Cli {
    /// Verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a directory tree
    Scan {
        /// Root of the tree to analyze
        path: PathBuf,

        /// JSON configuration file (sources, sinks, detectors, policy)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fail (exit 1) at or above this severity
        #[arg(long)]
        fail_on: Option<String>,

        /// Comma-separated detector ids to enable (default: all)
        #[arg(long)]
        detectors: Option<String>,

        /// Maximum interprocedural taint hops
        #[arg(long)]
        max_hops: Option<usize>,

        /// Do not honor .gitignore patterns
        #[arg(long)]
        no_ignore: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            // Configuration problems are the only fatal startup errors.
            ExitCode::from(2)
        }
    }
}

fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Scan {
            path,
            config,
            fail_on,
            detectors,
            max_hops,
            no_ignore,
            format,
        } => {
            let mut config = match config {
                Some(path) => AnalysisConfig::from_json_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => AnalysisConfig::default(),
            };

            if let Some(fail_on) = fail_on {
                config.fail_on = fail_on
                    .parse::<Severity>()
                    .map_err(|e| anyhow::anyhow!("parsing --fail-on: {e}"))?;
            }
            if let Some(detectors) = detectors {
                config.detectors = detectors
                    .split(',')
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty())
                    .collect();
            }
            if let Some(max_hops) = max_hops {
                config.max_call_depth = max_hops;
            }
            config.validate().context("validating configuration")?;

            let analyzer = Analyzer::new(config).with_no_ignore(no_ignore);
            let report = analyzer
                .run(&path)
                .with_context(|| format!("scanning {}", path.display()))?;

            match format {
                OutputFormat::Json => println!("{}", report.to_json()?),
                OutputFormat::Text => print!("{}", render_text(&report)),
            }

            let code = report.exit_code(analyzer.config().fail_on);
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
    }
}
