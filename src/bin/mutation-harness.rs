use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use mutation_harness::mutation::adapter::{DEFAULT_FRAMEWORK, FRAMEWORKS, adapter_for};
use mutation_harness::mutation::{
    GateStatus, MutationConfig, Orchestrator, ReportFormat, RunOutcome, event_bus_for,
    failure_message, render_report,
};

const LOG_ENV_VAR: &str = "MUTATION_HARNESS_LOG";

#[derive(Debug, Parser)]
#[command(name = "mutation-harness", version)]
#[command(about = "Baseline-gated, parallel mutation testing")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the baseline, then test every mutation in the manifest.
    Run(RunArgs),
    /// List supported test frameworks.
    Frameworks,
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Project directory.
    #[arg(long)]
    project: Option<PathBuf>,
    /// Test framework adapter.
    #[arg(long)]
    framework: Option<String>,
    /// Number of mutants tested concurrently.
    #[arg(long)]
    threads: Option<usize>,
    /// Mutation manifest (JSON array).
    #[arg(long)]
    manifest: Option<PathBuf>,
    /// Optional substring filter on mutation id, label or selector.
    #[arg(long)]
    filter: Option<String>,
    /// Per-mutant timeout in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// JSON config file; flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Append every lifecycle event to this JSONL file.
    #[arg(long)]
    events_log: Option<PathBuf>,
    /// Write per-mutant stdout/stderr logs to this directory.
    #[arg(long)]
    artifacts_dir: Option<PathBuf>,
    /// Report format.
    #[arg(long, value_enum, default_value = "md")]
    format: OutputFormat,
    /// Fail with exit status 2 when the mutation score indicator is below this percentage.
    #[arg(long)]
    min_msi: Option<f64>,
    /// Fail with exit status 2 when more mutants escape.
    #[arg(long)]
    max_escaped: Option<usize>,
    /// Extra test arguments; the program and its arguments for `--framework command`.
    #[arg(last = true)]
    test_args: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Markdown
    Md,
    /// JSON
    Json,
    /// JUnit XML
    Junit,
    /// SARIF
    Sarif,
}

impl From<OutputFormat> for ReportFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Md => ReportFormat::Markdown,
            OutputFormat::Json => ReportFormat::Json,
            OutputFormat::Junit => ReportFormat::Junit,
            OutputFormat::Sarif => ReportFormat::Sarif,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn make_config(args: &RunArgs) -> Result<MutationConfig> {
    let mut config = match &args.config {
        Some(path) => MutationConfig::from_json_file(path)?,
        None => MutationConfig::default(),
    };
    if let Some(project) = &args.project {
        config = config.with_project_dir(project);
    }
    if let Some(framework) = &args.framework {
        config = config.with_framework(framework);
    }
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if let Some(manifest) = &args.manifest {
        config = config.with_manifest(manifest);
    }
    if let Some(filter) = &args.filter {
        config = config.with_filter(filter);
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config = config.with_timeout_secs(timeout_secs);
    }
    if let Some(events_log) = &args.events_log {
        config = config.with_events_log(events_log);
    }
    if let Some(artifacts_dir) = &args.artifacts_dir {
        config = config.with_artifacts_dir(artifacts_dir);
    }
    if args.min_msi.is_some() {
        config.quality_gate.min_msi = args.min_msi;
    }
    if args.max_escaped.is_some() {
        config.quality_gate.max_escaped = args.max_escaped;
    }
    if !args.test_args.is_empty() {
        config = if config.framework == "command" && config.command.is_empty() {
            config.with_command(args.test_args.clone())
        } else {
            config.with_test_args(args.test_args.clone())
        };
    }
    config.validate()?;
    Ok(config)
}

fn run(args: RunArgs) -> Result<ExitCode> {
    let config = make_config(&args)?;
    // Subscribers create files, so reject a bad framework setup first.
    adapter_for(&config)?;
    let events = event_bus_for(&config).context("failed to set up event subscribers")?;
    let outcome = Orchestrator::with_command_executor(&config, events)?.run(config.threads)?;

    match outcome {
        RunOutcome::Aborted { baseline } => {
            eprintln!("{}", failure_message(&baseline));
            Ok(ExitCode::from(1))
        }
        RunOutcome::Completed(report) => {
            println!("{}", render_report(&report, args.format.into()));
            for failure in &report.delivery_failures {
                eprintln!(
                    "event delivery failed for {}: {}",
                    failure.mutation_id, failure.message
                );
            }
            if config.quality_gate.is_disabled() {
                tracing::debug!("no quality gate thresholds configured");
                return Ok(ExitCode::SUCCESS);
            }
            match config.quality_gate.evaluate(&report) {
                GateStatus::Passed => Ok(ExitCode::SUCCESS),
                GateStatus::Failed(reasons) => {
                    for reason in reasons {
                        eprintln!("quality gate failed: {reason}");
                    }
                    Ok(ExitCode::from(2))
                }
            }
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Run(args) => run(args),
        Command::Frameworks => {
            for name in FRAMEWORKS {
                let marker = if name == DEFAULT_FRAMEWORK { " (default)" } else { "" };
                println!("{name}{marker}");
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}
