//! repofleet CLI - bulk GitHub repository provisioning with Tailscale
//! key injection.
//!
//! The CLI is a thin surface over `repofleet-provisioning`: it loads a
//! configuration file, starts a run, renders the run's event stream, and
//! maps the terminal report to an exit code.  Ctrl-C requests cooperative
//! cancellation; an in-flight repository finishes before the run stops.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use repofleet_core::{validate, CoreError, ProvisioningConfig};
use repofleet_provisioning::{events, Orchestrator, RunEvent, RunReport};

/// Bulk GitHub repository provisioning with Tailscale key injection.
#[derive(Parser)]
#[command(name = "repofleet")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a provisioning run
    Run(RunArgs),

    /// Validate a configuration without touching the remote APIs
    Validate(ValidateArgs),

    /// Write a default configuration file to edit
    Init(InitArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Suppress per-step progress lines
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Path to the configuration file
    #[arg(short, long)]
    config: PathBuf,
}

#[derive(clap::Args)]
struct InitArgs {
    /// Where to write the configuration file
    #[arg(short, long, default_value = "repofleet.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("repofleet=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Validate(args) => validate_config(&args),
        Commands::Init(args) => init_config(&args),
    }
}

async fn run(args: RunArgs) -> ExitCode {
    let config = match ProvisioningConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    let (sender, mut rx) = events::channel();
    let orchestrator = Orchestrator::new(config).with_events(sender);
    let cancel = orchestrator.cancel_handle();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("cancellation requested, finishing the current repository...");
                cancel.cancel();
            }
        }
    });

    let run = tokio::spawn(orchestrator.run());

    let mut report_from_stream = None;
    while let Some(event) = rx.recv().await {
        match event {
            RunEvent::Progress(update) => {
                if !args.quiet {
                    eprintln!("[{:>3}%] {}: {}", update.overall_percent, update.step, update.activity);
                }
            }
            RunEvent::Stats(stats) => {
                if !args.quiet {
                    eprintln!(
                        "       {}/{} processed, {} created, {} failed",
                        stats.current_index, stats.total, stats.created, stats.failed
                    );
                }
            }
            RunEvent::Finished(report) => report_from_stream = Some(report),
        }
    }

    let report = match run.await {
        Ok(report) => report,
        Err(e) => {
            // Fall back to the streamed copy if the task itself failed.
            match report_from_stream {
                Some(report) => report,
                None => {
                    eprintln!("error: provisioning task failed: {e}");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    print_report(&report);
    if report.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &RunReport) {
    println!("{}", report.message);
    if !report.created_repos.is_empty() {
        println!("\nCreated repositories:");
        for name in &report.created_repos {
            println!("  {name}");
        }
    }
    if report.generated_key_count > 0 {
        println!("\nIssued auth keys: {}", report.generated_key_count);
    }
    if !report.errors.is_empty() {
        println!("\nWarnings and errors:");
        for error in &report.errors {
            println!("  {error}");
        }
    }
    println!("\nElapsed: {:.1}s", report.elapsed_secs);
}

fn validate_config(args: &ValidateArgs) -> ExitCode {
    let config = match ProvisioningConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(2);
        }
    };

    match validate::validate(&config) {
        Ok(()) => {
            println!("configuration is valid");
            ExitCode::SUCCESS
        }
        Err(CoreError::Validation(issues)) => {
            eprintln!("configuration has {} problem(s):", issues.len());
            for issue in issues {
                eprintln!("  {issue}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_config(args: &InitArgs) -> ExitCode {
    if args.output.exists() {
        eprintln!("error: {} already exists", args.output.display());
        return ExitCode::FAILURE;
    }

    let config = ProvisioningConfig::default();
    match config.save(&args.output) {
        Ok(()) => {
            println!("wrote {}", args.output.display());
            println!("fill in the GitHub credentials before running");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
