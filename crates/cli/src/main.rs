//! uiflow CLI - Main Entry Point
//!
//! Runs declarative browser acceptance scenarios through Playwright or a
//! WebDriver endpoint.
//!
//! Exit codes: 0 when every scenario passed, 1 when any failed or was
//! aborted, 2 on configuration or startup errors.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use uiflow_cli::commands::{check, list, run, ConfigArgs};
use uiflow_cli::output::{self, OutputFormat};

/// uiflow - scenario runner for browser acceptance suites
#[derive(Parser)]
#[command(name = "uiflow")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "UIFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Log format
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(flatten)]
    overrides: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scenario suite
    Run(run::RunArgs),

    /// List scenarios without running them
    List(list::ListArgs),

    /// Validate configuration, scenarios and fixture
    Check(check::CheckArgs),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<ExitCode> {
    if let Commands::Version = cli.command {
        println!("uiflow v{}", env!("CARGO_PKG_VERSION"));
        println!("Backends: playwright, webdriver");
        return Ok(ExitCode::SUCCESS);
    }

    let config = cli.overrides.resolve(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => match run::execute(args, config, cli.format).await? {
            run::RunOutcome::Passed => Ok(ExitCode::SUCCESS),
            run::RunOutcome::Failed => Ok(ExitCode::from(1)),
        },
        Commands::List(args) => {
            list::execute(args, config, cli.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check(args) => {
            if check::execute(args, config, cli.format).await? {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(1))
            }
        }
        Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::from(2)
        }
    }
}
