//! kubedemo CLI - Run Kubernetes demo workflows end to end

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;
mod plan;
mod shutdown;

use crate::plan::Mode;

#[derive(Parser)]
#[command(name = "kubedemo")]
#[command(author = "kubedemo Contributors")]
#[command(version)]
#[command(about = "Deploy a Kubernetes demo, wait for it to converge, test it and clean up", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Workflow file
    #[arg(
        short = 'f',
        long = "file",
        global = true,
        env = "KUBEDEMO_WORKFLOW",
        default_value = kubedemo_core::DEFAULT_WORKFLOW_FILE
    )]
    file: PathBuf,

    /// Override the workflow's namespace
    #[arg(short, long, global = true)]
    namespace: Option<String>,

    /// kubeconfig context to use
    #[arg(long, global = true, env = "KUBEDEMO_CONTEXT")]
    context: Option<String>,

    /// Abort the whole run after this long (e.g. "10m")
    #[arg(long, global = true, value_parser = parse_duration)]
    deadline: Option<Duration>,

    /// Emit JSON lines on stdout instead of styled output
    #[arg(long, global = true, conflicts_with = "quiet")]
    json: bool,

    /// Only print warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Print one line per polling tick
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Pre-clean, deploy, verify, test, report status and tear down (default)
    Run {
        /// Leave the demo running instead of tearing it down
        #[arg(long)]
        keep: bool,
    },

    /// Pre-clean, deploy and wait for convergence
    Deploy,

    /// Run the workflow's checks against an existing deployment
    Test,

    /// Show the state of the demo's objects
    Status,

    /// Delete every object the workflow manages
    Cleanup,

    /// Check the workflow file without contacting a cluster
    Validate,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    let duration =
        humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())?;
    if duration.is_zero() {
        return Err("duration must be greater than zero".to_string());
    }
    Ok(duration)
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!cli.no_color),
        )
        .try_init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() {
                exit_codes::USAGE_ERROR
            } else {
                exit_codes::SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if cli.debug {
        // SAFETY: no other threads read the environment at this point
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }
    if cli.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }
    init_logging(&cli);

    let options = commands::RunOptions {
        file: cli.file.clone(),
        namespace: cli.namespace.clone(),
        context: cli.context.clone(),
        deadline: cli.deadline,
        output: commands::Output::from_flags(cli.json, cli.quiet, cli.verbose, cli.no_color),
    };

    let result = match cli.command.unwrap_or(Commands::Run { keep: false }) {
        Commands::Run { keep } => commands::run::run(&options, Mode::Full { keep }).await,
        Commands::Deploy => commands::run::run(&options, Mode::Deploy).await,
        Commands::Test => commands::run::run(&options, Mode::Test).await,
        Commands::Status => commands::run::run(&options, Mode::Status).await,
        Commands::Cleanup => commands::run::run(&options, Mode::Cleanup).await,
        Commands::Validate => commands::validate::run(&options),
    };

    let code = match result {
        Ok(code) => code,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };
    std::process::exit(code);
}
