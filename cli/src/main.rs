//! `resurrect` command-line entry point

use clap::{Parser, Subcommand};

mod deps_cmd;
mod fix_cmd;
mod registry_cmd;

use deps_cmd::DepsArgs;
use fix_cmd::{FixArgs, RecordArgs};
use registry_cmd::RegistryCli;

/// Repair broken dependency declarations in abandoned JavaScript projects
#[derive(Debug, Parser)]
#[command(name = "resurrect", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find dead URL-based dependencies and their npm replacements
    Deps(DepsArgs),

    /// Classify an install log and apply the next remediation strategy
    Fix(FixArgs),

    /// Record a strategy that fixed an install error
    Record(RecordArgs),

    /// Query the pattern registry
    Registry(RegistryCli),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?cli.command, "resurrect {}", resurrect_core::VERSION);
    let code = match cli.command {
        Command::Deps(args) => args.run().await,
        Command::Fix(args) => args.run().await,
        Command::Record(args) => args.run(),
        Command::Registry(cli) => cli.run(),
    };
    std::process::exit(code);
}
