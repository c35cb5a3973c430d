//! # tg-cli
//!
//! Command-line interface for Tag Governor.
//!
//! - `tg schema validate/apply/show/trace` — manage and debug the active tag schema
//! - `tg scan` — evaluate an inventory snapshot and report fleet compliance
//! - `tg remediate` — fill missing tags with a placeholder, re-evaluating live
//! - `tg sync` — compile the schema into an external enforcement policy

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::EngineConfig;

/// Tag Governor — declarative tag schemas, compliance scans, and remediation.
#[derive(Parser)]
#[command(name = "tg", version, about)]
struct Cli {
    /// Project root directory (defaults to current directory).
    #[arg(long, default_value = ".")]
    project_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the active tag schema.
    Schema {
        #[command(subcommand)]
        command: commands::schema::SchemaCommands,
    },
    /// Scan the inventory against the active schema.
    Scan(commands::scan::ScanArgs),
    /// Remediate non-compliant resources.
    Remediate(commands::remediate::RemediateArgs),
    /// Publish the schema as an external enforcement policy.
    Sync(commands::sync::SyncArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they don't interfere with reports on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("tg_policy=info".parse()?)
                .add_directive("tg_inventory=info".parse()?)
                .add_directive("tg_remediation=info".parse()?)
                .add_directive("tg_cli=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let project_root = cli.project_root.canonicalize().unwrap_or(cli.project_root);
    let config = EngineConfig::for_project(&project_root)?;
    tracing::debug!(project_root = %project_root.display(), "loaded engine config");

    match &cli.command {
        Commands::Schema { command } => commands::schema::execute(command, &config),
        Commands::Scan(args) => commands::scan::execute(args, &config),
        Commands::Remediate(args) => commands::remediate::execute(args, &config),
        Commands::Sync(args) => commands::sync::execute(args, &config),
    }
}
