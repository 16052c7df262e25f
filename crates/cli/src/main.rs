//! SQL Server security compliance auditor CLI.
//!
//! Drives the audit lifecycle (baseline, sync, finalize) against the
//! embedded store and the Excel report, and generates the preparation and
//! remediation scripts.

use clap::{Parser, Subcommand};
use colored::*;
use std::process;

mod commands;

use sqlwarden_core::AuditError;

#[derive(Parser)]
#[command(name = "sqlwarden")]
#[command(version)]
#[command(about = "SQL Server security compliance auditor")]
#[command(long_about = "
sqlwarden - SQL Server security compliance auditor

Audits SQL Server instances against a security requirement catalogue,
tracks findings across runs in an embedded store, and round-trips operator
annotations (justifications, exceptions, notes) through the generated
Excel report.

Typical cycle:
  sqlwarden audit                 start a baseline
  sqlwarden sync                  re-audit, diff, record actions
  sqlwarden finalize              close the cycle
  sqlwarden status                show the current cycle

Collected facts are read from one JSON document per target
(<facts-dir>/<target-id>.json) produced by the collection agent.
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path (default: sqlwarden.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new baseline audit
    Audit {
        /// Directory of per-target fact files
        #[arg(long, default_value = "facts")]
        facts: String,
    },

    /// Re-audit and reconcile against the current baseline
    Sync {
        /// Directory of per-target fact files
        #[arg(long, default_value = "facts")]
        facts: String,

        /// Reopen a finalized cycle (explicit operator action)
        #[arg(long)]
        reopen: bool,
    },

    /// Finalize the current cycle
    Finalize {
        /// Finalize even with active issues outstanding
        #[arg(short, long)]
        force: bool,
    },

    /// Show the current cycle and its stats
    Status {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// List all runs for the organization
    List {
        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Generate the remote-management preparation script
    Prepare {
        /// Output path for the PowerShell script
        #[arg(short, long, default_value = "prepare-targets.ps1")]
        output: String,
    },

    /// Generate a remediation script from open findings
    Remediate {
        /// Output path for the T-SQL script
        #[arg(short, long, default_value = "remediate.sql")]
        output: String,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(cli).await {
        Ok(()) => {
            println!("{}", "done".green().bold());
        }
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            process::exit(err.exit_code());
        }
    }
}

async fn execute(cli: Cli) -> Result<(), AuditError> {
    let config = sqlwarden_core::AuditConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Audit { facts } => commands::audit::execute(&config, &facts).await,
        Commands::Sync { facts, reopen } => {
            commands::sync_cmd::execute(&config, &facts, reopen).await
        }
        Commands::Finalize { force } => commands::finalize::execute(&config, force).await,
        Commands::Status { format } => commands::status::execute(&config, &format).await,
        Commands::List { format } => commands::list::execute(&config, &format).await,
        Commands::Prepare { output } => commands::prepare::execute(&config, &output),
        Commands::Remediate { output } => commands::remediate::execute(&config, &output).await,
        Commands::Config => commands::config_cmd::execute(&config),
    }
}

fn init_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "sqlwarden=info",
        1 => "sqlwarden=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}
