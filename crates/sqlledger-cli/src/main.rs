use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlledger_config::{AppConfig, ConfigLoader, LogConfig};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod report;
mod watch;

#[derive(Parser)]
#[command(name = "sqlledger")]
#[command(about = "Apply, verify and roll back SQL migration files against a database ledger")]
#[command(version)]
struct Cli {
    /// Config file (YAML or TOML). Defaults to ./sqlledger.{yml,yaml,toml}
    #[arg(short, long, global = true, env = "SQLLEDGER_CONFIG")]
    config: Option<PathBuf>,

    /// Migrations directory
    #[arg(short = 'd', long = "dir", global = true)]
    migrations_dir: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Schema (attached database) holding the ledger table
    #[arg(long, global = true)]
    schema: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations and, with --allow-down, roll back removed ones
    Up {
        /// Permit running stored down scripts for migrations whose files are gone
        #[arg(long)]
        allow_down: bool,
    },

    /// Show how each migration relates to the ledger without changing anything
    Status {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate the migrations directory without touching the database
    Check,

    /// Re-run `up` whenever the migrations directory changes
    Watch {
        #[arg(long)]
        allow_down: bool,
    },

    /// Create an empty up/down pair stamped with the current hour
    New {
        /// Descriptive label, e.g. add_users
        label: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new(cli.config.clone());
    let mut config = loader.load().context("failed to load configuration")?;
    apply_cli_overrides(&mut config, &cli);
    init_tracing(&config.log);

    match loader.source() {
        Some(path) => info!("loaded config from {}", path.display()),
        None => debug!("no config file found, using defaults"),
    }

    match cli.command {
        Commands::Up { allow_down } => {
            let report = commands::run_up(&config, config.down_mode || allow_down)?;
            report::print_run_report(&report);
        }
        Commands::Status { json } => {
            let status = commands::run_status(&config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                report::print_status(&status);
            }
            if status.is_blocked() {
                std::process::exit(2);
            }
        }
        Commands::Check => {
            let migrations = commands::run_check(&config)?;
            println!(
                "{} migration(s) in {} are well-formed",
                migrations.len(),
                config.migrations_dir.display()
            );
        }
        Commands::Watch { allow_down } => {
            watch::run_watch(config.clone(), config.down_mode || allow_down).await?;
        }
        Commands::New { label } => {
            let (up, down) =
                commands::new_migration(&config.migrations_dir, &label, chrono::Local::now())?;
            println!("created {}", up.display());
            println!("created {}", down.display());
        }
    }

    Ok(())
}

fn apply_cli_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(dir) = &cli.migrations_dir {
        config.migrations_dir = dir.clone();
    }
    if let Some(path) = &cli.database {
        config.database.path = path.clone();
    }
    if let Some(schema) = &cli.schema {
        config.database.schema = Some(schema.clone());
    }
    if cli.log_json {
        config.log.json = true;
    }
}

fn init_tracing(log: &LogConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.as_str()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
