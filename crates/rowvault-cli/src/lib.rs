//! Command-line entry point: loads configuration, applies CLI overrides,
//! then dispatches to one of `run`, `restore`, `validate-config`, `setup`,
//! or `estimate-cost`.

mod commands;
mod init;
mod setup;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "rowvault")]
#[command(version)]
#[command(about = "Archives historical rows to object storage with a verify-then-delete pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the archival pipeline across configured databases.
    Run {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Restrict the run to these database names (may be repeated).
        #[arg(long = "database", value_name = "NAME")]
        database: Vec<String>,
        /// Plan batches without fetching, uploading, or deleting anything.
        #[arg(long)]
        dry_run: bool,
    },
    /// Reload archived objects for one table back into Postgres.
    Restore {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        #[arg(long)]
        database: String,
        #[arg(long, default_value = "public")]
        schema: String,
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "skip")]
        conflict_strategy: String,
        #[arg(long, default_value = "lenient")]
        migration_strategy: String,
        /// Restore every archived object for the table, ignoring --from/--to.
        #[arg(long)]
        restore_all: bool,
        #[arg(long)]
        from: Option<DateTime<Utc>>,
        #[arg(long)]
        to: Option<DateTime<Utc>>,
        /// Reload objects even if the restore watermark already marks them done.
        #[arg(long)]
        ignore_watermark: bool,
    },
    /// Load and validate configuration without running anything.
    ValidateConfig {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Interactive wizard that writes a starter configuration file.
    Setup,
    /// Rough per-table row/byte projection from database statistics.
    EstimateCost {
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Builder::new_multi_thread().enable_all().build()?.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { config, database, dry_run } => {
            let exit_code = commands::run::run(commands::run::RunArgs { config_path: config, databases: database, dry_run }).await?;
            std::process::exit(exit_code);
        }
        Command::Restore { config, database, schema, table, conflict_strategy, migration_strategy, restore_all, from, to, ignore_watermark } => {
            commands::restore::run(commands::restore::RestoreArgs {
                config_path: config,
                database,
                schema,
                table,
                conflict_strategy,
                migration_strategy,
                restore_all,
                from,
                to,
                ignore_watermark,
            })
            .await
        }
        Command::ValidateConfig { config } => commands::validate_config::run(config),
        Command::Setup => setup::run(),
        Command::EstimateCost { config } => commands::estimate_cost::run(config).await,
    }
}
