//! `rowvault run`: loads configuration, optionally spawns the
//! metrics/health server, and drives one run to completion.

use anyhow::{Context, Result};
use rowvault_config::RuntimeConfig;
use rowvault_run::{RunOptions, RunOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;

pub struct RunArgs {
    pub config_path: Option<PathBuf>,
    pub databases: Vec<String>,
    pub dry_run: bool,
}

pub async fn run(args: RunArgs) -> Result<i32> {
    let config = match &args.config_path {
        Some(path) => RuntimeConfig::load_from_path(path).with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load configuration")?,
    };

    crate::init::init_tracing(&config);
    config.validate().context("configuration failed validation")?;

    let server_state = Arc::new(rowvault_server::ServerState::new());
    let server_task = config.server.clone().map(|server_config| {
        let state = server_state.clone();
        tokio::spawn(async move {
            if let Err(error) = rowvault_server::serve(&server_config.listen_addr, state).await {
                tracing::error!(%error, "metrics/health server exited");
            }
        })
    });

    let run_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(run_id = %run_id, "starting run");
    server_state.mark_ready();

    let orchestrator = RunOrchestrator::new(config, run_id);
    let options = RunOptions { dry_run: args.dry_run, database_filter: args.databases };
    let (summary, exit_code) = orchestrator.execute(options).await.context("run failed")?;

    server_state.record_summary(summary.clone()).await;
    server_state.mark_not_ready();
    if let Some(task) = server_task {
        task.abort();
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    tracing::info!(exit_code = ?exit_code, "run complete");
    Ok(exit_code as i32)
}
