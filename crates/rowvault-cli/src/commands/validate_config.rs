//! `rowvault validate-config`: loads and validates configuration without
//! running anything, creating the filesystem archive directory and testing
//! writability when applicable.

use anyhow::{Context, Result};
use rowvault_config::{RuntimeConfig, StorageBackend};
use std::fs;
use std::path::{Path, PathBuf};

pub fn run(config_path: Option<PathBuf>) -> Result<()> {
    let config = match &config_path {
        Some(path) => RuntimeConfig::load_from_path(path).with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RuntimeConfig::load().context("failed to load configuration")?,
    };

    config.validate().context("configuration failed validation")?;

    if config.storage.backend == StorageBackend::Fs {
        let root = config.storage.fs_path.as_deref().unwrap_or("./rowvault-data");
        let root = Path::new(root);
        fs::create_dir_all(root).with_context(|| format!("failed to create archive directory {}", root.display()))?;
        let probe = root.join(".rowvault-write-test");
        fs::write(&probe, b"ok").with_context(|| format!("archive directory {} is not writable", root.display()))?;
        fs::remove_file(&probe).context("failed to remove write-test file")?;
    }

    for database in &config.databases {
        rowvault_config::resolve_secret_env(&database.dsn_env)
            .with_context(|| format!("database '{}' references an unset environment variable", database.name))?;
    }

    println!("configuration is valid ({} database(s) configured)", config.databases.len());
    Ok(())
}
