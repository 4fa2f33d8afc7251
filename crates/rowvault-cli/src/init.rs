//! Tracing/logging initialization: env-filter default to `info`, optional
//! JSON output for log aggregators.

use rowvault_config::{LogFormat, RuntimeConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init_tracing(config: &RuntimeConfig) {
    let log_level = config.server.as_ref().map(|s| s.log_level.as_str()).unwrap_or("info");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let json_logs = matches!(config.server.as_ref().map(|s| s.log_format), Some(LogFormat::Json));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json_logs {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
