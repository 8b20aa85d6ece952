use anyhow::{anyhow, Context, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const LOG_FILTER_ENV: &str = "RUNSTREAM_LOG";
const LOG_PATH_ENV: &str = "RUNSTREAM_LOG_PATH";
const DEFAULT_LOG_FILTER: &str = "info";

/// Installs the global `tracing` subscriber. Output goes to `RUNSTREAM_LOG_PATH`
/// (appended) when set, stderr otherwise.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    match resolve_log_path() {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("cannot open log file '{path}'"))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
        }
        None => builder
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|error| anyhow!("failed to install tracing subscriber: {error}")),
    }
}

fn resolve_log_path() -> Option<String> {
    std::env::var(LOG_PATH_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
