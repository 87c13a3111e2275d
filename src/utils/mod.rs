pub mod retry;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::common::Config;

const CONFIG_PATH_ENV: &str = "INDEXER_CONFIG";
const ENV_PREFIX: &str = "INDEXER";

/// Loads the YAML config file, then layers `INDEXER__*` environment variables
/// on top (e.g. `INDEXER__AWS__SECRET_ACCESS_KEY`).
pub fn load_config<P: AsRef<Path>>(file_name: P) -> Result<Config> {
    // An explicit path wins over the file next to the manifest
    let config_path = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => PathBuf::from(path),
        Err(_) => Path::new(env!("CARGO_MANIFEST_DIR")).join(file_name),
    };
    info!("Config path: {}", config_path.to_string_lossy());

    let settings = config::Config::builder()
        .add_source(config::File::from(config_path.as_path()).required(true))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("failed to read config file")?;

    settings
        .try_deserialize::<Config>()
        .context("failed to parse config")
}

/// Percentage of `count` in `total` in basis points, rounded half up.
pub fn basis_points(count: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (count.saturating_mul(10_000) + total / 2) / total
}

/// `1234` -> `"12.34%"`
pub fn format_basis_points(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

pub fn strip_html(error: &str) -> String {
    // If the error contains HTML tags, extract just the text content
    if error.contains("<!doctype html>") || error.contains("<html>") {
        // Remove all HTML tags and return the first non-empty line of text
        error
            .lines()
            .map(|line| line.trim())
            .find(|line| {
                !line.starts_with('<')
                    && !line.ends_with('>')
                    && !line.is_empty()
                    && !line.starts_with("<!")
                    && *line != "html"
                    && *line != "body"
            })
            .unwrap_or(error)
            .to_string()
    } else {
        // Return original error if no HTML
        error.to_string()
    }
}
