pub mod config_cmd;
pub mod parse;
pub mod replay;

use agentloop_config::AppConfig;
use anyhow::Context;
use std::path::Path;

/// Load the config from `path` (or the default location) with environment
/// overrides applied.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides(|key| std::env::var(key).ok())?;
            config.validate()?;
            config
        }
        None => AppConfig::load().context("Failed to load config")?,
    };
    Ok(config)
}
