//! `agentloop config` — print the effective configuration.

use agentloop_config::AppConfig;

pub fn show(config: &AppConfig) -> anyhow::Result<()> {
    println!("# {}", AppConfig::config_dir().join("config.toml").display());
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
