//! CLI configuration, stored in `~/.config/cinegate/config.toml`.

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::output::{self, OutputFormat};

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the stored configuration and where it lives
    Show,

    /// Set the API server URL used when --api-url and CINEGATE_API_URL are absent
    SetUrl {
        /// Base URL, e.g. http://localhost:8080
        url: String,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

fn config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("Could not determine the user config directory")?;
    Ok(base.join("cinegate").join("config.toml"))
}

fn load_config() -> Result<CliConfig> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(CliConfig::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_config(cfg: &CliConfig) -> Result<PathBuf> {
    let path = config_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let content = toml::to_string_pretty(cfg).context("Failed to serialize config")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// The stored API URL, if any.
pub fn load_api_url() -> Option<String> {
    load_config().ok().and_then(|cfg| cfg.api_url)
}

fn validate_url(url: &str) -> Result<String> {
    let parsed = reqwest::Url::parse(url).with_context(|| format!("'{}' is not a valid URL", url))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("API URL must use http or https");
    }
    Ok(url.trim_end_matches('/').to_string())
}

pub async fn execute(cmd: ConfigCommands, format: OutputFormat) -> Result<()> {
    match cmd {
        ConfigCommands::Show => {
            let path = config_path()?;
            let cfg = load_config()?;
            match format {
                OutputFormat::Table => {
                    output::print_header("Configuration");
                    output::print_detail("File", &path.display().to_string());
                    output::print_detail("API URL", cfg.api_url.as_deref().unwrap_or("(not set)"));
                }
                _ => output::print_item(&cfg, format)?,
            }
        }

        ConfigCommands::SetUrl { url } => {
            let url = validate_url(&url)?;
            let mut cfg = load_config()?;
            cfg.api_url = Some(url.clone());
            let path = save_config(&cfg)?;

            match format {
                OutputFormat::Table => {
                    output::print_success(&format!("api_url = {} ({})", url, path.display()))
                }
                _ => output::print_item(&cfg, format)?,
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert_eq!(validate_url("http://localhost:8080/").unwrap(), "http://localhost:8080");
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("not a url").is_err());
    }

    #[test]
    fn test_config_roundtrip_omits_unset_url() {
        assert_eq!(toml::to_string(&CliConfig::default()).unwrap().trim(), "");
        let cfg: CliConfig = toml::from_str("api_url = \"http://h:1\"").unwrap();
        assert_eq!(cfg.api_url.as_deref(), Some("http://h:1"));
    }
}
