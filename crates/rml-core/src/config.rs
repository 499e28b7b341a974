use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration loaded from `~/.config/rml/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RmlConfig {
    /// Whole-transfer watchdog timeout in milliseconds.
    pub timeout_ms: u64,
    /// Append a cache-busting query parameter to every fetch.
    #[serde(default)]
    pub nocache: bool,
    /// Base URL standing in for the "current document" when resolving
    /// `./`-relative module URLs without an explicit host.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for RmlConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 120_000,
            nocache: false,
            base_url: None,
        }
    }
}

impl RmlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rml")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RmlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RmlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: RmlConfig = toml::from_str(&data)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RmlConfig::default();
        assert_eq!(cfg.timeout_ms, 120_000);
        assert!(!cfg.nocache);
        assert!(cfg.base_url.is_none());
        assert_eq!(cfg.timeout(), Duration::from_millis(120_000));
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RmlConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RmlConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.timeout_ms, cfg.timeout_ms);
        assert_eq!(parsed.nocache, cfg.nocache);
        assert_eq!(parsed.base_url, cfg.base_url);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            timeout_ms = 5000
            nocache = true
            base_url = "http://cdn.example/app/index.html"
        "#;
        let cfg: RmlConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.timeout_ms, 5000);
        assert!(cfg.nocache);
        assert_eq!(cfg.base_url.as_deref(), Some("http://cdn.example/app/index.html"));
    }

    #[test]
    fn config_toml_optional_fields_default() {
        let toml = "timeout_ms = 30000";
        let cfg: RmlConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.timeout_ms, 30_000);
        assert!(!cfg.nocache);
        assert!(cfg.base_url.is_none());
    }
}
