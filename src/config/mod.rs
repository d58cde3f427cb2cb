use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

// Re-export section config types
pub use crate::api::ApiConfig;
pub use crate::grid::GridConfig;
pub use crate::nats::NatsConfig;

/// Complete simwatch configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimwatchConfig {
    #[serde(default)]
    pub nats: NatsConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub views: ViewsConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

/// View configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ViewsConfig {
    /// Entries kept per agent log
    #[serde(default = "default_log_cap")]
    pub log_cap: usize,
    /// Entries kept by the firehose debug log
    #[serde(default = "default_debug_log_cap")]
    pub debug_log_cap: usize,
}

fn default_log_cap() -> usize {
    10
}

fn default_debug_log_cap() -> usize {
    200
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            log_cap: default_log_cap(),
            debug_log_cap: default_debug_log_cap(),
        }
    }
}

/// Load configuration from TOML file
pub fn load_config(path: impl AsRef<Path>) -> Result<SimwatchConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: SimwatchConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GridPosition;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = SimwatchConfig::default();
        assert_eq!(config.nats.name, "simwatch");
        assert_eq!(config.api.timeout_seconds, 10);
        assert_eq!(config.views.log_cap, 10);
        assert_eq!(config.views.debug_log_cap, 200);
        assert_eq!(config.grid.tile_size, 16);
        assert_eq!(config.grid.max_blocked_steps, 8);
        assert_eq!(config.grid.debug_anchor, GridPosition::new(15, 15));
        assert!(config.grid.seed.is_none());
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [nats]
            url = "nats://bus.local:4222"

            [views]
            log_cap = 25

            [grid]
            debug_anchor = [3, 4]
            seed = 99
        "#;

        let config: SimwatchConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.nats.url, "nats://bus.local:4222");
        assert_eq!(config.nats.name, "simwatch");
        assert_eq!(config.views.log_cap, 25);
        assert_eq!(config.views.debug_log_cap, 200);
        assert_eq!(config.grid.debug_anchor, GridPosition::new(3, 4));
        assert_eq!(config.grid.seed, Some(99));
        assert_eq!(config.grid.speed_tiles_per_second, 4.0);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: SimwatchConfig = toml::from_str("").unwrap();
        assert_eq!(config.views.log_cap, 10);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[api]\nbase_url = \"http://sim:9000\"\ntimeout_seconds = 3").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://sim:9000");
        assert_eq!(config.api.timeout_seconds, 3);
    }

    #[test]
    fn test_load_config_missing_file() {
        assert!(load_config("/nonexistent/simwatch.toml").is_err());
    }
}
