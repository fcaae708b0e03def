use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::ForemanConfig;

/// Loads the Foreman configuration from disk.
pub struct ConfigLoader {
    config: Arc<RwLock<ForemanConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > FOREMAN_CONFIG env > ~/.foreman/foreman.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("FOREMAN_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".foreman")
            .join("foreman.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> foreman_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<ForemanConfig>(&raw).map_err(|e| {
                foreman_core::ForemanError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ForemanConfig::default()
        };

        // Apply environment variable overrides
        let config = Self::apply_env_overrides(config);

        // Validate config — log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(foreman_core::ForemanError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ForemanConfig {
        self.config.read().clone()
    }

    /// Get a shared reference for subscription.
    pub fn shared(&self) -> Arc<RwLock<ForemanConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (FOREMAN_ENGINE_MODEL, FOREMAN_LOG_LEVEL, etc.)
    fn apply_env_overrides(mut config: ForemanConfig) -> ForemanConfig {
        if let Ok(v) = std::env::var("FOREMAN_ENGINE_MODEL") {
            config.engine.model = v;
        }
        if let Ok(v) = std::env::var("FOREMAN_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("FOREMAN_POLL_INTERVAL_SECS")
            && let Ok(secs) = v.parse::<u64>()
        {
            config.controller.poll_interval_secs = secs;
        }
        if let Ok(v) = std::env::var("FOREMAN_MAX_TOKENS_PER_HOUR")
            && let Ok(tokens) = v.parse::<u64>()
        {
            config.usage.max_tokens_per_hour = tokens;
        }
        if let Ok(v) = std::env::var("FOREMAN_MAX_TOKENS_PER_DAY")
            && let Ok(tokens) = v.parse::<u64>()
        {
            config.usage.max_tokens_per_day = tokens;
        }
        config
    }
}
