use super::TallyConfig;
use crate::error::{Result, TallyError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Name of the config file picked up from the working directory
pub const LOCAL_CONFIG_FILE: &str = "tally.toml";

pub struct ConfigLoader {
    config: TallyConfig,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config: TallyConfig::default(),
        }
    }

    /// Load an explicit config file, or `tally.toml` from `base_dir` if present
    pub async fn load_file(mut self, explicit: Option<&Path>, base_dir: &Path) -> Result<Self> {
        let path: PathBuf = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let local = base_dir.join(LOCAL_CONFIG_FILE);
                if !local.exists() {
                    debug!("No {} in {}", LOCAL_CONFIG_FILE, base_dir.display());
                    return Ok(self);
                }
                local
            }
        };

        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(&path).await.map_err(|e| {
            TallyError::config("config", format!("cannot read {}: {e}", path.display()))
        })?;
        self.config = toml::from_str(&content).map_err(|e| {
            TallyError::config("config", format!("cannot parse {}: {e}", path.display()))
        })?;
        Ok(self)
    }

    pub fn with_env(mut self) -> Self {
        self.config.merge_env_vars();
        self
    }

    /// Apply a final override layer, typically command line flags
    pub fn with_overrides<F>(mut self, apply: F) -> Self
    where
        F: FnOnce(&mut TallyConfig),
    {
        apply(&mut self.config);
        self
    }

    /// Validate and return the merged configuration
    pub fn finish(self) -> Result<TallyConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
