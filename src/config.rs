use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the source created when the config lists none
pub const DEFAULT_SOURCE: &str = "personal";

/// Get the config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("tend"))
}

/// Path of the config file
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Root deps resolved in parallel (`meet --jobs` overrides)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Never prompt; take parameter defaults (`meet --defaults` also sets this)
    #[serde(default)]
    pub defaults: bool,

    /// Dep source directories, searched in order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub name: String,
    pub path: String,
}

impl SourceConfig {
    /// Get expanded source directory path
    pub fn expanded_path(&self) -> PathBuf {
        let expanded = shellexpand::tilde(&self.path);
        PathBuf::from(expanded.as_ref())
    }
}

impl Config {
    /// Load the config from an explicit path, or the default location
    ///
    /// A missing default config is not an error; an explicit path must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let path = config_path()?;
                if !path.exists() {
                    log::debug!("no config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config format in {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Configured sources, or the default personal source when none are listed
    pub fn sources(&self) -> Result<Vec<SourceConfig>> {
        if !self.sources.is_empty() {
            return Ok(self.sources.clone());
        }
        let path = config_dir()?.join("deps");
        Ok(vec![SourceConfig {
            name: DEFAULT_SOURCE.to_string(),
            path: path.display().to_string(),
        }])
    }
}
