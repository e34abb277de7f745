
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::search::request::{DEFAULT_CANDIDATE_CAP, DEFAULT_KIND, DEFAULT_THRESHOLD};

pub const DEFAULT_DIMENSION: u32 = 768;
pub const DEFAULT_MODEL_TAG: &str = "e5";
const MAX_CANDIDATE_CAP: usize = 10_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Settings describing the embedding deployment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Length every stored and query vector must have
    pub dimension: u32,
    pub default_model_tag: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            default_model_tag: DEFAULT_MODEL_TAG.to_string(),
        }
    }
}

/// Defaults applied to similarity queries when the caller leaves them unset
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QueryConfig {
    pub kind: String,
    pub threshold: f32,
    /// Nearest neighbours requested from the index before exact filtering.
    /// Matches ranked beyond this many candidates are never returned.
    pub candidate_cap: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            kind: DEFAULT_KIND.to_string(),
            threshold: DEFAULT_THRESHOLD,
            candidate_cap: DEFAULT_CANDIDATE_CAP,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid vector dimension: {0} (must be between 1 and 4096)")]
    InvalidDimension(u32),
    #[error("Invalid model tag: {0:?} (cannot be empty)")]
    InvalidModelTag(String),
    #[error("Invalid kind: {0:?} (cannot be empty)")]
    InvalidKind(String),
    #[error("Invalid similarity threshold: {0} (must be between 0.0 and 1.0)")]
    InvalidThreshold(f32),
    #[error("Invalid candidate cap: {0} (must be between 1 and 10000)")]
    InvalidCandidateCap(usize),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration rooted at `base_dir`
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".semantic-recall"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("semantic-recall"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self::with_base_dir(config_dir));
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.query.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Path of the SQLite catalog holding query entry points
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join(crate::database::sqlite::CATALOG_FILE)
    }

    /// Path of the LanceDB directory holding embeddings
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.store.dimension as usize
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&self.dimension) {
            return Err(ConfigError::InvalidDimension(self.dimension));
        }

        if self.default_model_tag.trim().is_empty() {
            return Err(ConfigError::InvalidModelTag(self.default_model_tag.clone()));
        }

        Ok(())
    }

    pub fn set_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(1..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidDimension(dimension));
        }
        self.dimension = dimension;
        Ok(())
    }

    pub fn set_default_model_tag(&mut self, model_tag: String) -> Result<(), ConfigError> {
        if model_tag.trim().is_empty() {
            return Err(ConfigError::InvalidModelTag(model_tag));
        }
        self.default_model_tag = model_tag;
        Ok(())
    }
}

impl QueryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind.trim().is_empty() {
            return Err(ConfigError::InvalidKind(self.kind.clone()));
        }

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ConfigError::InvalidThreshold(self.threshold));
        }

        if !(1..=MAX_CANDIDATE_CAP).contains(&self.candidate_cap) {
            return Err(ConfigError::InvalidCandidateCap(self.candidate_cap));
        }

        Ok(())
    }

    pub fn set_kind(&mut self, kind: String) -> Result<(), ConfigError> {
        if kind.trim().is_empty() {
            return Err(ConfigError::InvalidKind(kind));
        }
        self.kind = kind;
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: f32) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        self.threshold = threshold;
        Ok(())
    }

    pub fn set_candidate_cap(&mut self, candidate_cap: usize) -> Result<(), ConfigError> {
        if !(1..=MAX_CANDIDATE_CAP).contains(&candidate_cap) {
            return Err(ConfigError::InvalidCandidateCap(candidate_cap));
        }
        self.candidate_cap = candidate_cap;
        Ok(())
    }
}
