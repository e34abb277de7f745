// Configuration management module
// TOML settings for the embedding store and query defaults

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, QueryConfig, StoreConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

/// Load the configuration from the default directory
#[inline]
pub fn load_default() -> anyhow::Result<Config> {
    let config_dir = get_config_dir()?;
    Config::load(config_dir)
}
