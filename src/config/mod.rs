// Configuration management module
// Handles TOML configuration loading, validation, and the setup wizard

pub mod interactive;
pub mod settings;


pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, EmbeddingConfig, IndexConfig, SyncConfig};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("recsync"))
        .ok_or(ConfigError::DirectoryError)
}
