#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, EmbeddingConfig};

#[inline]
pub fn run_interactive_config<P: AsRef<Path>>(config_dir: P) -> Result<()> {
    eprintln!("{}", style("🔧 Recsync Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir.as_ref())?;

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    eprintln!("Configure the Gemini-compatible embedding endpoint.");
    eprintln!();

    configure_embedding(&mut config.embedding)?;

    let top_k: usize = Input::new()
        .with_prompt("Related posts per document")
        .default(config.sync.top_k)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Top-k must be greater than 0")
            } else if *input > 50 {
                Err("Top-k must be 50 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    config.sync.set_top_k(top_k)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());

        let config_path = config
            .config_file_path()
            .context("Failed to get config file path")?;
        eprintln!(
            "Configuration saved to: {}",
            style(config_path.display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config<P: AsRef<Path>>(config_dir: P) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Embedding Provider:").bold().yellow());
    eprintln!("  Host: {}", style(&config.embedding.host).cyan());
    eprintln!("  Port: {}", style(config.embedding.port).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    let key_state = if config.embedding.resolved_api_key().is_empty() {
        style("not set").red()
    } else {
        style("configured").green()
    };
    eprintln!("  API key: {key_state}");

    eprintln!();
    eprintln!("{}", style("Vector Index:").bold().yellow());
    eprintln!("  Table: {}", style(&config.index.table_name).cyan());
    eprintln!("  Batch size: {}", style(config.index.batch_size).cyan());

    eprintln!();
    eprintln!("{}", style("Sync:").bold().yellow());
    eprintln!("  Top-k: {}", style(config.sync.top_k).cyan());
    eprintln!(
        "  Body ceiling: {} chars",
        style(config.normalize.body_max_chars).cyan()
    );

    eprintln!();
    match config.provider_url() {
        Ok(url) => eprintln!("  Provider URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Provider URL: {} ({})", style("Invalid").red(), e),
    }

    let config_path = config
        .config_file_path()
        .context("Failed to get config file path")?;
    eprintln!();
    eprintln!("Config file: {}", style(config_path.display()).dim());

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        eprintln!("{}", style("Found existing configuration.").green());
    } else {
        eprintln!(
            "{}",
            style("No existing configuration found. Using defaults.").yellow()
        );
    }
    Config::load(config_dir)
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    let protocols = &["https", "http"];
    let default_index = protocols
        .iter()
        .position(|&p| p == embedding.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Provider protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Provider host")
        .default(embedding.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = EmbeddingConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..EmbeddingConfig::default()
            };
            temp_config.validate()?;
            Ok(())
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Provider port")
        .default(embedding.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(embedding.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let api_key: String = Input::new()
        .with_prompt("API key (empty to use GEMINI_API_KEY)")
        .default(embedding.api_key.clone())
        .allow_empty(true)
        .interact_text()?;

    let dimension: u32 = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    embedding.set_protocol(protocol)?;
    embedding.set_host(host)?;
    embedding.set_port(port)?;
    embedding.set_model(model)?;
    embedding.set_api_key(api_key);
    embedding.set_dimension(dimension)?;

    Ok(())
}
