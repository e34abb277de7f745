
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input};
use std::path::Path;

use super::{Config, QueryConfig, StoreConfig, get_config_dir};

#[inline]
pub fn run_interactive_config() -> Result<()> {
    eprintln!("{}", style("🔧 Semantic Recall Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(&get_config_dir()?)?;

    eprintln!("{}", style("Embedding Store").bold().yellow());
    eprintln!("Every stored and query vector must have the configured dimension.");
    eprintln!();

    configure_store(&mut config.store)?;

    eprintln!();
    eprintln!("{}", style("Query Defaults").bold().yellow());
    eprintln!("Applied when a search leaves kind, threshold or candidate cap unset.");
    eprintln!();

    configure_query(&mut config.query)?;

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load(get_config_dir()?).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Store Settings:").bold().yellow());
    eprintln!("  Dimension: {}", style(config.store.dimension).cyan());
    eprintln!(
        "  Default Model Tag: {}",
        style(&config.store.default_model_tag).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Query Defaults:").bold().yellow());
    eprintln!("  Kind: {}", style(&config.query.kind).cyan());
    eprintln!("  Threshold: {}", style(config.query.threshold).cyan());
    eprintln!("  Candidate Cap: {}", style(config.query.candidate_cap).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    eprintln!("Catalog: {}", style(config.database_path().display()).dim());
    eprintln!(
        "Vectors: {}",
        style(config.vector_database_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No valid configuration found. Using defaults.").yellow()
            );
            Ok(Config::with_base_dir(config_dir))
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            Ok(config)
        },
    )
}

fn configure_store(store: &mut StoreConfig) -> Result<()> {
    let dimension: u32 = Input::new()
        .with_prompt("Vector dimension")
        .default(store.dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 1 and 4096")
            }
        })
        .interact_text()?;

    let model_tag: String = Input::new()
        .with_prompt("Default model tag")
        .default(store.default_model_tag.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model tag cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    store.set_dimension(dimension)?;
    store.set_default_model_tag(model_tag)?;

    Ok(())
}

fn configure_query(query: &mut QueryConfig) -> Result<()> {
    let kind: String = Input::new()
        .with_prompt("Default kind")
        .default(query.kind.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Kind cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let threshold: f32 = Input::new()
        .with_prompt("Similarity threshold")
        .default(query.threshold)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=1.0).contains(input) {
                Ok(())
            } else {
                Err("Threshold must be between 0.0 and 1.0")
            }
        })
        .interact_text()?;

    let candidate_cap: usize = Input::new()
        .with_prompt("Candidate cap (nearest neighbours fetched before filtering)")
        .default(query.candidate_cap)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if *input == 0 {
                Err("Candidate cap must be greater than 0")
            } else if *input > 10_000 {
                Err("Candidate cap must be 10000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    query.set_kind(kind)?;
    query.set_threshold(threshold)?;
    query.set_candidate_cap(candidate_cap)?;

    Ok(())
}
