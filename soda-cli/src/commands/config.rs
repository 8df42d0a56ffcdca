//! Config command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Config;

pub fn execute(config: &Config, example: bool, output: Option<PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            let defaults = Config::default();
            let selected = if example { &defaults } else { config };
            selected.save_to_file(&path)?;
            log::info!("Configuration written to {}", path.display());
        }
        None => {
            let content = if example {
                Config::example_toml()
            } else {
                config.to_toml()
            }
            .context("Failed to serialize configuration")?;
            print!("{}", content);
        }
    }

    Ok(())
}
