//! Gallery command implementation - render every region into a gallery directory

use anyhow::{Context, Result};

use crate::config::{Config, RunSettings};
use crate::pipeline;
use crate::GalleryArgs;

pub fn execute(config: &Config, args: GalleryArgs) -> Result<()> {
    let settings = RunSettings::resolve(config, &args).context("Invalid gallery options")?;

    log::info!("Regions: {}", settings.regions.display());
    log::info!("Output gallery: {}", settings.output_dir.display());
    log::info!(
        "Browser: {} (session {}, build {})",
        settings.target.base_url(),
        settings.target.session_id,
        settings.target.build_id
    );
    log::debug!("Run settings: {:?}", settings);

    let summary = pipeline::run(&settings)?;

    log::info!(
        "Gallery '{}' with {} snapshots written to {}",
        settings.title,
        summary.entries,
        summary.output_dir.display()
    );
    Ok(())
}
