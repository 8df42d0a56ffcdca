//! Annotate command implementation - print region ids and display coordinates

use anyhow::{Context, Result};
use soda_core::{write_annotated_table, GenomicPos, RegionAnnotator};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use crate::config::Config;
use crate::error::CliError;

pub fn execute(
    config: &Config,
    regions: PathBuf,
    range_padding: Option<GenomicPos>,
    output: Option<PathBuf>,
) -> Result<()> {
    if !regions.is_file() {
        return Err(CliError::file_not_found(regions).into());
    }

    let annotator = RegionAnnotator::new(range_padding.or(config.general.range_padding));
    let annotated = annotator
        .annotate_file(&regions)
        .with_context(|| format!("Failed to annotate regions in {}", regions.display()))?;
    log::info!("Annotated {} regions", annotated.len());

    match output {
        Some(path) => {
            let file = File::create(&path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            write_annotated_table(&annotated, BufWriter::new(file))?;
            log::info!("Wrote annotated table to {}", path.display());
        }
        None => {
            write_annotated_table(&annotated, io::stdout().lock())?;
        }
    }

    Ok(())
}
