//! Bbox command implementation - report the first rectangle of a snapshot PDF

use anyhow::{Context, Result};
use soda_render::extract_first_rect;
use std::path::PathBuf;

use crate::error::CliError;

pub fn execute(pdf: PathBuf) -> Result<()> {
    if !pdf.is_file() {
        return Err(CliError::file_not_found(pdf).into());
    }

    let bbox = extract_first_rect(&pdf)
        .with_context(|| format!("Failed to extract a bounding box from {}", pdf.display()))?;

    println!(
        "first rectangle: left={} bottom={} right={} top={}",
        bbox.left, bbox.bottom, bbox.right, bbox.top
    );
    println!("label column width: {}", bbox.label_column_width());
    Ok(())
}
