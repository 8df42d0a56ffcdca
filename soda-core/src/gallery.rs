//! Records handed to the gallery renderer.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::browser::BrowserTarget;
use crate::types::AnnotatedRegion;

pub const DEFAULT_GALLERY_TITLE: &str = "Soda Gallery";
pub const MANIFEST_FILE_NAME: &str = "gallery.json";

pub const PDF_DIR: &str = "pdfs";
pub const IMAGE_DIR: &str = "images";
pub const THUMBNAIL_DIR: &str = "images/thumbnails";

/// One snapshot as the gallery sees it. All URLs are relative to the
/// output directory except `external_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub image_url: String,
    pub thumbnail_url: String,
    pub pdf_url: String,
    pub external_url: String,
    pub title: String,
    pub description: String,
    pub genomic_region: String,
    pub image_width: u32,
    pub image_height: u32,
}

impl GalleryEntry {
    pub fn new(region: &AnnotatedRegion, target: &BrowserTarget, image_size: (u32, u32)) -> Self {
        let mut description = format!("[{}] {}", target.build_id, region.position());
        if let Some(label) = &region.label {
            description.push(' ');
            description.push_str(label);
        }

        Self {
            image_url: image_url(&region.id),
            thumbnail_url: thumbnail_url(&region.id),
            pdf_url: pdf_url(&region.id),
            external_url: target.external_url(region),
            title: region.label.clone().unwrap_or_else(|| region.id.clone()),
            description,
            genomic_region: format!(
                "{} : {} - {}",
                region.chrom, region.display_start, region.display_stop
            ),
            image_width: image_size.0,
            image_height: image_size.1,
        }
    }
}

pub fn pdf_url(id: &str) -> String {
    format!("{}/{}.pdf", PDF_DIR, id)
}

pub fn image_url(id: &str) -> String {
    format!("{}/{}.png", IMAGE_DIR, id)
}

pub fn thumbnail_url(id: &str) -> String {
    format!("{}/{}-thumbnail.png", THUMBNAIL_DIR, id)
}

/// `gallery.json`: everything the HTML renderer needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GalleryManifest {
    pub title: String,
    pub timestamp: String,
    pub build: String,
    pub entries: Vec<GalleryEntry>,
}

impl GalleryManifest {
    pub fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.write_all(b"\n")?;
        writer.flush()
    }

    pub fn read_from(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }
}
