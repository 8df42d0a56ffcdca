//! Overlay compositing.
//!
//! The snapshot's first page is wrapped in a Form XObject and drawn on top
//! of every page of the rasterized overlay. The merged document then
//! replaces the snapshot file.

use lopdf::{dictionary, Dictionary, Document, Object, Stream};
use soda_core::{AnnotatedRegion, GenomicPos};
use std::fs;
use std::path::{Path, PathBuf};

use crate::bbox::extract_first_rect;
use crate::pdf::{first_page, inherited, page_resources};
use crate::tools::ImageMagick;
use crate::watermark::{AnnotationMode, OverlayStyle, PageSize, WatermarkError, WatermarkSpec};

/// Resource name of the snapshot on the merged page.
const SNAPSHOT_XOBJECT: &str = "SodaSnapshot";

/// Draw the first page of `snapshot_pdf` over every page of `overlay_pdf`,
/// writing the result to `output`.
pub fn merge_onto_overlay(snapshot_pdf: &Path, overlay_pdf: &Path, output: &Path) -> Result<(), WatermarkError> {
    let mut merged = Document::load(overlay_pdf)?;
    let mut snapshot = Document::load(snapshot_pdf)?;
    snapshot.renumber_objects_with(merged.max_id + 1);

    let page_id = first_page(&snapshot).ok_or_else(|| WatermarkError::EmptyDocument(snapshot_pdf.to_path_buf()))?;
    let content = snapshot.get_page_content(page_id)?;
    let resources = page_resources(&snapshot, page_id)?.cloned().unwrap_or_default();
    let media_box = inherited(&snapshot, page_id, b"MediaBox")?
        .cloned()
        .ok_or_else(|| WatermarkError::EmptyDocument(snapshot_pdf.to_path_buf()))?;

    merged.max_id = merged.max_id.max(snapshot.max_id);
    merged.objects.extend(snapshot.objects);

    let form_id = merged.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => media_box,
            "Resources" => resources,
        },
        content,
    ));

    let overlay_pages: Vec<_> = merged.get_pages().into_values().collect();
    for overlay_page in overlay_pages {
        let mut body = b"q\n".to_vec();
        body.extend(merged.get_page_content(overlay_page)?);
        body.extend_from_slice(format!("\nQ\nq 1 0 0 1 0 0 cm /{} Do Q\n", SNAPSHOT_XOBJECT).as_bytes());
        let content_id = merged.add_object(Stream::new(dictionary! {}, body));

        let mut resources = page_resources(&merged, overlay_page)?.cloned().unwrap_or_default();
        let mut xobjects = match resources.get(b"XObject") {
            Ok(Object::Reference(id)) => merged.get_dictionary(*id)?.clone(),
            Ok(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        };
        xobjects.set(SNAPSHOT_XOBJECT, form_id);
        resources.set("XObject", xobjects);

        let page = merged.get_object_mut(overlay_page)?.as_dict_mut()?;
        page.set("Contents", content_id);
        page.set("Resources", resources);
    }

    merged.prune_objects();
    merged.compress();
    merged.save(output)?;
    Ok(())
}

/// Applies the configured watermark to snapshot documents in place.
pub struct Compositor<'a> {
    tools: &'a ImageMagick,
    mode: AnnotationMode,
    style: OverlayStyle,
    resolution: u32,
    padding: Option<GenomicPos>,
}

impl<'a> Compositor<'a> {
    pub fn new(
        tools: &'a ImageMagick,
        mode: AnnotationMode,
        style: OverlayStyle,
        resolution: u32,
        padding: Option<GenomicPos>,
    ) -> Self {
        Self {
            tools,
            mode,
            style,
            resolution,
            padding,
        }
    }

    /// Measure, build and composite the overlay for `region` onto `pdf`.
    /// Returns the applied geometry, or `None` when annotation is off.
    pub fn annotate(&self, pdf: &Path, region: &AnnotatedRegion) -> Result<Option<WatermarkSpec>, WatermarkError> {
        if !self.mode.is_enabled() {
            return Ok(None);
        }

        let page = self.tools.identify_dimensions(pdf)?;
        let bbox = extract_first_rect(pdf)?;
        let label_column_width = bbox.label_column_width();
        log::debug!(
            "{}: page {}x{}, label column {}",
            region.id,
            page.width,
            page.height,
            label_column_width
        );

        let Some(spec) = WatermarkSpec::for_mode(self.mode, page, label_column_width, region, self.padding)? else {
            return Ok(None);
        };

        let scratch = ScratchFiles::for_document(pdf);
        let result = self.apply(pdf, &spec, page, &scratch);
        scratch.remove();
        result?;

        log::info!("Annotated {} ({})", region.id, spec.label());
        Ok(Some(spec))
    }

    fn apply(
        &self,
        pdf: &Path,
        spec: &WatermarkSpec,
        page: PageSize,
        scratch: &ScratchFiles,
    ) -> Result<(), WatermarkError> {
        spec.write_svg(&scratch.svg, page, &self.style)?;
        self.tools.rasterize(&scratch.svg, &scratch.overlay, self.resolution)?;
        merge_onto_overlay(pdf, &scratch.overlay, &scratch.merged)?;
        fs::copy(&scratch.merged, pdf)?;
        Ok(())
    }
}

/// Transient files of one compositing run, named after the document.
struct ScratchFiles {
    svg: PathBuf,
    overlay: PathBuf,
    merged: PathBuf,
}

impl ScratchFiles {
    fn for_document(pdf: &Path) -> Self {
        let with_suffix = |suffix: &str| {
            let mut name = pdf.as_os_str().to_os_string();
            name.push(suffix);
            PathBuf::from(name)
        };
        Self {
            svg: with_suffix(".watermark.svg"),
            overlay: with_suffix(".watermark.pdf"),
            merged: with_suffix(".watermarked"),
        }
    }

    fn remove(&self) {
        for path in [&self.svg, &self.overlay, &self.merged] {
            if path.exists() {
                if let Err(err) = fs::remove_file(path) {
                    log::warn!("Could not remove {}: {}", path.display(), err);
                }
            }
        }
    }
}
