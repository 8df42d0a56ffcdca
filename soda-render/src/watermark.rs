//! Watermark geometry and SVG overlay markup.
//!
//! The overlay canvas is as wide as the snapshot and [`TOP_PADDING`] taller.
//! Coordinates in the markup are truncated to whole units.

use serde::{Deserialize, Serialize};
use soda_core::{AnnotatedRegion, GenomicPos};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use svg::node::element::{Line, Rectangle, Text};
use svg::Document;
use thiserror::Error;

use crate::bbox::BboxError;
use crate::tools::ToolError;

/// Extra canvas height above the snapshot, in document units.
pub const TOP_PADDING: u32 = 20;
/// Baseline of overlay labels, from the top of the canvas.
pub const LABEL_BASELINE: i64 = 8;
/// Gap between the marker line and its label.
pub const MARKER_LABEL_OFFSET: f64 = 3.0;
pub const MARKER_STROKE_WIDTH: &str = "0.25";
pub const INTERVAL_LABEL_FILL: &str = "rgba(0,0,0,1)";

pub const DEFAULT_RGBA: &str = "rgba(255, 0, 0, 0.333)";
pub const DEFAULT_FONT_FAMILY: &str = "Helvetica";
pub const DEFAULT_FONT_SIZE: f64 = 5.5;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("Label column ({label_column_width}) leaves no data column in a page {page_width} wide")]
    NoDataColumn {
        label_column_width: f64,
        page_width: u32,
    },
    #[error("Interval annotation requires a positive padding, got {0}")]
    InvalidPadding(GenomicPos),
    #[error("Document {0} has no usable first page")]
    EmptyDocument(PathBuf),
    #[error(transparent)]
    Bbox(#[from] BboxError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationMode {
    #[default]
    None,
    Midpoint,
    Interval,
}

impl AnnotationMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for AnnotationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Midpoint => "midpoint",
            Self::Interval => "interval",
        };
        f.write_str(name)
    }
}

impl FromStr for AnnotationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "midpoint" => Ok(Self::Midpoint),
            "interval" => Ok(Self::Interval),
            other => Err(format!(
                "unknown annotation mode '{}' (expected none, midpoint or interval)",
                other
            )),
        }
    }
}

/// Colour and font of the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    /// Any CSS colour; alpha is expected.
    pub rgba: String,
    pub font_family: String,
    pub font_size: f64,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            rgba: DEFAULT_RGBA.to_string(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size: DEFAULT_FONT_SIZE,
        }
    }
}

/// Pixel dimensions of a snapshot as reported by `identify`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSize {
    pub width: u32,
    pub height: u32,
}

impl PageSize {
    pub fn canvas_height(&self) -> u32 {
        self.height + TOP_PADDING
    }
}

/// Overlay geometry for one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum WatermarkSpec {
    /// Vertical line at the centre of the data column.
    Marker { x: f64, label_x: f64, label: String },
    /// Highlight whose width is the original interval's share of the
    /// padded window, centred in the data column.
    Interval {
        x: f64,
        width: f64,
        label_x: f64,
        label: String,
    },
}

fn data_column_width(page: PageSize, label_column_width: f64) -> Result<f64, WatermarkError> {
    let width = f64::from(page.width) - label_column_width;
    if width <= 0.0 {
        return Err(WatermarkError::NoDataColumn {
            label_column_width,
            page_width: page.width,
        });
    }
    Ok(width)
}

impl WatermarkSpec {
    pub fn marker(
        page: PageSize,
        label_column_width: f64,
        region: &AnnotatedRegion,
    ) -> Result<Self, WatermarkError> {
        let column = data_column_width(page, label_column_width)?;
        let x = label_column_width + column / 2.0;
        let mid = region.display_midpoint();
        Ok(Self::Marker {
            x,
            label_x: x + MARKER_LABEL_OFFSET,
            label: format!("{}:{}-{}", region.chrom, mid, mid + 1),
        })
    }

    pub fn interval(
        page: PageSize,
        label_column_width: f64,
        region: &AnnotatedRegion,
        padding: GenomicPos,
    ) -> Result<Self, WatermarkError> {
        if padding <= 0 {
            return Err(WatermarkError::InvalidPadding(padding));
        }
        let column = data_column_width(page, label_column_width)?;
        let ratio = region.original_width() as f64 / (2 * padding) as f64;
        let width = column * ratio;
        Ok(Self::Interval {
            x: label_column_width + (column - width) / 2.0,
            width,
            label_x: label_column_width + column / 2.0,
            label: format!(
                "{}:{}-{}",
                region.chrom, region.original_start, region.original_stop
            ),
        })
    }

    /// Geometry for `mode`, or `None` when annotation is off.
    pub fn for_mode(
        mode: AnnotationMode,
        page: PageSize,
        label_column_width: f64,
        region: &AnnotatedRegion,
        padding: Option<GenomicPos>,
    ) -> Result<Option<Self>, WatermarkError> {
        match mode {
            AnnotationMode::None => Ok(None),
            AnnotationMode::Midpoint => Self::marker(page, label_column_width, region).map(Some),
            AnnotationMode::Interval => {
                Self::interval(page, label_column_width, region, padding.unwrap_or(0)).map(Some)
            }
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Marker { label, .. } | Self::Interval { label, .. } => label,
        }
    }

    /// Overlay as an SVG document sized to the padded canvas.
    pub fn to_svg(&self, page: PageSize, style: &OverlayStyle) -> Document {
        let height = page.canvas_height();
        let document = Document::new()
            .set("xmlns:xlink", "http://www.w3.org/1999/xlink")
            .set("width", page.width)
            .set("height", height)
            .set("viewBox", (0, 0, page.width, height));

        match self {
            Self::Marker { x, label_x, label } => {
                let line = Line::new()
                    .set("x1", units(*x))
                    .set("y1", 0)
                    .set("x2", units(*x))
                    .set("y2", height)
                    .set(
                        "style",
                        format!(
                            "stroke:{};stroke-width:{};fill:none;",
                            style.rgba, MARKER_STROKE_WIDTH
                        ),
                    );
                let text = Text::new(label.clone())
                    .set("x", units(*label_x))
                    .set("y", LABEL_BASELINE)
                    .set(
                        "style",
                        format!(
                            "font-family:{};fill:{};font-size:{}",
                            style.font_family, style.rgba, style.font_size
                        ),
                    );
                document.add(line).add(text)
            }
            Self::Interval {
                x,
                width,
                label_x,
                label,
            } => {
                let rect = Rectangle::new()
                    .set("x", units(*x))
                    .set("y", 0)
                    .set("width", units(*width))
                    .set("height", height)
                    .set(
                        "style",
                        format!("fill:{};stroke-width:0;stroke:{}", style.rgba, style.rgba),
                    );
                let text = Text::new(label.clone())
                    .set("x", units(*label_x))
                    .set("y", LABEL_BASELINE)
                    .set("text-anchor", "middle")
                    .set(
                        "style",
                        format!(
                            "font-family:{};fill:{};font-size:{}",
                            style.font_family, INTERVAL_LABEL_FILL, style.font_size
                        ),
                    );
                document.add(rect).add(text)
            }
        }
    }

    pub fn write_svg(&self, path: &Path, page: PageSize, style: &OverlayStyle) -> Result<(), WatermarkError> {
        svg::save(path, &self.to_svg(page, style))?;
        Ok(())
    }
}

fn units(value: f64) -> i64 {
    value.trunc() as i64
}
