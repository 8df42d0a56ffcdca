//! soda rendering library
//!
//! Bounding box extraction from snapshot PDFs, watermark overlays and the
//! ImageMagick tools that rasterize them.

pub mod bbox;
pub mod watermark;
pub mod compose;
pub mod tools;
mod pdf;

pub use bbox::{extract_first_rect, BboxError, BoundingBox, Primitive};
pub use watermark::{AnnotationMode, OverlayStyle, PageSize, WatermarkError, WatermarkSpec};
pub use compose::{merge_onto_overlay, Compositor};
pub use tools::{ImageMagick, ToolError};
