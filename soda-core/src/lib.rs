//! soda core library
//!
//! Region annotation, the genome browser snapshot protocol, and the
//! records handed to the gallery renderer.

pub mod types;
pub mod regions;
pub mod browser;
pub mod acquire;
pub mod gallery;

// Re-export commonly used types and functions
pub use types::{AnnotatedRegion, GenomicPos, Region};
pub use regions::{RegionAnnotator, RegionError, write_annotated_table};
pub use browser::{
    BrowserError, BrowserService, BrowserTarget, CartSettings, Credentials, HttpBrowser, RetryPolicy,
};
pub use acquire::{AcquireError, LinkLimits, Snapshot, SnapshotAcquirer};
pub use gallery::{GalleryEntry, GalleryManifest};

/// Version information for the soda core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
