//! Snapshot acquisition: submit, poll for the document link, download.
//!
//! The link-discovery protocol is an explicit state machine:
//!
//! ```text
//! Submitting -> Polling -> Succeeded
//!                  |  ^
//!   (truncated) ---+--+
//!                  |
//!                  v (wrong link count)
//!                Retry -> Submitting ... -> Failed
//! ```
//!
//! Transport-level retries (5xx, resets) happen below this, inside the
//! [`BrowserService`] implementation.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::browser::{find_document_links, BrowserError, BrowserService, CartSettings};
use crate::types::AnnotatedRegion;

pub const DEFAULT_LINK_ATTEMPTS: usize = 5;
pub const DEFAULT_POLL_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error(transparent)]
    Browser(#[from] BrowserError),
    #[error("No or more than one document available for region {region} (found {found} after {attempts} attempts)")]
    LinkCount {
        region: String,
        found: usize,
        attempts: usize,
    },
    #[error("Could not retrieve a complete render page for region {region} after {attempts} attempts")]
    PollExhausted { region: String, attempts: usize },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Caps on the two link-discovery loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkLimits {
    /// Full submit + poll cycles before a wrong link count is fatal.
    pub link_attempts: usize,
    /// Render page fetches per cycle before truncated responses are fatal.
    pub poll_attempts: usize,
}

impl Default for LinkLimits {
    fn default() -> Self {
        Self {
            link_attempts: DEFAULT_LINK_ATTEMPTS,
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
        }
    }
}

/// A downloaded, not yet annotated, document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub region_id: String,
    pub pdf_path: PathBuf,
    pub bytes: u64,
    pub cart: CartSettings,
}

#[derive(Debug)]
enum AcquireState {
    Submitting { cycle: usize },
    Polling { cycle: usize, attempt: usize },
    Retry { cycle: usize, found: usize },
    Succeeded { url: String },
    Failed(AcquireError),
}

pub struct SnapshotAcquirer<'a> {
    service: &'a dyn BrowserService,
    limits: LinkLimits,
}

impl<'a> SnapshotAcquirer<'a> {
    pub fn new(service: &'a dyn BrowserService, limits: LinkLimits) -> Self {
        Self { service, limits }
    }

    /// Fetch the rendered document for `region` into `pdf_dir/<id>.pdf`.
    pub fn acquire(&self, region: &AnnotatedRegion, pdf_dir: &Path) -> Result<Snapshot, AcquireError> {
        let cart_path = pdf_dir.join(format!("{}.cartDump", region.id));
        let result = self.run(region, pdf_dir, &cart_path);
        if cart_path.exists() {
            if let Err(err) = fs::remove_file(&cart_path) {
                log::warn!("Could not remove {}: {}", cart_path.display(), err);
            }
        }
        result
    }

    fn run(&self, region: &AnnotatedRegion, pdf_dir: &Path, cart_path: &Path) -> Result<Snapshot, AcquireError> {
        let mut cart = CartSettings::default();
        let mut state = AcquireState::Submitting { cycle: 1 };

        let url = loop {
            state = match state {
                AcquireState::Submitting { cycle } => {
                    let body = self.service.submit_position(region)?;
                    fs::write(cart_path, &body)?;
                    cart = CartSettings::parse(&body);
                    log::debug!(
                        "Cart for {}: textSize {}, hgt.labelWidth {}",
                        region.id,
                        cart.text_size,
                        cart.label_width
                    );
                    AcquireState::Polling { cycle, attempt: 1 }
                }
                AcquireState::Polling { cycle, attempt } => match self.service.fetch_render_page(region) {
                    Ok(html) => {
                        let mut links = find_document_links(&html, self.service.target());
                        if links.len() == 1 {
                            AcquireState::Succeeded { url: links.remove(0) }
                        } else {
                            AcquireState::Retry {
                                cycle,
                                found: links.len(),
                            }
                        }
                    }
                    Err(err) if err.is_truncated() => {
                        if attempt >= self.limits.poll_attempts {
                            AcquireState::Failed(AcquireError::PollExhausted {
                                region: region.id.clone(),
                                attempts: attempt,
                            })
                        } else {
                            log::warn!("Could not retrieve render page for {} ({}); retrying", region.position(), err);
                            AcquireState::Polling {
                                cycle,
                                attempt: attempt + 1,
                            }
                        }
                    }
                    Err(err) => AcquireState::Failed(err.into()),
                },
                AcquireState::Retry { cycle, found } => {
                    if cycle >= self.limits.link_attempts {
                        AcquireState::Failed(AcquireError::LinkCount {
                            region: region.id.clone(),
                            found,
                            attempts: cycle,
                        })
                    } else {
                        log::warn!(
                            "Expected one document link for {}, found {}; resubmitting ({}/{})",
                            region.id,
                            found,
                            cycle + 1,
                            self.limits.link_attempts
                        );
                        AcquireState::Submitting { cycle: cycle + 1 }
                    }
                }
                AcquireState::Succeeded { url } => break url,
                AcquireState::Failed(err) => return Err(err),
            };
        };

        let pdf_path = pdf_dir.join(format!("{}.pdf", region.id));
        let bytes = match self.download(&url, &pdf_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                let _ = fs::remove_file(&pdf_path);
                return Err(err);
            }
        };
        log::info!("Retrieved {} ({} bytes)", pdf_path.display(), bytes);

        Ok(Snapshot {
            region_id: region.id.clone(),
            pdf_path,
            bytes,
            cart,
        })
    }

    fn download(&self, url: &str, path: &Path) -> Result<u64, AcquireError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let bytes = self.service.download(url, &mut writer)?;
        writer.flush()?;
        Ok(bytes)
    }
}
