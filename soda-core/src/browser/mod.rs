//! Remote genome browser: endpoints, transport seam and response parsing.
//!
//! [`BrowserService`] is the boundary the acquirer talks to. [`HttpBrowser`]
//! is the real implementation; tests substitute a scripted fake.

pub mod auth;
pub mod http;
pub mod retry;

use regex::Regex;
use std::io::Write;
use std::sync::OnceLock;
use thiserror::Error;

use crate::types::AnnotatedRegion;

pub use auth::{Credentials, NEGOTIATE_TOKEN_ENV};
pub use http::HttpBrowser;
pub use retry::{RetryPolicy, RETRY_STATUS_CODES};

pub const DEFAULT_BASE_URL: &str = "https://genome.ucsc.edu";
pub const CART_DUMP_PATH: &str = "cgi-bin/cartDump?cartDumpAsTable=[]";
pub const RENDER_PATH: &str = "cgi-bin/hgTracks";

/// Filename pattern of the rendered document link on the render page.
pub const DOCUMENT_LINK_PATTERN: &str = r"hgt_[a-z0-9_]*\.pdf";

pub const DEFAULT_TEXT_SIZE: u32 = 8;
pub const DEFAULT_LABEL_WIDTH: u32 = 17;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Authentication required by {url}; supply basic credentials or a negotiate token")]
    Unauthorized { url: String },
    #[error("Browser request to {url} failed with status {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("Incomplete response from {url}: {message}")]
    Truncated { url: String, message: String },
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrowserError {
    /// Failures worth retrying at the transport layer.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => RETRY_STATUS_CODES.contains(status),
            // A reset before any response bytes surfaces as a request error.
            Self::Transport(err) => err.is_connect() || err.is_timeout() || err.is_request(),
            _ => false,
        }
    }

    /// Response arrived but its body was cut short.
    pub fn is_truncated(&self) -> bool {
        match self {
            Self::Truncated { .. } => true,
            Self::Transport(err) => err.is_body() || err.is_decode(),
            _ => false,
        }
    }
}

/// The browser instance and session a run renders against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserTarget {
    base_url: String,
    pub session_id: String,
    pub build_id: String,
}

impl BrowserTarget {
    pub fn new(
        base_url: impl Into<String>,
        session_id: impl Into<String>,
        build_id: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            session_id: session_id.into(),
            build_id: build_id.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn cart_dump_url(&self) -> String {
        format!("{}/{}", self.base_url, CART_DUMP_PATH)
    }

    pub fn render_url(&self, region: &AnnotatedRegion) -> String {
        format!(
            "{}/{}?hgsid={}&hgt.psOutput=on&db={}&position={}",
            self.base_url,
            RENDER_PATH,
            urlencoding::encode(&self.session_id),
            urlencoding::encode(&self.build_id),
            region.encoded_position()
        )
    }

    /// Link to the interactive browser view of `region`.
    pub fn external_url(&self, region: &AnnotatedRegion) -> String {
        format!(
            "{}/{}?db={}&position={}%3A{}-{}&hgsid={}",
            self.base_url,
            RENDER_PATH,
            urlencoding::encode(&self.build_id),
            urlencoding::encode(&region.chrom),
            region.display_start,
            region.display_stop,
            urlencoding::encode(&self.session_id)
        )
    }

    /// Form body that moves the session cart to `region`.
    pub fn cart_form(&self, region: &AnnotatedRegion) -> Vec<(&'static str, String)> {
        vec![
            ("hgsid", self.session_id.clone()),
            ("hgt.psOutput", "on".to_string()),
            ("cartDump.varName", "position".to_string()),
            ("cartDump.newValue", region.position()),
            ("submit", "submit".to_string()),
        ]
    }

    /// Rewrite `..` path segments of a render-page href against the base URL.
    pub fn resolve_href(&self, href: &str) -> String {
        href.replace("..", &self.base_url)
    }
}

/// Session values reported by the cart dump.
///
/// Kept for diagnostics only; overlay geometry never reads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartSettings {
    pub text_size: u32,
    pub label_width: u32,
}

impl Default for CartSettings {
    fn default() -> Self {
        Self {
            text_size: DEFAULT_TEXT_SIZE,
            label_width: DEFAULT_LABEL_WIDTH,
        }
    }
}

impl CartSettings {
    pub fn parse(body: &str) -> Self {
        let mut text_size = None;
        let mut label_width = None;

        for line in body.lines() {
            let mut fields = line.split_whitespace();
            let (Some(key), Some(value)) = (fields.next(), fields.next()) else {
                continue;
            };
            match key {
                "textSize" => text_size = value.parse().ok(),
                "hgt.labelWidth" => label_width = value.parse().ok(),
                _ => {}
            }
        }

        if text_size.is_none() {
            log::warn!("Cart dump has no usable textSize; using {}", DEFAULT_TEXT_SIZE);
        }
        if label_width.is_none() {
            log::warn!("Cart dump has no usable hgt.labelWidth; using {}", DEFAULT_LABEL_WIDTH);
        }

        Self {
            text_size: text_size.unwrap_or(DEFAULT_TEXT_SIZE),
            label_width: label_width.unwrap_or(DEFAULT_LABEL_WIDTH),
        }
    }
}

fn anchor_href_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>]+))"#)
            .expect("anchor regex must compile")
    })
}

fn document_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(DOCUMENT_LINK_PATTERN).expect("document link regex must compile"))
}

/// Every anchor href on a render page that points at a rendered document,
/// resolved against the target's base URL. Duplicates are kept.
pub fn find_document_links(html: &str, target: &BrowserTarget) -> Vec<String> {
    anchor_href_regex()
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|m| m.as_str())
        .filter(|href| document_link_regex().is_match(href))
        .map(|href| target.resolve_href(href))
        .collect()
}

/// Operations the snapshot protocol needs from a browser.
pub trait BrowserService: Send + Sync {
    fn target(&self) -> &BrowserTarget;

    /// Point the session at `region`; returns the cart dump body.
    fn submit_position(&self, region: &AnnotatedRegion) -> Result<String, BrowserError>;

    /// Fetch the render page for `region`.
    fn fetch_render_page(&self, region: &AnnotatedRegion) -> Result<String, BrowserError>;

    /// Stream `url` into `sink`, returning the number of bytes written.
    fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, BrowserError>;
}
