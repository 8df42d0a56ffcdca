//! Configuration handling for the soda CLI
//!
//! Supports loading configuration from soda.toml files with CLI argument overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use soda_core::acquire::{DEFAULT_LINK_ATTEMPTS, DEFAULT_POLL_ATTEMPTS};
use soda_core::browser::retry::{DEFAULT_BACKOFF_UNIT, DEFAULT_MAX_RETRIES};
use soda_core::browser::{DEFAULT_BASE_URL, NEGOTIATE_TOKEN_ENV};
use soda_core::gallery::DEFAULT_GALLERY_TITLE;
use soda_core::{BrowserTarget, Credentials, GenomicPos, LinkLimits, RetryPolicy};
use soda_render::watermark::{DEFAULT_FONT_FAMILY, DEFAULT_FONT_SIZE, DEFAULT_RGBA};
use soda_render::{AnnotationMode, OverlayStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CliError, CliResult};
use crate::GalleryArgs;

pub const DEFAULT_CONFIG_FILE: &str = "soda.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub annotation: AnnotationConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Genome browser base URL
    #[serde(default = "default_browser_url")]
    pub url: String,

    /// Session ID the snapshots are rendered in
    #[serde(default)]
    pub session_id: Option<String>,

    /// Genome build of the session
    #[serde(default)]
    pub build_id: Option<String>,

    /// Basic authentication username
    #[serde(default)]
    pub username: Option<String>,

    /// Basic authentication password
    #[serde(default)]
    pub password: Option<String>,

    /// Use a negotiate token from the environment
    #[serde(default)]
    pub negotiate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// none, midpoint or interval
    #[serde(default)]
    pub mode: AnnotationMode,

    #[serde(default = "default_rgba")]
    pub rgba: String,

    #[serde(default = "default_font_family")]
    pub font_family: String,

    #[serde(default = "default_font_size")]
    pub font_size: f64,

    /// Overlay rasterization density (dpi)
    #[serde(default = "default_resolution")]
    pub resolution: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_title")]
    pub title: String,

    /// PNG rasterization density (dpi)
    #[serde(default = "default_resolution")]
    pub png_resolution: u32,

    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_width: u32,

    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Transport retries on 5xx and connection failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Backoff unit in seconds
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,

    /// Submit and poll cycles before a wrong link count is fatal
    #[serde(default = "default_link_attempts")]
    pub link_attempts: usize,

    /// Render page fetches per cycle
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// ImageMagick convert; looked up on PATH when unset
    #[serde(default)]
    pub convert: Option<PathBuf>,

    /// ImageMagick identify; looked up on PATH when unset
    #[serde(default)]
    pub identify: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Regions processed concurrently
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    /// Symmetric padding around each region midpoint
    #[serde(default)]
    pub range_padding: Option<GenomicPos>,
}

// Default value functions
fn default_browser_url() -> String { DEFAULT_BASE_URL.to_string() }
fn default_rgba() -> String { DEFAULT_RGBA.to_string() }
fn default_font_family() -> String { DEFAULT_FONT_FAMILY.to_string() }
fn default_font_size() -> f64 { DEFAULT_FONT_SIZE }
fn default_resolution() -> u32 { 150 }
fn default_title() -> String { DEFAULT_GALLERY_TITLE.to_string() }
fn default_thumbnail_size() -> u32 { 480 }
fn default_max_retries() -> usize { DEFAULT_MAX_RETRIES }
fn default_backoff_seconds() -> u64 { DEFAULT_BACKOFF_UNIT.as_secs() }
fn default_link_attempts() -> usize { DEFAULT_LINK_ATTEMPTS }
fn default_poll_attempts() -> usize { DEFAULT_POLL_ATTEMPTS }
fn default_jobs() -> usize { 1 }

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            url: default_browser_url(),
            session_id: None,
            build_id: None,
            username: None,
            password: None,
            negotiate: false,
        }
    }
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            mode: AnnotationMode::None,
            rgba: default_rgba(),
            font_family: default_font_family(),
            font_size: default_font_size(),
            resolution: default_resolution(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            png_resolution: default_resolution(),
            thumbnail_width: default_thumbnail_size(),
            thumbnail_height: default_thumbnail_size(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_seconds: default_backoff_seconds(),
            link_attempts: default_link_attempts(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            range_padding: None,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Self::load_from_file(path)?
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Loading configuration from: {}", DEFAULT_CONFIG_FILE);
                    Self::load_from_file(&default_path)?
                } else {
                    log::debug!("Using default configuration");
                    Self::default()
                }
            }
        };

        Ok(config)
    }

    /// Load configuration from a specific TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .map_err(CliError::from)
            .with_context(|| format!("Failed to parse configuration file: {}", path.display()))?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write configuration file: {}", path.display()))?;

        Ok(())
    }

    pub fn to_toml(&self) -> CliResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Generate example configuration file content
    pub fn example_toml() -> CliResult<String> {
        Self::default().to_toml()
    }
}

/// Everything a gallery run needs, merged from flags and configuration
/// and checked once up front.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub regions: PathBuf,
    pub output_dir: PathBuf,
    pub title: String,
    pub target: BrowserTarget,
    pub credentials: Option<Credentials>,
    pub retry: RetryPolicy,
    pub limits: LinkLimits,
    pub padding: Option<GenomicPos>,
    pub mode: AnnotationMode,
    pub style: OverlayStyle,
    pub annotation_resolution: u32,
    pub png_resolution: u32,
    pub thumbnail_size: (u32, u32),
    pub convert: Option<PathBuf>,
    pub identify: Option<PathBuf>,
    pub jobs: usize,
}

impl RunSettings {
    pub fn resolve(config: &Config, args: &GalleryArgs) -> CliResult<Self> {
        let regions = args
            .regions
            .clone()
            .ok_or_else(|| CliError::validation("a regions file is required (--regions)"))?;
        let output_dir = args
            .output
            .clone()
            .ok_or_else(|| CliError::validation("an output directory is required (--output)"))?;
        let session_id = args
            .session_id
            .clone()
            .or_else(|| config.browser.session_id.clone())
            .ok_or_else(|| CliError::validation("a browser session ID is required (--session-id)"))?;
        let build_id = args
            .build_id
            .clone()
            .or_else(|| config.browser.build_id.clone())
            .ok_or_else(|| CliError::validation("a genome build ID is required (--build-id)"))?;

        if !regions.is_file() {
            return Err(CliError::file_not_found(regions));
        }

        let padding = args
            .range_padding
            .or(config.general.range_padding)
            .filter(|&padding| padding != 0);

        let mode = match (args.midpoint, args.interval) {
            (true, true) => {
                return Err(CliError::validation(
                    "cannot annotate both the midpoint and the interval; choose one",
                ))
            }
            (true, false) => AnnotationMode::Midpoint,
            (false, true) => AnnotationMode::Interval,
            (false, false) => config.annotation.mode,
        };
        // A negative padding shrinks the view, which leaves no interval to shade.
        if mode == AnnotationMode::Interval && !matches!(padding, Some(p) if p > 0) {
            return Err(CliError::validation(
                "interval annotation needs a positive range padding (--range)",
            ));
        }

        let credentials = resolve_credentials(config, args)?;

        let style = OverlayStyle {
            rgba: args.rgba.clone().unwrap_or_else(|| config.annotation.rgba.clone()),
            font_family: args
                .font_family
                .clone()
                .unwrap_or_else(|| config.annotation.font_family.clone()),
            font_size: args.font_size.unwrap_or(config.annotation.font_size),
        };
        if style.font_size.is_nan() || style.font_size <= 0.0 {
            return Err(CliError::validation(format!("font size must be positive, got {}", style.font_size)));
        }

        let annotation_resolution = args.annotation_resolution.unwrap_or(config.annotation.resolution);
        let png_resolution = args.png_resolution.unwrap_or(config.output.png_resolution);
        let thumbnail_size = (
            args.thumbnail_width.unwrap_or(config.output.thumbnail_width),
            args.thumbnail_height.unwrap_or(config.output.thumbnail_height),
        );
        if annotation_resolution == 0 || png_resolution == 0 {
            return Err(CliError::validation("resolutions must be positive"));
        }
        if thumbnail_size.0 == 0 || thumbnail_size.1 == 0 {
            return Err(CliError::validation("thumbnail dimensions must be positive"));
        }

        let jobs = args.jobs.unwrap_or(config.general.jobs);
        if jobs == 0 {
            return Err(CliError::validation("--jobs must be at least 1"));
        }

        let network = &config.network;
        if network.link_attempts == 0 || network.poll_attempts == 0 {
            return Err(CliError::config("link_attempts and poll_attempts must be at least 1"));
        }

        Ok(Self {
            regions,
            output_dir,
            title: args.title.clone().unwrap_or_else(|| config.output.title.clone()),
            target: BrowserTarget::new(
                args.browser_url.clone().unwrap_or_else(|| config.browser.url.clone()),
                session_id,
                build_id,
            ),
            credentials,
            retry: RetryPolicy::new(network.max_retries, Duration::from_secs(network.backoff_seconds)),
            limits: LinkLimits {
                link_attempts: network.link_attempts,
                poll_attempts: network.poll_attempts,
            },
            padding,
            mode,
            style,
            annotation_resolution,
            png_resolution,
            thumbnail_size,
            convert: args.convert.clone().or_else(|| config.tools.convert.clone()),
            identify: args.identify.clone().or_else(|| config.tools.identify.clone()),
            jobs,
        })
    }
}

fn resolve_credentials(config: &Config, args: &GalleryArgs) -> CliResult<Option<Credentials>> {
    let username = args.username.clone().or_else(|| config.browser.username.clone());
    let password = args.password.clone().or_else(|| config.browser.password.clone());
    let negotiate = args.negotiate || config.browser.negotiate;

    match (username, password, negotiate) {
        (None, None, false) => Ok(None),
        (Some(_), _, true) | (_, Some(_), true) => Err(CliError::validation(
            "basic and negotiate authentication are mutually exclusive",
        )),
        (None, None, true) => Credentials::negotiate_from_env().map(Some).ok_or_else(|| {
            CliError::authentication(format!(
                "negotiate authentication requested but {} is not set",
                NEGOTIATE_TOKEN_ENV
            ))
        }),
        (Some(username), Some(password), false) => Ok(Some(Credentials::basic(username, password))),
        (Some(_), None, false) | (None, Some(_), false) => Err(CliError::validation(
            "basic authentication needs both a username and a password",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn gallery_args(regions: &Path) -> GalleryArgs {
        GalleryArgs {
            regions: Some(regions.to_path_buf()),
            session_id: Some("123_abc".to_string()),
            build_id: Some("hg38".to_string()),
            output: Some(PathBuf::from("my-gallery")),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.browser.url, "https://genome.ucsc.edu");
        assert_eq!(config.annotation.mode, AnnotationMode::None);
        assert_eq!(config.annotation.rgba, "rgba(255, 0, 0, 0.333)");
        assert_eq!(config.annotation.font_size, 5.5);
        assert_eq!(config.output.title, "Soda Gallery");
        assert_eq!(config.output.png_resolution, 150);
        assert_eq!(config.output.thumbnail_width, 480);
        assert_eq!(config.network.max_retries, 5);
        assert_eq!(config.general.jobs, 1);
    }

    #[test]
    fn test_config_roundtrip() -> Result<()> {
        let mut config = Config::default();
        config.annotation.mode = AnnotationMode::Interval;
        config.general.range_padding = Some(5000);
        let temp_file = NamedTempFile::new()?;

        config.save_to_file(temp_file.path())?;
        let loaded_config = Config::load_from_file(temp_file.path())?;

        assert_eq!(loaded_config.annotation.mode, AnnotationMode::Interval);
        assert_eq!(loaded_config.general.range_padding, Some(5000));
        assert_eq!(config.browser.url, loaded_config.browser.url);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let config: Config = toml::from_str("[browser]\nsession_id = \"42_xyz\"\n")?;
        assert_eq!(config.browser.session_id.as_deref(), Some("42_xyz"));
        assert_eq!(config.browser.url, "https://genome.ucsc.edu");
        assert_eq!(config.output.thumbnail_height, 480);
        Ok(())
    }

    #[test]
    fn test_example_toml_generation() {
        let example = Config::example_toml().unwrap();
        assert!(example.contains("[browser]"));
        assert!(example.contains("[annotation]"));
        assert!(example.contains("[network]"));
        assert!(example.contains("mode = \"none\""));
    }

    #[test]
    fn test_flags_override_config() {
        let regions = NamedTempFile::new().unwrap();
        let mut config = Config::default();
        config.browser.session_id = Some("from_file".to_string());
        config.output.title = "From file".to_string();

        let mut args = gallery_args(regions.path());
        args.title = Some("From flags".to_string());
        args.browser_url = Some("https://browser.example.org/".to_string());

        let settings = RunSettings::resolve(&config, &args).unwrap();
        assert_eq!(settings.target.session_id, "123_abc");
        assert_eq!(settings.target.base_url(), "https://browser.example.org");
        assert_eq!(settings.title, "From flags");
        assert_eq!(settings.jobs, 1);
        assert!(settings.credentials.is_none());
    }

    #[test]
    fn test_missing_session_is_rejected() {
        let regions = NamedTempFile::new().unwrap();
        let mut args = gallery_args(regions.path());
        args.session_id = None;
        let err = RunSettings::resolve(&Config::default(), &args).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn test_missing_regions_file() {
        let args = gallery_args(Path::new("/nonexistent/regions.bed"));
        let err = RunSettings::resolve(&Config::default(), &args).unwrap_err();
        assert!(matches!(err, CliError::FileNotFound { .. }));
    }

    #[test]
    fn test_midpoint_and_interval_are_exclusive() {
        let regions = NamedTempFile::new().unwrap();
        let mut args = gallery_args(regions.path());
        args.midpoint = true;
        args.interval = true;
        args.range_padding = Some(100);
        let err = RunSettings::resolve(&Config::default(), &args).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn test_interval_needs_padding() {
        let regions = NamedTempFile::new().unwrap();
        let mut args = gallery_args(regions.path());
        args.interval = true;
        assert!(RunSettings::resolve(&Config::default(), &args).is_err());

        args.range_padding = Some(0);
        assert!(RunSettings::resolve(&Config::default(), &args).is_err());

        args.range_padding = Some(250);
        let settings = RunSettings::resolve(&Config::default(), &args).unwrap();
        assert_eq!(settings.mode, AnnotationMode::Interval);
        assert_eq!(settings.padding, Some(250));

        args.range_padding = Some(-250);
        let err = RunSettings::resolve(&Config::default(), &args).unwrap_err();
        assert!(matches!(err, CliError::Validation { .. }));
    }

    #[test]
    fn test_negative_padding_is_accepted() {
        let regions = NamedTempFile::new().unwrap();
        let mut args = gallery_args(regions.path());
        args.range_padding = Some(-20);
        let settings = RunSettings::resolve(&Config::default(), &args).unwrap();
        assert_eq!(settings.padding, Some(-20));

        args.midpoint = true;
        let settings = RunSettings::resolve(&Config::default(), &args).unwrap();
        assert_eq!(settings.mode, AnnotationMode::Midpoint);
    }

    #[test]
    fn test_basic_credentials() {
        let regions = NamedTempFile::new().unwrap();
        let mut args = gallery_args(regions.path());
        args.username = Some("alice".to_string());
        assert!(RunSettings::resolve(&Config::default(), &args).is_err());

        args.password = Some("secret".to_string());
        let settings = RunSettings::resolve(&Config::default(), &args).unwrap();
        assert_eq!(settings.credentials.map(|c| c.scheme()), Some("basic"));

        args.negotiate = true;
        assert!(RunSettings::resolve(&Config::default(), &args).is_err());
    }
}
