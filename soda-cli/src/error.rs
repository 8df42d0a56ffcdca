//! Error handling for the soda CLI

use soda_core::{AcquireError, BrowserError, RegionError};
use soda_render::{BboxError, ToolError, WatermarkError};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for soda CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Invalid regions file: {message}")]
    Regions { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("External tool error: {tool} - {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Authentication error: {message}")]
    Authentication { message: String },

    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    #[error("Rendering error: {message}")]
    Rendering { message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn regions<S: Into<String>>(message: S) -> Self {
        Self::Regions { message: message.into() }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }

    pub fn external_tool<S: Into<String>>(tool: S, message: S) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication { message: message.into() }
    }

    pub fn snapshot<S: Into<String>>(message: S) -> Self {
        Self::Snapshot { message: message.into() }
    }

    pub fn rendering<S: Into<String>>(message: S) -> Self {
        Self::Rendering { message: message.into() }
    }

    /// Pick the user-facing category of a failed run from the innermost
    /// recognised cause. The message keeps the whole context chain.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        let mut context = Vec::new();

        for cause in err.chain() {
            if let Some(cli) = cause.downcast_ref::<CliError>() {
                return cli.with_context(&context);
            }
            if let Some(tool) = cause.downcast_ref::<ToolError>() {
                return Self::external_tool(tool_name(tool), message);
            }
            if let Some(browser) = cause.downcast_ref::<BrowserError>() {
                return match browser {
                    BrowserError::Unauthorized { .. } => Self::authentication(message),
                    _ => Self::network(message),
                };
            }
            if let Some(acquire) = cause.downcast_ref::<AcquireError>() {
                if !matches!(acquire, AcquireError::Browser(_)) {
                    return Self::snapshot(message);
                }
            }
            if let Some(region) = cause.downcast_ref::<RegionError>() {
                return match region {
                    RegionError::Io(_) => Self::io(message),
                    _ => Self::regions(message),
                };
            }
            if cause.downcast_ref::<BboxError>().is_some() || cause.downcast_ref::<WatermarkError>().is_some() {
                // A watermark failure may wrap a tool failure.
                if let Some(tool) = cause.source().and_then(|s| s.downcast_ref::<ToolError>()) {
                    return Self::external_tool(tool_name(tool), message);
                }
                return Self::rendering(message);
            }
            context.push(cause.to_string());
        }

        Self::io(message)
    }

    /// Same category with the outer context prepended to the message.
    fn with_context(&self, context: &[String]) -> Self {
        let wrap = |message: &str| {
            if context.is_empty() {
                message.to_string()
            } else {
                format!("{}: {}", context.join(": "), message)
            }
        };
        match self {
            Self::Config { message } => Self::config(wrap(message)),
            Self::Io { message } => Self::io(wrap(message)),
            Self::FileNotFound { path } => Self::file_not_found(path.clone()),
            Self::Regions { message } => Self::regions(wrap(message)),
            Self::Validation { message } => Self::validation(wrap(message)),
            Self::ExternalTool { tool, message } => Self::external_tool(tool.clone(), wrap(message)),
            Self::Network { message } => Self::network(wrap(message)),
            Self::Authentication { message } => Self::authentication(wrap(message)),
            Self::Snapshot { message } => Self::snapshot(wrap(message)),
            Self::Rendering { message } => Self::rendering(wrap(message)),
        }
    }
}

fn tool_name(err: &ToolError) -> String {
    match err {
        ToolError::NotFound { tool, .. }
        | ToolError::Spawn { tool, .. }
        | ToolError::Failed { tool, .. }
        | ToolError::UnexpectedOutput { tool, .. } => tool.clone(),
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<toml::ser::Error> for CliError {
    fn from(err: toml::ser::Error) -> Self {
        Self::config(format!("TOML serialization error: {}", err))
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Provide helpful error messages and suggestions
pub fn format_error_with_suggestions(error: &CliError) -> String {
    let mut message = error.to_string();

    match error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file",
                path.display()
            ));
        }

        CliError::Regions { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Each line needs tab-separated chrom, start and stop, plus an optional label\n\
                 • Start and stop must be integers with start <= stop\n\
                 • Use 'soda annotate -r <file>' to check the file before a gallery run",
            );
        }

        CliError::ExternalTool { tool, .. } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Install ImageMagick, which provides {}\n\
                 • Ensure {} is in your PATH, or set it with --{} / [tools] in soda.toml\n\
                 • Check that Ghostscript is installed so ImageMagick can read PDF files",
                tool,
                tool,
                if tool.ends_with("identify") { "identify" } else { "convert" }
            ));
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your soda.toml configuration file\n\
                 • Use 'soda config --example' to generate a sample configuration\n\
                 • Verify that all configuration values are valid",
            );
        }

        CliError::Authentication { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Pass --username and --password for basic authentication\n\
                 • For negotiate authentication, export SODA_NEGOTIATE_TOKEN and pass --negotiate\n\
                 • Check that the session belongs to the authenticated user",
            );
        }

        CliError::Network { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check the browser URL with --browser-url\n\
                 • Verify the session ID is still valid in the browser\n\
                 • Retry later if the server reported 5xx errors",
            );
        }

        CliError::Snapshot { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Open the session in the browser and check that the region renders\n\
                 • Reduce --jobs if the server is under load",
            );
        }

        _ => {}
    }

    message
}

/// Print error with helpful suggestions and exit
pub fn print_error_and_exit(error: &CliError) -> ! {
    eprintln!("Error: {}", format_error_with_suggestions(error));
    std::process::exit(1);
}
