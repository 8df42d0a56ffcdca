//! ImageMagick `convert` and `identify` wrappers.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

use crate::watermark::PageSize;

pub const CONVERT: &str = "convert";
pub const IDENTIFY: &str = "identify";

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Could not find '{tool}' on PATH: {source}")]
    NotFound {
        tool: String,
        #[source]
        source: which::Error,
    },
    #[error("Could not run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
    #[error("Unexpected output from {tool}: '{output}'")]
    UnexpectedOutput { tool: String, output: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMagick {
    convert: PathBuf,
    identify: PathBuf,
}

impl ImageMagick {
    pub fn new(convert: impl Into<PathBuf>, identify: impl Into<PathBuf>) -> Self {
        Self {
            convert: convert.into(),
            identify: identify.into(),
        }
    }

    /// Resolve both tools, preferring configured paths over `PATH` lookup.
    pub fn discover(convert: Option<&Path>, identify: Option<&Path>) -> Result<Self, ToolError> {
        let convert = locate(CONVERT, convert)?;
        let identify = locate(IDENTIFY, identify)?;
        log::debug!("Using convert at {} and identify at {}", convert.display(), identify.display());
        Ok(Self { convert, identify })
    }

    /// Pixel width and height of the first frame of `path`.
    pub fn identify_dimensions(&self, path: &Path) -> Result<PageSize, ToolError> {
        let mut cmd = Command::new(&self.identify);
        cmd.arg("-ping").arg("-format").arg("%w %h\n").arg(path);
        let output = run(&mut cmd, IDENTIFY)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_dimensions(&stdout).ok_or_else(|| ToolError::UnexpectedOutput {
            tool: IDENTIFY.to_string(),
            output: stdout.trim().to_string(),
        })
    }

    /// `convert -density <density> <input> -background white -flatten <output>`
    pub fn rasterize(&self, input: &Path, output: &Path, density: u32) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.convert);
        cmd.arg("-density")
            .arg(density.to_string())
            .arg(input)
            .arg("-background")
            .arg("white")
            .arg("-flatten")
            .arg(output);
        run(&mut cmd, CONVERT).map(|_| ())
    }

    /// `convert -thumbnail <w>x<h> <input> <output>`
    pub fn thumbnail(&self, input: &Path, output: &Path, width: u32, height: u32) -> Result<(), ToolError> {
        let mut cmd = Command::new(&self.convert);
        cmd.arg("-thumbnail")
            .arg(format!("{}x{}", width, height))
            .arg(input)
            .arg(output);
        run(&mut cmd, CONVERT).map(|_| ())
    }
}

fn locate(tool: &str, configured: Option<&Path>) -> Result<PathBuf, ToolError> {
    let candidate = configured.map(Path::as_os_str).unwrap_or_else(|| tool.as_ref());
    which::which(candidate).map_err(|source| ToolError::NotFound {
        tool: candidate.to_string_lossy().into_owned(),
        source,
    })
}

fn run(cmd: &mut Command, tool: &str) -> Result<Output, ToolError> {
    log::debug!("Running {}: {:?}", tool, cmd);
    let output = cmd.output().map_err(|source| ToolError::Spawn {
        tool: tool.to_string(),
        source,
    })?;
    if !output.status.success() {
        return Err(ToolError::Failed {
            tool: tool.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(output)
}

/// First `"<w> <h>"` line of identify output.
fn parse_dimensions(stdout: &str) -> Option<PageSize> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let mut fields = line.split_whitespace();
    let width = fields.next()?.parse().ok()?;
    let height = fields.next()?.parse().ok()?;
    Some(PageSize { width, height })
}
