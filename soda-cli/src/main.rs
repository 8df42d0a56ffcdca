use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod error;
mod pipeline;

use config::Config;
use soda_core::GenomicPos;

#[derive(Parser)]
#[command(name = "soda")]
#[command(about = "soda - genome browser snapshot galleries")]
#[command(version)]
#[command(long_about = "
soda turns a BED-like list of regions of interest into a gallery of genome
browser snapshots: one PDF, PNG and thumbnail per region, optionally marked
with the region midpoint or the original interval.

Examples:
  soda gallery -r regions.bed -s 123_abc -b hg38 -o my-gallery
  soda gallery -r regions.bed -s 123_abc -b hg38 -o my-gallery -a 5000 -i
  soda annotate -r regions.bed -a 5000
  soda bbox snapshot.pdf
  soda config --example > soda.toml
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render every region and assemble the gallery output directory
    Gallery(GalleryArgs),

    /// Print the annotated regions table (ids and padded coordinates)
    Annotate {
        /// Regions file: chrom, start, stop[, label], tab-separated
        #[arg(short, long)]
        regions: PathBuf,

        /// Symmetric padding around each region midpoint
        #[arg(short = 'a', long = "range", allow_hyphen_values = true)]
        range_padding: Option<GenomicPos>,

        /// Write the table here instead of standard output
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Report the first rectangle of a snapshot PDF and its label column width
    Bbox {
        /// Snapshot PDF
        pdf: PathBuf,
    },

    /// Show or write configuration
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        example: bool,

        /// Write the default configuration to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Options of a gallery run. Unset values fall back to the configuration file.
#[derive(Args, Debug, Clone, Default)]
pub struct GalleryArgs {
    /// Regions file: chrom, start, stop[, label], tab-separated
    #[arg(short, long)]
    pub regions: Option<PathBuf>,

    /// Genome browser session ID
    #[arg(short = 's', long)]
    pub session_id: Option<String>,

    /// Genome build ID (hg19, hg38, mm10, ...)
    #[arg(short = 'b', long)]
    pub build_id: Option<String>,

    /// Output gallery directory; must not exist
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Gallery title
    #[arg(short, long)]
    pub title: Option<String>,

    /// Genome browser base URL
    #[arg(short = 'g', long)]
    pub browser_url: Option<String>,

    /// Basic authentication username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Basic authentication password
    #[arg(short, long)]
    pub password: Option<String>,

    /// Authenticate with a negotiate token from SODA_NEGOTIATE_TOKEN
    #[arg(short = 'y', long)]
    pub negotiate: bool,

    /// Mark the midpoint of each region
    #[arg(short = 'd', long)]
    pub midpoint: bool,

    /// Highlight the original interval of each region (needs --range)
    #[arg(short = 'i', long)]
    pub interval: bool,

    /// Overlay colour, e.g. 'rgba(255, 0, 0, 0.333)'
    #[arg(short = 'w', long)]
    pub rgba: Option<String>,

    /// Overlay font size
    #[arg(short = 'z', long)]
    pub font_size: Option<f64>,

    /// Overlay font family
    #[arg(short = 'f', long)]
    pub font_family: Option<String>,

    /// Overlay resolution (dpi)
    #[arg(short = 'e', long)]
    pub annotation_resolution: Option<u32>,

    /// Output PNG resolution (dpi)
    #[arg(short = 'j', long)]
    pub png_resolution: Option<u32>,

    /// Thumbnail width (pixels)
    #[arg(long)]
    pub thumbnail_width: Option<u32>,

    /// Thumbnail height (pixels)
    #[arg(long)]
    pub thumbnail_height: Option<u32>,

    /// Symmetric padding around each region midpoint
    #[arg(short = 'a', long = "range", allow_hyphen_values = true)]
    pub range_padding: Option<GenomicPos>,

    /// ImageMagick convert binary
    #[arg(short = 'k', long)]
    pub convert: Option<PathBuf>,

    /// ImageMagick identify binary
    #[arg(short = 'n', long)]
    pub identify: Option<PathBuf>,

    /// Regions processed concurrently
    #[arg(long)]
    pub jobs: Option<usize>,
}

fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    if std::env::var_os("RUST_LOG").is_none() || verbose > 0 || quiet {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var("RUST_LOG", level);
    }

    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Gallery(args) => {
            commands::gallery::execute(&config, args)?;
        }

        Commands::Annotate {
            regions,
            range_padding,
            output,
        } => {
            commands::annotate::execute(&config, regions, range_padding, output)?;
        }

        Commands::Bbox { pdf } => {
            commands::bbox::execute(pdf)?;
        }

        Commands::Config { example, output } => {
            commands::config::execute(&config, example, output)?;
        }
    }

    Ok(())
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = setup_logging(cli.verbose, cli.quiet) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = run(cli) {
        error::print_error_and_exit(&error::CliError::from_anyhow(&err));
    }
}
