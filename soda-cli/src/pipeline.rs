//! Gallery run orchestration.
//!
//! Output is staged in a hidden sibling of the target directory and only
//! renamed into place once every region has been rendered. Any fatal error
//! drops the staging directory, so a failed run leaves nothing behind.

use anyhow::{Context, Result};
use rayon::prelude::*;
use soda_core::gallery::{image_url, thumbnail_url, IMAGE_DIR, MANIFEST_FILE_NAME, PDF_DIR, THUMBNAIL_DIR};
use soda_core::{
    write_annotated_table, AnnotatedRegion, BrowserService, GalleryEntry, GalleryManifest, HttpBrowser,
    RegionAnnotator, SnapshotAcquirer,
};
use soda_render::{Compositor, ImageMagick};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::RunSettings;
use crate::error::CliError;

pub const STAGING_PREFIX: &str = ".soda-";
pub const REGIONS_DIR: &str = "regions";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub entries: usize,
}

/// Working tree of a run, removed on drop unless committed.
pub struct Staging {
    dir: TempDir,
    output_dir: PathBuf,
}

impl Staging {
    pub fn create(output_dir: &Path) -> Result<Self> {
        if output_dir.exists() {
            return Err(CliError::validation(format!(
                "Path {} exists -- remove or rename before re-running",
                output_dir.display()
            ))
            .into());
        }

        let parent = match output_dir.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .with_context(|| format!("Failed to create a staging directory in {}", parent.display()))?;
        for sub in [REGIONS_DIR, PDF_DIR, IMAGE_DIR, THUMBNAIL_DIR] {
            fs::create_dir_all(dir.path().join(sub))?;
        }
        log::debug!("Staging gallery in {}", dir.path().display());

        Ok(Self {
            dir,
            output_dir: output_dir.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Move the staged tree to the output directory.
    pub fn commit(self) -> Result<PathBuf> {
        if self.output_dir.exists() {
            return Err(CliError::validation(format!(
                "Path {} appeared during the run -- remove or rename before re-running",
                self.output_dir.display()
            ))
            .into());
        }
        fs::rename(self.path(), &self.output_dir).with_context(|| {
            format!(
                "Failed to move {} to {}",
                self.path().display(),
                self.output_dir.display()
            )
        })?;
        // The staged path is gone; dropping the guard removes nothing.
        Ok(self.output_dir)
    }
}

/// Render a gallery against the configured genome browser.
pub fn run(settings: &RunSettings) -> Result<RunSummary> {
    // Tools first: a missing ImageMagick must fail before any network traffic.
    let tools = ImageMagick::discover(settings.convert.as_deref(), settings.identify.as_deref())
        .context("ImageMagick is required to rasterize snapshots")?;
    let browser = HttpBrowser::new(
        settings.target.clone(),
        settings.credentials.clone(),
        settings.retry.clone(),
    )
    .context("Failed to set up the browser client")?;

    run_with(settings, &browser, &tools)
}

pub fn run_with(settings: &RunSettings, browser: &dyn BrowserService, tools: &ImageMagick) -> Result<RunSummary> {
    let staging = Staging::create(&settings.output_dir)?;
    let regions = stage_regions(settings, &staging)?;
    if regions.is_empty() {
        log::warn!("No regions to render in {}", settings.regions.display());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(settings.jobs)
        .build()
        .context("Failed to start the worker pool")?;
    log::debug!("Rendering {} regions on {} workers", regions.len(), settings.jobs);

    let pdf_dir = staging.join(PDF_DIR);
    let acquirer = SnapshotAcquirer::new(browser, settings.limits);
    let compositor = Compositor::new(
        tools,
        settings.mode,
        settings.style.clone(),
        settings.annotation_resolution,
        settings.padding,
    );

    pool.install(|| {
        regions
            .par_iter()
            .try_for_each(|region| render_snapshot(&acquirer, &compositor, region, &pdf_dir))
    })?;

    let entries = pool.install(|| {
        regions
            .par_iter()
            .map(|region| rasterize(tools, settings, &staging, region))
            .collect::<Result<Vec<_>>>()
    })?;

    let manifest = GalleryManifest {
        title: settings.title.clone(),
        timestamp: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
        build: settings.target.build_id.clone(),
        entries,
    };
    let manifest_path = staging.join(MANIFEST_FILE_NAME);
    manifest
        .write_to(&manifest_path)
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;

    let output_dir = staging.commit()?;
    Ok(RunSummary {
        output_dir,
        entries: manifest.entries.len(),
    })
}

/// Copy the regions file into the gallery and write its annotated table.
fn stage_regions(settings: &RunSettings, staging: &Staging) -> Result<Vec<AnnotatedRegion>> {
    let file_name = settings.regions.file_name().ok_or_else(|| {
        CliError::validation(format!("{} is not a file", settings.regions.display()))
    })?;
    let regions_dir = staging.join(REGIONS_DIR);
    let copy = regions_dir.join(file_name);
    fs::copy(&settings.regions, &copy)
        .with_context(|| format!("Failed to copy {}", settings.regions.display()))?;

    let regions = RegionAnnotator::new(settings.padding)
        .annotate_file(&copy)
        .with_context(|| format!("Failed to annotate regions in {}", settings.regions.display()))?;

    let mut table_name = file_name.to_os_string();
    table_name.push(".annotated");
    let table = regions_dir.join(table_name);
    let writer = BufWriter::new(
        File::create(&table).with_context(|| format!("Failed to create {}", table.display()))?,
    );
    write_annotated_table(&regions, writer)?;

    log::info!("Annotated {} regions", regions.len());
    Ok(regions)
}

fn render_snapshot(
    acquirer: &SnapshotAcquirer<'_>,
    compositor: &Compositor<'_>,
    region: &AnnotatedRegion,
    pdf_dir: &Path,
) -> Result<()> {
    let snapshot = acquirer
        .acquire(region, pdf_dir)
        .with_context(|| format!("Failed to acquire snapshot for {}", region.id))?;
    compositor
        .annotate(&snapshot.pdf_path, region)
        .with_context(|| format!("Failed to annotate {} ({})", region.id, snapshot.pdf_path.display()))?;
    Ok(())
}

fn rasterize(
    tools: &ImageMagick,
    settings: &RunSettings,
    staging: &Staging,
    region: &AnnotatedRegion,
) -> Result<GalleryEntry> {
    let pdf = staging.join(PDF_DIR).join(format!("{}.pdf", region.id));
    let png = staging.join(image_url(&region.id));
    let thumbnail = staging.join(thumbnail_url(&region.id));
    let (width, height) = settings.thumbnail_size;

    tools
        .rasterize(&pdf, &png, settings.png_resolution)
        .with_context(|| format!("Failed to rasterize {}", pdf.display()))?;
    tools
        .thumbnail(&png, &thumbnail, width, height)
        .with_context(|| format!("Failed to make a thumbnail of {}", png.display()))?;
    let size = tools
        .identify_dimensions(&png)
        .with_context(|| format!("Failed to measure {}", png.display()))?;
    log::debug!("{}: {}x{} image", region.id, size.width, size.height);

    Ok(GalleryEntry::new(region, &settings.target, (size.width, size.height)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use soda_core::{BrowserError, BrowserTarget, LinkLimits, RetryPolicy};
    use soda_render::{AnnotationMode, OverlayStyle};
    use std::io::Write;
    use std::sync::Mutex;

    const ONE_LINK: &str = r#"<html><a href="../trash/hgt/hgt_genome_1a2b.pdf">PDF</a></html>"#;

    struct FakeBrowser {
        target: BrowserTarget,
        page: String,
        downloads: Mutex<Vec<String>>,
    }

    impl FakeBrowser {
        fn new(page: &str) -> Self {
            Self {
                target: BrowserTarget::new("https://genome.example.org", "1_x", "hg38"),
                page: page.to_string(),
                downloads: Mutex::new(Vec::new()),
            }
        }
    }

    impl BrowserService for FakeBrowser {
        fn target(&self) -> &BrowserTarget {
            &self.target
        }

        fn submit_position(&self, _region: &AnnotatedRegion) -> Result<String, BrowserError> {
            Ok("textSize 8\nhgt.labelWidth 17\n".to_string())
        }

        fn fetch_render_page(&self, _region: &AnnotatedRegion) -> Result<String, BrowserError> {
            Ok(self.page.clone())
        }

        fn download(&self, url: &str, sink: &mut dyn Write) -> Result<u64, BrowserError> {
            self.downloads.lock().unwrap().push(url.to_string());
            sink.write_all(b"%PDF-1.4\n")?;
            Ok(9)
        }
    }

    fn settings(dir: &Path, regions: &str) -> RunSettings {
        let regions_path = dir.join("regions.bed");
        fs::write(&regions_path, regions).unwrap();
        RunSettings {
            regions: regions_path,
            output_dir: dir.join("out").join("gallery"),
            title: "Test Gallery".to_string(),
            target: BrowserTarget::new("https://genome.example.org", "1_x", "hg38"),
            credentials: None,
            retry: RetryPolicy::none(),
            limits: LinkLimits {
                link_attempts: 2,
                poll_attempts: 1,
            },
            padding: None,
            mode: AnnotationMode::None,
            style: OverlayStyle::default(),
            annotation_resolution: 150,
            png_resolution: 150,
            thumbnail_size: (480, 480),
            convert: None,
            identify: None,
            jobs: 2,
        }
    }

    #[cfg(unix)]
    fn stub_tools(dir: &Path) -> ImageMagick {
        use std::os::unix::fs::PermissionsExt;

        let convert = dir.join("convert");
        let identify = dir.join("identify");
        // convert: create the last argument; identify: fixed size.
        fs::write(&convert, "#!/bin/sh\nfor last; do :; done\n: > \"$last\"\n").unwrap();
        fs::write(&identify, "#!/bin/sh\nprintf '1200 800\\n'\n").unwrap();
        for path in [&convert, &identify] {
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        ImageMagick::new(convert, identify)
    }

    fn staging_leftovers(parent: &Path) -> usize {
        fs::read_dir(parent)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with(STAGING_PREFIX))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_existing_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = Staging::create(dir.path()).err().unwrap();
        assert!(err.to_string().contains("remove or rename"));
    }

    #[test]
    fn test_uncommitted_staging_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gallery");
        let staged = {
            let staging = Staging::create(&output).unwrap();
            assert!(staging.join(THUMBNAIL_DIR).is_dir());
            staging.path().to_path_buf()
        };
        assert!(!staged.exists());
        assert!(!output.exists());
    }

    #[test]
    fn test_commit_moves_tree_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("gallery");
        let staging = Staging::create(&output).unwrap();
        fs::write(staging.join(MANIFEST_FILE_NAME), "{}").unwrap();

        let committed = staging.commit().unwrap();
        assert_eq!(committed, output);
        assert!(output.join(MANIFEST_FILE_NAME).is_file());
        assert!(output.join(PDF_DIR).is_dir());
        assert_eq!(staging_leftovers(dir.path()), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_run_builds_gallery() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "chr1\t100\t200\tfoo bar\nchr2\t10\t20\n");
        let browser = FakeBrowser::new(ONE_LINK);
        let tools = stub_tools(dir.path());

        let summary = run_with(&settings, &browser, &tools).unwrap();
        assert_eq!(summary.entries, 2);

        let out = &settings.output_dir;
        let manifest = GalleryManifest::read_from(&out.join(MANIFEST_FILE_NAME)).unwrap();
        assert_eq!(manifest.title, "Test Gallery");
        assert_eq!(manifest.build, "hg38");
        assert_eq!(manifest.timestamp.len(), "2024-01-01T00:00:00".len());
        // Input order is preserved regardless of worker scheduling.
        assert_eq!(manifest.entries[0].pdf_url, "pdfs/plot_000000_chr1_100_200_foo-bar.pdf");
        assert_eq!(manifest.entries[1].pdf_url, "pdfs/plot_000001_chr2_10_20.pdf");
        assert_eq!(manifest.entries[0].image_width, 1200);

        assert!(out.join("regions/regions.bed").is_file());
        assert!(out.join("regions/regions.bed.annotated").is_file());
        assert!(out.join("pdfs/plot_000001_chr2_10_20.pdf").is_file());
        assert!(out.join("images/plot_000001_chr2_10_20.png").is_file());
        assert!(out.join("images/thumbnails/plot_000001_chr2_10_20-thumbnail.png").is_file());
        assert!(!out.join("pdfs/plot_000001_chr2_10_20.cartDump").exists());

        let downloads = browser.downloads.lock().unwrap();
        assert_eq!(downloads.len(), 2);
        assert!(downloads
            .iter()
            .all(|url| url == "https://genome.example.org/trash/hgt/hgt_genome_1a2b.pdf"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_region_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), "chr1\t100\t200\n");
        let browser = FakeBrowser::new("<html>no document</html>");
        let tools = stub_tools(dir.path());

        let err = run_with(&settings, &browser, &tools).unwrap_err();
        assert!(format!("{:#}", err).contains("plot_000000_chr1_100_200"));
        assert!(!settings.output_dir.exists());
        assert_eq!(staging_leftovers(&dir.path().join("out")), 0);
    }
}
