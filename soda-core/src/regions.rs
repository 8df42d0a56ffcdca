//! Regions-of-interest parser and id annotator
//!
//! Input is BED-like: `chrom<TAB>start<TAB>stop[<TAB>label...]`. Every line read
//! consumes one index slot, so ids stay stable when an earlier line is skipped.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

use crate::types::{AnnotatedRegion, GenomicPos, Region};

/// Width of the zero-padded index in region ids.
pub const ID_INDEX_WIDTH: usize = 6;
pub const ID_PREFIX: &str = "plot";

#[derive(Debug, Error)]
pub enum RegionError {
    #[error("Invalid region on line {line}: expected at least 3 tab-separated fields, got {found}")]
    MissingField { line: usize, found: usize },
    #[error("Invalid coordinate on line {line}: '{value}'")]
    InvalidCoordinate { line: usize, value: String },
    #[error("Invalid region on line {line}: stop {stop} precedes start {start}")]
    InvertedInterval {
        line: usize,
        start: GenomicPos,
        stop: GenomicPos,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of reading one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Region(Region),
    Blank,
    ZeroLength,
}

/// Parse one raw line. `line_number` is 1-based and only used for errors.
pub fn parse_region_line(line: &str, line_number: usize) -> Result<LineOutcome, RegionError> {
    let fields: Vec<&str> = line.trim_end().split('\t').collect();

    if fields.len() == 1 {
        return Ok(LineOutcome::Blank);
    }
    if fields.len() < 3 {
        return Err(RegionError::MissingField {
            line: line_number,
            found: fields.len(),
        });
    }

    let start = parse_coordinate(fields[1], line_number)?;
    let stop = parse_coordinate(fields[2], line_number)?;

    if start == stop {
        return Ok(LineOutcome::ZeroLength);
    }
    if stop < start {
        return Err(RegionError::InvertedInterval {
            line: line_number,
            start,
            stop,
        });
    }

    let mut region = Region::new(fields[0], start, stop);
    if let Some(label) = fields.get(3) {
        region = region.with_label(*label);
    }
    Ok(LineOutcome::Region(region))
}

fn parse_coordinate(value: &str, line: usize) -> Result<GenomicPos, RegionError> {
    value
        .trim()
        .parse::<GenomicPos>()
        .ok()
        .filter(|pos| *pos >= 0)
        .ok_or_else(|| RegionError::InvalidCoordinate {
            line,
            value: value.to_string(),
        })
}

/// Make a label safe for ids and file names.
///
/// Non-ASCII characters are dropped; separators and control characters
/// become `-`.
pub fn sanitize_label(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii)
        .map(|c| match c {
            ' ' | ':' | '_' | '/' | '\\' => '-',
            c if c.is_ascii_control() => '-',
            c => c,
        })
        .collect()
}

/// Chromosome names keep `_` but lose path separators, whitespace and
/// control characters so the id stays a single file name.
fn sanitize_chrom(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii)
        .map(|c| match c {
            '/' | '\\' => '-',
            c if c.is_ascii_whitespace() || c.is_ascii_control() => '-',
            c => c,
        })
        .collect()
}

/// `plot_<index:06>_<chrom>_<start>_<stop>[_<label>]`
pub fn format_region_id(
    index: usize,
    chrom: &str,
    start: GenomicPos,
    stop: GenomicPos,
    label: Option<&str>,
) -> String {
    let mut id = format!(
        "{}_{:0width$}_{}_{}_{}",
        ID_PREFIX,
        index,
        sanitize_chrom(chrom),
        start,
        stop,
        width = ID_INDEX_WIDTH
    );
    if let Some(label) = label.filter(|l| !l.is_empty()) {
        id.push('_');
        id.push_str(label);
    }
    id
}

/// Assigns ids and applies symmetric, midpoint-anchored padding.
#[derive(Debug, Clone, Default)]
pub struct RegionAnnotator {
    padding: Option<GenomicPos>,
}

impl RegionAnnotator {
    /// A padding of zero means no padding.
    pub fn new(padding: Option<GenomicPos>) -> Self {
        Self {
            padding: padding.filter(|p| *p != 0),
        }
    }

    pub fn padding(&self) -> Option<GenomicPos> {
        self.padding
    }

    /// Display interval for `region`: `mid ± padding`, start clamped at zero.
    pub fn display_interval(&self, region: &Region) -> (GenomicPos, GenomicPos) {
        match self.padding {
            Some(padding) => {
                let mid = region.midpoint();
                let start = (mid - padding).max(0);
                let stop = mid + padding;
                if stop < start {
                    log::warn!(
                        "Padding {} inverts region {}:{}-{}",
                        padding,
                        region.chrom,
                        region.start,
                        region.stop
                    );
                }
                (start, stop)
            }
            None => (region.start, region.stop),
        }
    }

    pub fn annotate(&self, index: usize, region: &Region) -> AnnotatedRegion {
        let (display_start, display_stop) = self.display_interval(region);
        let label = region
            .label
            .as_deref()
            .map(sanitize_label)
            .filter(|l| !l.is_empty());
        let id = format_region_id(
            index,
            &region.chrom,
            display_start,
            display_stop,
            label.as_deref(),
        );

        AnnotatedRegion {
            id,
            index,
            chrom: region.chrom.clone(),
            display_start,
            display_stop,
            original_start: region.start,
            original_stop: region.stop,
            label,
        }
    }

    /// Annotate every line of `reader`, preserving input order.
    pub fn annotate_reader<R: BufRead>(&self, reader: R) -> Result<Vec<AnnotatedRegion>, RegionError> {
        let mut regions = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            match parse_region_line(&line, index + 1)? {
                LineOutcome::Region(region) => regions.push(self.annotate(index, &region)),
                LineOutcome::Blank => {
                    log::warn!("Possible blank line in input regions file (line {})", index + 1);
                }
                LineOutcome::ZeroLength => {
                    log::warn!("Possible zero-length region in input regions file (line {})", index + 1);
                }
            }
        }

        log::debug!("Annotated {} regions", regions.len());
        Ok(regions)
    }

    pub fn annotate_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<AnnotatedRegion>, RegionError> {
        let file = File::open(path)?;
        self.annotate_reader(BufReader::new(file))
    }
}

/// Write the annotated regions table, one row per region.
pub fn write_annotated_table<W: Write>(
    regions: &[AnnotatedRegion],
    mut writer: W,
) -> Result<(), RegionError> {
    for region in regions {
        writeln!(writer, "{}", region.to_table_row())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn annotate(input: &str, padding: Option<GenomicPos>) -> Vec<AnnotatedRegion> {
        RegionAnnotator::new(padding)
            .annotate_reader(Cursor::new(input))
            .unwrap()
    }

    #[test]
    fn test_padded_id_with_label() {
        let regions = annotate("chr1\t100\t200\tfoo bar\n", Some(50));
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.id, "plot_000000_chr1_100_200_foo-bar");
        assert_eq!((region.display_start, region.display_stop), (100, 200));
        assert_eq!((region.original_start, region.original_stop), (100, 200));
        assert_eq!(region.label.as_deref(), Some("foo-bar"));
    }

    #[test]
    fn test_padding_is_midpoint_anchored() {
        let regions = annotate("chr2\t1000\t1100\n", Some(500));
        let region = &regions[0];
        assert_eq!((region.display_start, region.display_stop), (550, 1550));
        assert_eq!((region.original_start, region.original_stop), (1000, 1100));
        assert_eq!(region.id, "plot_000000_chr2_550_1550");
    }

    #[test]
    fn test_padding_clamps_start_at_zero() {
        let regions = annotate("chrM\t10\t20\n", Some(100));
        assert_eq!(regions[0].display_start, 0);
        assert_eq!(regions[0].display_stop, 115);
    }

    #[test]
    fn test_negative_padding_shrinks() {
        let regions = annotate("chr1\t0\t1000\n", Some(-100));
        assert_eq!((regions[0].display_start, regions[0].display_stop), (600, 400));
    }

    #[test]
    fn test_zero_padding_means_unpadded() {
        let regions = annotate("chr1\t100\t200\n", Some(0));
        assert_eq!((regions[0].display_start, regions[0].display_stop), (100, 200));
    }

    #[test]
    fn test_skipped_lines_consume_index() {
        let input = "chr1\t100\t100\n\nchr1\t5\t10\tx\n";
        let regions = annotate(input, None);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].index, 2);
        assert_eq!(regions[0].id, "plot_000002_chr1_5_10_x");
    }

    #[test]
    fn test_two_fields_is_fatal() {
        let err = RegionAnnotator::new(None)
            .annotate_reader(Cursor::new("chr1\t100\n"))
            .unwrap_err();
        assert!(matches!(err, RegionError::MissingField { line: 1, found: 2 }));
    }

    #[test]
    fn test_bad_coordinate_is_fatal() {
        let err = parse_region_line("chr1\tabc\t200", 4).unwrap_err();
        assert!(matches!(err, RegionError::InvalidCoordinate { line: 4, .. }));
        let err = parse_region_line("chr1\t-5\t200", 1).unwrap_err();
        assert!(matches!(err, RegionError::InvalidCoordinate { .. }));
    }

    #[test]
    fn test_inverted_interval_is_fatal() {
        let err = parse_region_line("chr1\t300\t200", 1).unwrap_err();
        assert!(matches!(err, RegionError::InvertedInterval { start: 300, stop: 200, .. }));
    }

    #[test]
    fn test_trailing_whitespace_is_ignored() {
        assert_eq!(
            parse_region_line("chr1\t1\t2\t\r\n", 1).unwrap(),
            LineOutcome::Region(Region::new("chr1", 1, 2))
        );
        assert_eq!(parse_region_line("   ", 1).unwrap(), LineOutcome::Blank);
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("foo bar:baz_qux"), "foo-bar-baz-qux");
        assert_eq!(sanitize_label("caf\u{e9} au lait"), "caf-au-lait");
        assert_eq!(sanitize_label("a/b\\c"), "a-b-c");
        assert_eq!(sanitize_label("\u{3b1}\u{3b2}"), "");
    }

    #[test]
    fn test_chrom_cannot_escape_output_dir() {
        assert_eq!(
            format_region_id(3, "../../etc/x", 1, 2, None),
            "plot_000003_..-..-etc-x_1_2"
        );
        assert_eq!(format_region_id(0, "chrUn_gl000220", 5, 9, None), "plot_000000_chrUn_gl000220_5_9");
        assert_eq!(format_region_id(1, "chr1\\x y", 5, 9, Some("a")), "plot_000001_chr1-x-y_5_9_a");

        let regions = annotate("a/b\t1\t2\n", None);
        assert_eq!(regions[0].id, "plot_000000_a-b_1_2");
        assert_eq!(regions[0].chrom, "a/b");
    }

    #[test]
    fn test_empty_label_adds_no_suffix() {
        let regions = annotate("chr1\t1\t2\t\u{3b1}\textra\n", None);
        assert_eq!(regions[0].id, "plot_000000_chr1_1_2");
        assert_eq!(regions[0].label, None);
    }

    #[test]
    fn test_only_fourth_field_is_used() {
        let regions = annotate("chr1\t1\t2\tname\tscore\t+\n", None);
        assert_eq!(regions[0].id, "plot_000000_chr1_1_2_name");
    }

    #[test]
    fn test_annotated_table() {
        let regions = annotate("chr1\t100\t200\tfoo\n", Some(10));
        let mut out = Vec::new();
        write_annotated_table(&regions, &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "chr1\t140\t160\tplot_000000_chr1_140_160_foo\t100\t200\n"
        );
    }
}
