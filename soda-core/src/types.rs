use serde::{Deserialize, Serialize};
use std::fmt;

/// Genomic coordinate. Signed so that padding arithmetic can go below zero
/// before it is clamped.
pub type GenomicPos = i64;

/// One validated record of the input regions file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub chrom: String,
    pub start: GenomicPos,
    pub stop: GenomicPos,
    pub label: Option<String>,
}

impl Region {
    pub fn new(chrom: impl Into<String>, start: GenomicPos, stop: GenomicPos) -> Self {
        Self {
            chrom: chrom.into(),
            start,
            stop,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Integer midpoint, rounded toward `start`.
    pub fn midpoint(&self) -> GenomicPos {
        self.start + (self.stop - self.start) / 2
    }
}

/// A region after id assignment and optional padding.
///
/// `display_*` are the coordinates sent to the browser; `original_*` keep the
/// pre-padding interval for interval annotation. The `id` is the join key for
/// every artifact derived from this region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatedRegion {
    pub id: String,
    pub index: usize,
    pub chrom: String,
    pub display_start: GenomicPos,
    pub display_stop: GenomicPos,
    pub original_start: GenomicPos,
    pub original_stop: GenomicPos,
    /// Sanitized label fragment, as embedded in `id`.
    pub label: Option<String>,
}

impl AnnotatedRegion {
    /// Browser position string, `chrom:start-stop`.
    pub fn position(&self) -> String {
        format!("{}:{}-{}", self.chrom, self.display_start, self.display_stop)
    }

    /// Position with `:` and `-` percent-encoded, as the render endpoint expects.
    pub fn encoded_position(&self) -> String {
        format!(
            "{}%3A{}%2D{}",
            urlencoding::encode(&self.chrom),
            self.display_start,
            self.display_stop
        )
    }

    pub fn display_midpoint(&self) -> GenomicPos {
        self.display_start + (self.display_stop - self.display_start) / 2
    }

    pub fn original_width(&self) -> GenomicPos {
        self.original_stop - self.original_start
    }

    /// Row of the annotated regions table:
    /// `chrom, start, stop, id, original_start, original_stop`.
    pub fn to_table_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}",
            self.chrom,
            self.display_start,
            self.display_stop,
            self.id,
            self.original_start,
            self.original_stop
        )
    }
}

impl fmt::Display for AnnotatedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnnotatedRegion {
        AnnotatedRegion {
            id: "plot_000003_chr7_1000_3000".to_string(),
            index: 3,
            chrom: "chr7".to_string(),
            display_start: 1000,
            display_stop: 3000,
            original_start: 1900,
            original_stop: 2100,
            label: None,
        }
    }

    #[test]
    fn test_region_midpoint_rounds_toward_start() {
        assert_eq!(Region::new("chr1", 100, 201).midpoint(), 150);
        assert_eq!(Region::new("chr1", 100, 200).midpoint(), 150);
    }

    #[test]
    fn test_position_strings() {
        let region = sample();
        assert_eq!(region.position(), "chr7:1000-3000");
        assert_eq!(region.encoded_position(), "chr7%3A1000%2D3000");
    }

    #[test]
    fn test_table_row() {
        assert_eq!(
            sample().to_table_row(),
            "chr7\t1000\t3000\tplot_000003_chr7_1000_3000\t1900\t2100"
        );
    }
}
