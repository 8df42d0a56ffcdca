use proptest::prelude::*;
use soda_core::*;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use tempfile::NamedTempFile;

#[test]
fn test_annotate_file_end_to_end() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "chr1\t100\t200\tfoo bar").unwrap();
    writeln!(file, "chr1\t100\t100").unwrap();
    writeln!(file, "chrX\t5000\t6000").unwrap();
    file.flush().unwrap();

    let regions = RegionAnnotator::new(Some(50)).annotate_file(file.path()).unwrap();

    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0].id, "plot_000000_chr1_100_200_foo-bar");
    assert_eq!(regions[1].id, "plot_000002_chrX_5450_5550");
    assert_eq!((regions[1].original_start, regions[1].original_stop), (5000, 6000));

    let mut table = Vec::new();
    write_annotated_table(&regions, &mut table).unwrap();
    let table = String::from_utf8(table).unwrap();
    assert_eq!(table.lines().count(), 2);
    assert!(table.starts_with("chr1\t100\t200\tplot_000000_chr1_100_200_foo-bar\t100\t200\n"));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = RegionAnnotator::new(None)
        .annotate_file("/nonexistent/regions.bed")
        .unwrap_err();
    assert!(matches!(err, RegionError::Io(_)));
}

fn region_line() -> impl Strategy<Value = (String, i64, i64)> {
    (
        prop::sample::select(vec!["chr1", "chr2", "chrX", "chrM"]),
        0i64..10_000_000,
        1i64..100_000,
    )
        .prop_map(|(chrom, start, len)| (chrom.to_string(), start, start + len))
}

proptest! {
    #[test]
    fn prop_padding_is_midpoint_anchored(
        (chrom, start, stop) in region_line(),
        padding in 1i64..1_000_000,
    ) {
        let input = format!("{}\t{}\t{}\n", chrom, start, stop);
        let regions = RegionAnnotator::new(Some(padding))
            .annotate_reader(Cursor::new(input))
            .unwrap();
        let region = &regions[0];
        let mid = start + (stop - start) / 2;

        prop_assert_eq!(region.display_stop, mid + padding);
        if mid >= padding {
            prop_assert_eq!(region.display_stop - region.display_start, 2 * padding);
            prop_assert_eq!(region.display_midpoint(), mid);
        } else {
            prop_assert_eq!(region.display_start, 0);
        }
        prop_assert_eq!((region.original_start, region.original_stop), (start, stop));
    }

    #[test]
    fn prop_ids_are_unique_and_deterministic(
        lines in prop::collection::vec(region_line(), 1..40),
        padding in prop::option::of(1i64..5_000),
    ) {
        let input: String = lines
            .iter()
            .map(|(chrom, start, stop)| format!("{}\t{}\t{}\tlabel {}\n", chrom, start, stop, start))
            .collect();
        let annotator = RegionAnnotator::new(padding);
        let first = annotator.annotate_reader(Cursor::new(input.clone())).unwrap();
        let second = annotator.annotate_reader(Cursor::new(input)).unwrap();

        prop_assert_eq!(&first, &second);
        let ids: HashSet<_> = first.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(ids.len(), first.len());
        for region in &first {
            prop_assert!(region.id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'));
        }
    }
}
