use std::path::Path;

use rstest::rstest;
use treedraw_core::{TreeInfo, TreeOpener, TreeSource};
use treedraw_test_support::fixtures::{TreeFileFixture, TreeFixture};

use super::{ParquetOpener, ParquetTreeError, ParquetTreeFile, support::*};

fn branches(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn collect(file: &mut ParquetTreeFile, tree: &str, names: &[&str]) -> Vec<Vec<Option<f64>>> {
    let mut rows = Vec::new();
    let count = file
        .scan(tree, &branches(names), &mut |record| rows.push(record.to_vec()))
        .expect("scan succeeds");
    assert_eq!(count, rows.len() as u64);
    rows
}

#[rstest]
fn discovers_struct_columns_as_trees() {
    let fixture = write_fixture(events_and_runs());
    let file = ParquetTreeFile::open(&fixture.path).expect("file opens");
    assert_eq!(
        file.trees(),
        [
            TreeInfo::new("events", ["px", "n", "ok"]),
            TreeInfo::new("runs", ["lumi"]),
        ]
    );
    assert_eq!(file.label(), fixture.path.display().to_string());
}

#[rstest]
fn scan_widens_values_and_skips_null_rows() {
    let fixture = write_fixture(events_and_runs());
    let mut file = ParquetTreeFile::open(&fixture.path).expect("file opens");
    let rows = collect(&mut file, "events", &["ok", "px", "n"]);
    assert_eq!(
        rows,
        [
            vec![Some(1.0), Some(1.0), Some(4.0)],
            vec![Some(1.0), Some(3.0), Some(6.0)],
            vec![Some(1.0), None, Some(7.0)],
        ]
    );
}

#[rstest]
fn scan_spans_record_batches() {
    let values: Vec<Option<f64>> = (0..25).map(|i| Some(f64::from(i))).collect();
    let fixture = write_fixture(
        TreeFileFixture::new()
            .with_tree(TreeFixture::new("t").with_f64("x", values))
            .with_row_group_size(10),
    );
    let mut file = ParquetOpener::new()
        .with_batch_size(4)
        .open(&fixture.path)
        .expect("file opens");
    let rows = collect(&mut file, "t", &["x"]);
    assert_eq!(rows.len(), 25);
    assert_eq!(rows[24], [Some(24.0)]);
}

#[rstest]
fn scan_can_be_repeated() {
    let fixture = write_fixture(events_and_runs());
    let mut file = ParquetTreeFile::open(&fixture.path).expect("file opens");
    let first = collect(&mut file, "runs", &["lumi"]);
    let second = collect(&mut file, "runs", &["lumi"]);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}

#[rstest]
#[case("missing", &["px"])]
#[case("id", &[])]
#[case("events", &["pz"])]
#[case("events", &["label"])]
fn scan_rejects_unusable_requests(#[case] tree: &str, #[case] names: &[&str]) {
    let fixture = write_fixture(events_and_runs());
    let mut file = ParquetTreeFile::open(&fixture.path).expect("file opens");
    let err = file
        .scan(tree, &branches(names), &mut |_| {})
        .expect_err("request must be rejected");
    assert!(matches!(
        err,
        ParquetTreeError::TreeNotFound { .. }
            | ParquetTreeError::NotATree { .. }
            | ParquetTreeError::BranchNotFound { .. }
            | ParquetTreeError::UnsupportedBranchType { .. }
    ));
}

#[rstest]
fn opening_a_missing_file_is_an_io_error() {
    let err = ParquetOpener::new()
        .open(Path::new("/definitely/not/here.parquet"))
        .expect_err("file is missing");
    assert!(matches!(err, ParquetTreeError::Io(_)));
}

#[rstest]
fn opening_a_non_parquet_file_is_a_parquet_error() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, "not parquet").expect("write");
    let err = ParquetTreeFile::open(&path).expect_err("file is not parquet");
    assert!(matches!(err, ParquetTreeError::Parquet(_)));
}
