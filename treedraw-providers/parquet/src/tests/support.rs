use std::path::PathBuf;

use tempfile::TempDir;
use treedraw_test_support::fixtures::{ColumnValues, TreeFileFixture, TreeFixture};

/// Scratch directory holding one fixture file named `input.parquet`.
pub(crate) struct FixtureFile {
    pub(crate) dir: TempDir,
    pub(crate) path: PathBuf,
}

pub(crate) fn write_fixture(file: TreeFileFixture) -> FixtureFile {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("input.parquet");
    file.write(&path).expect("fixture writes");
    FixtureFile { dir, path }
}

/// Two trees plus a plain column; `events` has a null row and a null value.
pub(crate) fn events_and_runs() -> TreeFileFixture {
    TreeFileFixture::new()
        .with_tree(
            TreeFixture::new("events")
                .with_f64("px", [Some(1.0), Some(2.0), Some(3.0), None])
                .with_i64("n", [Some(4), Some(5), Some(6), Some(7)])
                .with_bool("ok", [Some(true), Some(false), Some(true), Some(true)])
                .with_branch(
                    "label",
                    ColumnValues::Utf8(vec![Some("a".to_owned()); 4]),
                )
                .with_null_rows([1]),
        )
        .with_tree(TreeFixture::new("runs").with_f64("lumi", [Some(0.5); 4]))
        .with_plain_column("id", ColumnValues::Int32(vec![Some(1), Some(2), Some(3), Some(4)]))
}
