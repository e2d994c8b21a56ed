use std::{fs, path::Path};

use arrow_schema::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use treedraw_core::{
    Axis, ErrorKind, Histogram, HistogramArtifact, HistogramSink, JobBuilder, run_job,
};
use treedraw_test_support::fixtures::{TreeFileFixture, TreeFixture};

use super::{ParquetArtifactWriter, ParquetOpener, ParquetTreeError, read_artifact, support::*};
use crate::TREE_METADATA_KEY;

#[fixture]
fn artifact() -> HistogramArtifact {
    let mut px = Histogram::new_1d("px", Axis::new(4, 0.0, 4.0).expect("axis"));
    for (x, w) in [(0.5, 1.0), (1.5, 2.0), (1.7, 0.5), (-1.0, 1.0), (9.0, 1.0)] {
        px.fill(x, None, w);
    }
    let mut pxpy = Histogram::new_2d(
        "pxpy",
        Axis::new(2, 0.0, 2.0).expect("axis"),
        Axis::new(3, -1.0, 2.0).expect("axis"),
    );
    for (x, y) in [(0.5, -0.5), (1.5, 1.5), (1.5, 1.5), (3.0, 0.0)] {
        pxpy.fill(x, Some(y), 1.0);
    }
    HistogramArtifact::new("events", vec![px, pxpy])
}

fn write(dir: &TempDir, name: &str, artifact: &HistogramArtifact) -> std::path::PathBuf {
    let path = dir.path().join(name);
    ParquetArtifactWriter::new()
        .write(&path, artifact)
        .expect("artifact writes");
    path
}

#[rstest]
fn artifact_reads_back_unchanged(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let path = write(&dir, "out.parquet", &artifact);
    assert_eq!(read_artifact(&path).expect("artifact reads"), artifact);
}

#[rstest]
fn artifact_has_one_row_per_cell_and_tree_metadata(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let path = write(&dir, "out.parquet", &artifact);
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(fs::File::open(&path).expect("open")).expect("reader");
    let schema = builder.schema();
    assert_eq!(
        schema.metadata().get(TREE_METADATA_KEY).map(String::as_str),
        Some("events")
    );
    assert_eq!(
        schema.field_with_name("y_bins").expect("y_bins").data_type(),
        &DataType::UInt32
    );
    let rows: usize = builder
        .build()
        .expect("batches")
        .map(|batch| batch.expect("batch").num_rows())
        .sum();
    assert_eq!(rows, (4 + 2) + (2 + 2) * (3 + 2));
}

#[rstest]
fn identical_histograms_write_identical_bytes(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let first = write(&dir, "first.parquet", &artifact);
    let second = write(&dir, "second.parquet", &artifact);
    assert_eq!(fs::read(first).expect("read"), fs::read(second).expect("read"));
}

#[rstest]
fn rewriting_replaces_the_previous_artifact(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let path = write(&dir, "out.parquet", &HistogramArtifact::new("old", Vec::new()));
    write(&dir, "out.parquet", &artifact);
    assert_eq!(read_artifact(&path).expect("artifact reads").tree(), "events");
    assert_eq!(fs::read_dir(dir.path()).expect("list").count(), 1);
}

#[rstest]
fn writing_into_a_missing_directory_fails(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let err = ParquetArtifactWriter::new()
        .write(&dir.path().join("missing/out.parquet"), &artifact)
        .expect_err("directory is missing");
    assert!(matches!(err, ParquetTreeError::Io(_)));
}

#[rstest]
fn reading_a_tree_file_as_an_artifact_fails() {
    let fixture = write_fixture(events_and_runs());
    let err = read_artifact(&fixture.path).expect_err("not an artifact");
    assert!(matches!(err, ParquetTreeError::InvalidArtifact { .. }));
}

#[rstest]
fn job_fills_and_stores_histograms_from_parquet() {
    let fixture = write_fixture(events_and_runs());
    let output = fixture.dir.path().join("histos.parquet");
    let job = JobBuilder::new()
        .with_output(&output)
        .with_input(&fixture.path)
        .with_tree("events")
        .with_histogram("px(4,0,4)=px")
        .with_histogram("pxn(4,0,4,4,3,7)=px:n")
        .with_histogram("weighted(4,0,4)=px if n")
        .build()
        .expect("job builds");

    let summary = run_job(job, &ParquetOpener::new(), &ParquetArtifactWriter::new())
        .expect("job runs");
    assert_eq!(summary.records, 3);

    let stored = read_artifact(&output).expect("artifact reads");
    assert_eq!(stored.tree(), "events");
    let px = stored.histogram("px").expect("px stored");
    assert_eq!(px.entries(), 2);
    assert_eq!(px.content(2, 0), 1.0);
    assert_eq!(px.content(4, 0), 1.0);
    let pxn = stored.histogram("pxn").expect("pxn stored");
    assert_eq!(pxn.dimension(), 2);
    assert_eq!(pxn.content(2, 2), 1.0);
    assert_eq!(pxn.content(4, 4), 1.0);
    let weighted = stored.histogram("weighted").expect("weighted stored");
    assert_eq!(weighted.integral(), 4.0 + 6.0);
}

#[rstest]
fn failed_job_leaves_existing_artifact_untouched(artifact: HistogramArtifact) {
    let dir = TempDir::new().expect("temp dir");
    let output = write(&dir, "out.parquet", &artifact);
    let before = fs::read(&output).expect("read");

    let good = dir.path().join("good.parquet");
    TreeFileFixture::new()
        .with_tree(TreeFixture::new("events").with_f64("px", [Some(1.0)]))
        .write(&good)
        .expect("fixture writes");
    let broken = dir.path().join("broken.parquet");
    fs::write(&broken, "not parquet").expect("write");

    let job = JobBuilder::new()
        .with_output(&output)
        .with_inputs([good, broken])
        .with_histogram("px=px")
        .build()
        .expect("job builds");
    let err = run_job(job, &ParquetOpener::new(), &ParquetArtifactWriter::new())
        .expect_err("second input is unreadable");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.code(), "IO_INPUT_OPEN");
    assert_eq!(fs::read(&output).expect("read"), before);
}

#[rstest]
fn missing_inputs_fail_before_anything_is_written() {
    let dir = TempDir::new().expect("temp dir");
    let output = dir.path().join("out.parquet");
    let job = JobBuilder::new()
        .with_output(&output)
        .with_input(Path::new("/definitely/not/here.parquet"))
        .with_histogram("px=px")
        .build()
        .expect("job builds");
    let err = run_job(job, &ParquetOpener::new(), &ParquetArtifactWriter::new())
        .expect_err("input is missing");
    assert_eq!(err.code(), "IO_INPUT_OPEN");
    assert!(!output.exists());
}
