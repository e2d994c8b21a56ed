//! Unit tests for argument parsing, job assembly and rendering.

use super::{Cli, ExecutionSummary, JobOrigin, exit_status, job_from_cli, render_summary, run_cli};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use rstest::{fixture, rstest};
use tempfile::TempDir;
use tracing::Level;
use treedraw_core::{ErrorKind, HistogramSummary, RunSummary};
use treedraw_providers_parquet::read_artifact;
use treedraw_test_support::{
    fixtures::{TreeFileFixture, TreeFixture},
    tracing::RecordingLayer,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

struct Workspace {
    dir: TempDir,
    input: PathBuf,
}

impl Workspace {
    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

#[fixture]
fn workspace() -> Workspace {
    let dir = TempDir::new().expect("temp dir");
    let input = dir.path().join("events.parquet");
    TreeFileFixture::new()
        .with_tree(
            TreeFixture::new("events")
                .with_f64("px", [Some(0.5), Some(1.5), Some(2.5), Some(-4.0)])
                .with_f64("py", [Some(1.0), Some(1.0), Some(0.0), Some(2.0)]),
        )
        .write(&input)
        .expect("fixture writes");
    Workspace { dir, input }
}

fn flags(workspace: &Workspace) -> Cli {
    Cli {
        output: Some(workspace.path("out.parquet")),
        inputs: vec![workspace.input.clone()],
        histograms: vec!["px(4,0,4)=px".to_owned(), "pxpy=px:py if py > 0".to_owned()],
        ..Cli::default()
    }
}

#[rstest]
fn clap_parses_every_flag() {
    let cli = Cli::try_parse_from([
        "treedraw", "-o", "out.parquet", "-i", "a.parquet", "b.parquet", "-t", "events", "-H",
        "px=px", "py=py if px > 0",
    ])
    .expect("arguments parse");
    assert_eq!(cli.config, None);
    assert_eq!(cli.output, Some(PathBuf::from("out.parquet")));
    assert_eq!(cli.inputs, [PathBuf::from("a.parquet"), PathBuf::from("b.parquet")]);
    assert_eq!(cli.tree.as_deref(), Some("events"));
    assert_eq!(cli.histograms, ["px=px", "py=py if px > 0"]);
}

#[rstest]
fn clap_parses_a_lone_config_file() {
    let cli = Cli::try_parse_from(["treedraw", "job.cfg"]).expect("arguments parse");
    assert_eq!(cli.config, Some(PathBuf::from("job.cfg")));
    assert!(cli.inputs.is_empty());
}

#[rstest]
fn clap_rejects_unknown_flags() {
    assert!(Cli::try_parse_from(["treedraw", "--bins", "10"]).is_err());
}

#[rstest]
#[case::output(Cli { output: Some("out.parquet".into()), ..Cli::default() })]
#[case::input(Cli { inputs: vec!["a.parquet".into()], ..Cli::default() })]
#[case::tree(Cli { tree: Some("events".into()), ..Cli::default() })]
#[case::histo(Cli { histograms: vec!["px=px".into()], ..Cli::default() })]
fn config_file_conflicts_with_job_flags(#[case] cli: Cli) {
    let cli = Cli {
        config: Some("job.cfg".into()),
        ..cli
    };
    let err = job_from_cli(cli).expect_err("sources conflict");
    assert_eq!(err.code(), "CONFIG_CONFLICTING_SOURCES");
}

#[rstest]
#[case::no_output(Cli { inputs: vec!["a.parquet".into()], histograms: vec!["px=px".into()], ..Cli::default() }, "CONFIG_MISSING_OUTPUT")]
#[case::no_inputs(Cli { output: Some("o".into()), histograms: vec!["px=px".into()], ..Cli::default() }, "CONFIG_NO_INPUT_FILES")]
#[case::no_histograms(Cli { output: Some("o".into()), inputs: vec!["a.parquet".into()], ..Cli::default() }, "CONFIG_NO_HISTOGRAMS")]
fn flags_require_a_complete_job(#[case] cli: Cli, #[case] code: &str) {
    let err = job_from_cli(cli).expect_err("job is incomplete");
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.code(), code);
}

#[rstest]
fn config_file_and_flags_build_equal_jobs(workspace: Workspace) -> TestResult {
    let config = workspace.path("job.cfg");
    fs::write(
        &config,
        format!(
            "# histogram job\n{}\n\n{}\n\npx(4,0,4)=px\npxpy=px:py if py > 0\n",
            workspace.path("out.parquet").display(),
            workspace.input.display(),
        ),
    )?;
    let (file_origin, from_file) = job_from_cli(Cli {
        config: Some(config.clone()),
        ..Cli::default()
    })?;
    let (flag_origin, from_flags) = job_from_cli(flags(&workspace))?;
    assert_eq!(file_origin, JobOrigin::ConfigFile(config));
    assert_eq!(flag_origin, JobOrigin::Arguments);
    assert_eq!(from_file, from_flags);
    Ok(())
}

#[rstest]
fn missing_config_file_is_an_io_error(workspace: Workspace) {
    let err = run_cli(Cli {
        config: Some(workspace.path("absent.cfg")),
        ..Cli::default()
    })
    .expect_err("file is missing");
    assert_eq!(err.kind(), ErrorKind::Io);
    assert_eq!(err.code(), "IO_CONFIG_READ");
}

#[rstest]
fn run_cli_writes_the_artifact(workspace: Workspace) -> TestResult {
    let summary = run_cli(flags(&workspace))?;
    assert_eq!(summary.origin, JobOrigin::Arguments);
    assert_eq!(summary.run.tree, "events");
    assert_eq!(summary.run.records, 4);

    let artifact = read_artifact(&workspace.path("out.parquet"))?;
    let px = artifact.histogram("px").ok_or("px missing")?;
    assert_eq!(px.entries(), 4);
    assert_eq!(px.integral(), 3.0);
    let pxpy = artifact.histogram("pxpy").ok_or("pxpy missing")?;
    assert_eq!(pxpy.dimension(), 2);
    assert_eq!(pxpy.entries(), 3);
    Ok(())
}

#[rstest]
fn run_cli_records_the_job_origin(workspace: Workspace) {
    let (result, layer) = RecordingLayer::capture(|| run_cli(flags(&workspace)));
    result.expect("run succeeds");

    let span = layer.find_span("cli.run").expect("cli.run span must exist");
    assert_eq!(span.field("origin"), Some("command-line arguments"));
    let completed = layer
        .events()
        .into_iter()
        .find(|event| event.message() == Some("command completed"))
        .expect("completion event must exist");
    assert_eq!(completed.level, Level::INFO);
    assert_eq!(completed.field("records"), Some("4"));
}

#[rstest]
fn unknown_branch_fails_without_output(workspace: Workspace) {
    let cli = Cli {
        histograms: vec!["pz=pz".to_owned()],
        ..flags(&workspace)
    };
    let err = run_cli(cli).expect_err("branch is missing");
    assert_eq!(err.code(), "CONFIG_UNKNOWN_BRANCH");
    assert!(!workspace.path("out.parquet").exists());
}

#[rstest]
fn render_summary_lists_histograms() -> TestResult {
    let summary = ExecutionSummary {
        origin: JobOrigin::ConfigFile(Path::new("job.cfg").to_path_buf()),
        run: RunSummary {
            output: "out.parquet".into(),
            tree: "events".to_owned(),
            files: 2,
            records: 10,
            histograms: vec![
                HistogramSummary {
                    name: "px".to_owned(),
                    dimension: 1,
                    entries: 7,
                    integral: 6.5,
                    mean_x: Some(1.25),
                },
                HistogramSummary {
                    name: "empty".to_owned(),
                    dimension: 2,
                    entries: 0,
                    integral: 0.0,
                    mean_x: None,
                },
            ],
        },
        elapsed: Duration::from_millis(1250),
    };
    let mut buffer = Vec::new();
    render_summary(&summary, &mut buffer)?;
    let text = String::from_utf8(buffer)?;
    assert!(text.contains("job: config file job.cfg"));
    assert!(text.contains("output: out.parquet"));
    assert!(text.contains("records: 10"));
    assert!(text.contains("histograms: 2"));
    assert!(text.contains("px\t1D\t7\t6.5\t1.2500\n"));
    assert!(text.contains("empty\t2D\t0\t0\t-\n"));
    assert!(text.ends_with("elapsed: 1.250s\n"));
    Ok(())
}

#[rstest]
#[case(Some(ErrorKind::Configuration), 2)]
#[case(Some(ErrorKind::Io), 1)]
#[case(None, 1)]
fn exit_status_follows_error_kind(#[case] kind: Option<ErrorKind>, #[case] expected: u8) {
    assert_eq!(exit_status(kind), expected);
}
