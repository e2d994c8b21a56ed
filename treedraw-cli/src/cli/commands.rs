//! Argument parsing, job assembly and summary rendering.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{Span, field, info, instrument};
use treedraw_core::{
    ConfigurationError, ErrorKind, Job, JobBuilder, JobError, RunSummary, run_job,
};
use treedraw_providers_parquet::{ParquetArtifactWriter, ParquetOpener};

/// Top-level CLI options parsed by [`clap`].
#[derive(Debug, Parser, Clone, Default)]
#[command(
    name = "treedraw",
    about = "Fill histograms from Parquet trees in a single pass.",
    after_help = "Histogram specs take the form NAME[(NX,XLO,XHI[,NY,YLO,YHI])]=X[:Y][ if CUT]."
)]
pub struct Cli {
    /// Configuration file describing the whole job.
    #[arg(value_name = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Output artifact path.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Input Parquet files, read in order.
    #[arg(short = 'i', long = "input", value_name = "PATH", num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Tree to read; inferred when the first input holds exactly one.
    #[arg(short, long, value_name = "NAME")]
    pub tree: Option<String>,

    /// Histogram specs.
    #[arg(short = 'H', long = "histo", value_name = "SPEC", num_args = 1..)]
    pub histograms: Vec<String>,
}

impl Cli {
    fn has_job_flags(&self) -> bool {
        self.output.is_some()
            || self.tree.is_some()
            || !self.inputs.is_empty()
            || !self.histograms.is_empty()
    }
}

/// Where the job description came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOrigin {
    /// A configuration file at this path.
    ConfigFile(PathBuf),
    /// Explicit command-line flags.
    Arguments,
}

impl fmt::Display for JobOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFile(path) => write!(f, "config file {}", path.display()),
            Self::Arguments => f.write_str("command-line arguments"),
        }
    }
}

/// Summarises the outcome of executing a job.
#[derive(Debug, Clone)]
pub struct ExecutionSummary {
    /// Source of the job description.
    pub origin: JobOrigin,
    /// Totals reported by the runner.
    pub run: RunSummary,
    /// Wall-clock time spent validating and running.
    pub elapsed: Duration,
}

/// Builds the job described by `cli`.
///
/// # Errors
/// Returns [`ConfigurationError::ConflictingSources`] when a configuration
/// file is combined with job flags, and any error raised while reading the
/// file or building the job.
pub fn job_from_cli(cli: Cli) -> Result<(JobOrigin, Job), JobError> {
    if let Some(path) = cli.config.as_deref() {
        if cli.has_job_flags() {
            return Err(ConfigurationError::ConflictingSources.into());
        }
        let job = Job::from_config_file(path)?;
        return Ok((JobOrigin::ConfigFile(path.to_path_buf()), job));
    }

    let Cli {
        output,
        inputs,
        tree,
        histograms,
        ..
    } = cli;
    let mut builder = JobBuilder::new()
        .with_inputs(inputs)
        .with_histograms(histograms);
    if let Some(output) = output {
        builder = builder.with_output(output);
    }
    if let Some(tree) = tree {
        builder = builder.with_tree(tree);
    }
    Ok((JobOrigin::Arguments, builder.build()?))
}

/// Executes the job represented by `cli`.
///
/// # Errors
/// Returns [`JobError`] when the job is invalid or cannot be run.
///
/// # Examples
/// ```
/// # use std::error::Error;
/// # use treedraw_cli::cli::{Cli, run_cli};
/// # use treedraw_core::ErrorKind;
/// #
/// # fn main() -> Result<(), Box<dyn Error>> {
/// let cli = Cli {
///     config: Some("job.cfg".into()),
///     output: Some("out.parquet".into()),
///     ..Cli::default()
/// };
/// let err = run_cli(cli).expect_err("sources conflict");
/// assert_eq!(err.kind(), ErrorKind::Configuration);
/// # Ok(())
/// # }
/// ```
#[instrument(name = "cli.run", err, skip(cli), fields(origin = field::Empty))]
pub fn run_cli(cli: Cli) -> Result<ExecutionSummary, JobError> {
    let started = Instant::now();
    let (origin, job) = job_from_cli(cli)?;
    Span::current().record("origin", field::display(&origin));

    let run = run_job(job, &ParquetOpener::new(), &ParquetArtifactWriter::new())?;
    let elapsed = started.elapsed();
    info!(
        output = %run.output.display(),
        tree = run.tree.as_str(),
        records = run.records,
        elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        "command completed"
    );
    Ok(ExecutionSummary {
        origin,
        run,
        elapsed,
    })
}

/// Maps an error kind to the process exit status.
///
/// Configuration errors exit with 2; I/O errors and anything unclassified
/// exit with 1.
#[must_use]
pub const fn exit_status(kind: Option<ErrorKind>) -> u8 {
    match kind {
        Some(ErrorKind::Configuration) => 2,
        Some(ErrorKind::Io) | None => 1,
    }
}

/// Renders `summary` to `writer` in a human-readable text format.
///
/// # Errors
/// Returns [`io::Error`] if writing to the supplied writer fails.
pub fn render_summary(summary: &ExecutionSummary, mut writer: impl Write) -> io::Result<()> {
    let run = &summary.run;
    writeln!(writer, "job: {}", summary.origin)?;
    writeln!(writer, "output: {}", run.output.display())?;
    writeln!(writer, "tree: {}", run.tree)?;
    writeln!(writer, "files: {}", run.files)?;
    writeln!(writer, "records: {}", run.records)?;
    writeln!(writer, "histograms: {}", run.histograms.len())?;
    for histogram in &run.histograms {
        let mean = histogram
            .mean_x
            .map_or_else(|| "-".to_owned(), |mean| format!("{mean:.4}"));
        writeln!(
            writer,
            "{}\t{}D\t{}\t{}\t{}",
            histogram.name, histogram.dimension, histogram.entries, histogram.integral, mean
        )?;
    }
    writeln!(writer, "elapsed: {:.3}s", summary.elapsed.as_secs_f64())?;
    Ok(())
}
