//! Validation and single-pass execution of a [`Job`].
//!
//! The runner moves through `Unconfigured → Validated → Running →
//! Completed | Failed`. Each state before the last is its own type, so a
//! runner cannot be executed before it is validated or executed twice.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{Span, debug, field, info, instrument, warn};

use crate::{
    Result,
    error::{ConfigurationError, IoError},
    fill::FillPlan,
    job::Job,
    source::{HistogramArtifact, HistogramSink, TreeOpener, TreeSource},
};

/// Lifecycle label attached to runner tracing events.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RunnerState {
    /// A job is held but nothing has been checked against the inputs.
    Unconfigured,
    /// Inputs are open and the tree and branches are resolved.
    Validated,
    /// Records are being scanned.
    Running,
    /// The artifact was written.
    Completed,
    /// Execution stopped on an error.
    Failed,
}

impl RunnerState {
    /// Lower-case label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unconfigured => "unconfigured",
            Self::Validated => "validated",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fill totals for one histogram.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramSummary {
    /// Histogram name.
    pub name: String,
    /// 1 or 2.
    pub dimension: u8,
    /// Fills, flow cells included.
    pub entries: u64,
    /// Sum of in-range weights.
    pub integral: f64,
    /// Weighted mean of x over in-range cells, `None` when they hold no weight.
    pub mean_x: Option<f64>,
}

/// Outcome of a completed run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    /// Where the artifact was written.
    pub output: PathBuf,
    /// Tree that was scanned.
    pub tree: String,
    /// Number of input files scanned.
    pub files: usize,
    /// Records visited across all files.
    pub records: u64,
    /// Per-histogram totals in job order.
    pub histograms: Vec<HistogramSummary>,
}

/// A runner holding a job that has not been checked against its inputs.
///
/// # Examples
/// ```
/// use treedraw_core::{
///     BatchHistogramRunner, JobBuilder,
///     memory::{MemoryOpener, MemorySink, MemoryTree},
/// };
///
/// let opener = MemoryOpener::new().with_file(
///     "run.mem",
///     [MemoryTree::new("events", ["px"]).with_rows([[Some(1.0)], [Some(2.0)], [None]])],
/// );
/// let sink = MemorySink::new();
/// let job = JobBuilder::new()
///     .with_output("out.mem")
///     .with_input("run.mem")
///     .with_histogram("px(4,0,4)=px")
///     .build()?;
///
/// let summary = BatchHistogramRunner::new(job).validate(&opener)?.run(&sink)?;
/// assert_eq!(summary.tree, "events");
/// assert_eq!(summary.records, 3);
/// assert_eq!(summary.histograms[0].entries, 2);
/// assert_eq!(opener.scans("run.mem"), 1);
/// # Ok::<(), treedraw_core::JobError>(())
/// ```
#[derive(Clone, Debug)]
pub struct BatchHistogramRunner {
    job: Job,
}

impl BatchHistogramRunner {
    /// Wraps `job` in an unconfigured runner.
    #[must_use]
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The job being run.
    #[must_use]
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Always [`RunnerState::Unconfigured`].
    #[must_use]
    pub const fn state(&self) -> RunnerState {
        RunnerState::Unconfigured
    }

    /// Opens every input, resolves the tree and checks every referenced
    /// branch and the output directory.
    ///
    /// # Errors
    /// Returns [`IoError::InputOpen`] for unreadable inputs,
    /// [`ConfigurationError::NoTree`], [`ConfigurationError::AmbiguousTree`],
    /// [`ConfigurationError::TreeNotFound`] or
    /// [`ConfigurationError::UnknownBranch`] when the tree cannot be used, and
    /// [`IoError::OutputDirectory`] when the output cannot be created.
    #[instrument(
        name = "runner.validate",
        err,
        skip(self, opener),
        fields(inputs = self.job.inputs().len(), tree = field::Empty),
    )]
    pub fn validate<O: TreeOpener>(self, opener: &O) -> Result<ValidatedRunner<O::Source>> {
        debug!(state = %self.state(), "validating job");
        let mut sources = Vec::with_capacity(self.job.inputs().len());
        for path in self.job.inputs() {
            let source = opener.open(path).map_err(|err| IoError::InputOpen {
                path: path.clone(),
                source: Box::new(err),
            })?;
            debug!(path = %path.display(), trees = source.trees().len(), "opened input");
            sources.push((path.clone(), source));
        }

        let tree = resolve_tree(self.job.tree(), &sources)?;
        Span::current().record("tree", field::display(&tree));

        let branches = referenced_branches(&self.job);
        for (path, source) in &sources {
            let info = source
                .tree(&tree)
                .ok_or_else(|| ConfigurationError::TreeNotFound {
                    tree: tree.clone(),
                    file: path.clone(),
                })?;
            if let Some(branch) = branches.iter().find(|branch| !info.has_branch(branch)) {
                return Err(ConfigurationError::UnknownBranch {
                    branch: (*branch).to_owned(),
                    tree: tree.clone(),
                    file: path.clone(),
                }
                .into());
            }
        }

        check_output_directory(self.job.output())?;

        info!(
            state = %RunnerState::Validated,
            tree = tree.as_str(),
            files = sources.len(),
            branches = branches.len(),
            "job validated"
        );
        Ok(ValidatedRunner {
            job: self.job,
            tree,
            sources,
        })
    }
}

/// A runner whose inputs are open and whose tree is resolved.
pub struct ValidatedRunner<S> {
    job: Job,
    tree: String,
    sources: Vec<(PathBuf, S)>,
}

impl<S> fmt::Debug for ValidatedRunner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedRunner")
            .field("job", &self.job)
            .field("tree", &self.tree)
            .field("files", &self.sources.len())
            .finish()
    }
}

impl<S: TreeSource> ValidatedRunner<S> {
    /// The resolved tree name.
    #[must_use]
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// The job being run.
    #[must_use]
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Always [`RunnerState::Validated`].
    #[must_use]
    pub const fn state(&self) -> RunnerState {
        RunnerState::Validated
    }

    /// Scans every input once, fills every histogram and writes the artifact
    /// through `sink`.
    ///
    /// # Errors
    /// Returns [`IoError::InputRead`] when a scan fails and
    /// [`IoError::OutputWrite`] when the sink fails. Nothing is written on a
    /// scan failure.
    #[instrument(
        name = "runner.run",
        skip(self, sink),
        fields(tree = %self.tree, files = self.sources.len(), histograms = self.job.specs().len()),
    )]
    pub fn run<K: HistogramSink>(self, sink: &K) -> Result<RunSummary> {
        info!(state = %RunnerState::Running, "scanning inputs");
        match self.execute(sink) {
            Ok(summary) => {
                info!(
                    state = %RunnerState::Completed,
                    records = summary.records,
                    output = %summary.output.display(),
                    "run completed"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(state = %RunnerState::Failed, code = err.code(), error = %err, "run failed");
                Err(err)
            }
        }
    }

    fn execute<K: HistogramSink>(self, sink: &K) -> Result<RunSummary> {
        let Self {
            job,
            tree,
            mut sources,
        } = self;
        let mut plan = FillPlan::new(job.specs());
        let branches = plan.branches().to_vec();

        let mut records = 0_u64;
        for (path, source) in &mut sources {
            let visited = source
                .scan(&tree, &branches, &mut |values| plan.record(values))
                .map_err(|err| IoError::InputRead {
                    path: path.clone(),
                    tree: tree.clone(),
                    source: Box::new(err),
                })?;
            debug!(path = %path.display(), records = visited, "scanned input");
            records += visited;
        }

        let artifact = HistogramArtifact::new(tree.clone(), plan.finish());
        sink.write(job.output(), &artifact)
            .map_err(|err| IoError::OutputWrite {
                path: job.output().to_path_buf(),
                source: Box::new(err),
            })?;

        let histograms = artifact
            .histograms()
            .iter()
            .map(|histogram| HistogramSummary {
                name: histogram.name().to_owned(),
                dimension: histogram.dimension(),
                entries: histogram.entries(),
                integral: histogram.integral(),
                mean_x: histogram.mean_x(),
            })
            .collect();
        Ok(RunSummary {
            output: job.output().to_path_buf(),
            tree,
            files: sources.len(),
            records,
            histograms,
        })
    }
}

/// Validates and runs `job` in one call.
///
/// # Errors
/// Any error of [`BatchHistogramRunner::validate`] or [`ValidatedRunner::run`].
pub fn run_job<O, K>(job: Job, opener: &O, sink: &K) -> Result<RunSummary>
where
    O: TreeOpener,
    K: HistogramSink,
{
    BatchHistogramRunner::new(job).validate(opener)?.run(sink)
}

fn resolve_tree<S: TreeSource>(
    requested: Option<&str>,
    sources: &[(PathBuf, S)],
) -> Result<String> {
    if let Some(name) = requested {
        return Ok(name.to_owned());
    }
    let Some((file, first)) = sources.first() else {
        return Err(ConfigurationError::NoInputFiles.into());
    };
    match first.trees() {
        [] => Err(ConfigurationError::NoTree { file: file.clone() }.into()),
        [only] => Ok(only.name.clone()),
        several => Err(ConfigurationError::AmbiguousTree {
            file: file.clone(),
            candidates: several.iter().map(|tree| tree.name.clone()).collect(),
        }
        .into()),
    }
}

fn referenced_branches(job: &Job) -> Vec<&str> {
    let mut names: Vec<&str> = Vec::new();
    for name in job.specs().iter().flat_map(|spec| spec.branches()) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn check_output_directory(output: &Path) -> Result<()> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            Err(IoError::OutputDirectory {
                path: parent.to_path_buf(),
            }
            .into())
        }
        _ => Ok(()),
    }
}
