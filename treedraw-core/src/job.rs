//! The immutable job description and the builder that validates it.

use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use crate::{Result, error::ConfigurationError, spec::HistogramSpec};

/// One complete request: read `inputs`, fill every histogram spec from the
/// tree, and write the result to `output`.
///
/// A `Job` is only obtainable through [`JobBuilder::build`] or
/// [`Job::from_config_file`], so its invariants always hold: the input list
/// and the spec list are non-empty and spec names are unique.
#[derive(Clone, Debug, PartialEq)]
pub struct Job {
    output: PathBuf,
    inputs: Vec<PathBuf>,
    tree: Option<String>,
    specs: Vec<HistogramSpec>,
}

impl Job {
    /// Starts building a job from explicit fields.
    #[must_use]
    pub fn builder() -> JobBuilder {
        JobBuilder::new()
    }

    /// Output artifact path.
    #[must_use]
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Input files in scan order.
    #[must_use]
    pub fn inputs(&self) -> &[PathBuf] {
        &self.inputs
    }

    /// Explicit tree name, or `None` to infer it from the first input.
    #[must_use]
    pub fn tree(&self) -> Option<&str> {
        self.tree.as_deref()
    }

    /// Histogram specs in request order.
    #[must_use]
    pub fn specs(&self) -> &[HistogramSpec] {
        &self.specs
    }
}

/// Collects job fields and validates them into a [`Job`].
///
/// Histogram specs are kept as text until [`JobBuilder::build`], which
/// parses them before any file is touched.
///
/// # Examples
/// ```
/// use treedraw_core::JobBuilder;
///
/// let job = JobBuilder::new()
///     .with_output("out.parquet")
///     .with_input("run1.parquet")
///     .with_input("run2.parquet")
///     .with_histogram("px=px")
///     .with_histogram("pxpy(20,-5,5,20,-5,5)=px:py if e > 1")
///     .build()
///     .expect("job is valid");
/// assert_eq!(job.inputs().len(), 2);
/// assert_eq!(job.tree(), None);
/// assert_eq!(job.specs()[1].dimension(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct JobBuilder {
    output: Option<PathBuf>,
    inputs: Vec<PathBuf>,
    tree: Option<String>,
    histograms: Vec<String>,
}

impl JobBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the output artifact path.
    #[must_use]
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Appends one input file.
    #[must_use]
    pub fn with_input(mut self, path: impl Into<PathBuf>) -> Self {
        self.inputs.push(path.into());
        self
    }

    /// Appends several input files.
    #[must_use]
    pub fn with_inputs<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.inputs.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Names the tree to read. A blank name means "infer".
    #[must_use]
    pub fn with_tree(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.tree = (!name.trim().is_empty()).then(|| name.trim().to_owned());
        self
    }

    /// Appends one histogram spec in `NAME=EXPR[:EXPR][ if CUT]` form.
    #[must_use]
    pub fn with_histogram(mut self, spec: impl Into<String>) -> Self {
        self.histograms.push(spec.into());
        self
    }

    /// Appends several histogram specs.
    #[must_use]
    pub fn with_histograms<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.histograms.extend(specs.into_iter().map(Into::into));
        self
    }

    /// Validates the collected fields and parses every histogram spec.
    ///
    /// # Errors
    /// Returns [`ConfigurationError::MissingOutput`],
    /// [`ConfigurationError::NoInputFiles`] or
    /// [`ConfigurationError::NoHistograms`] when a required field is absent,
    /// the spec parse errors of [`HistogramSpec::parse`], and
    /// [`ConfigurationError::DuplicateHistogram`] when two specs share a name.
    #[instrument(
        name = "job.build",
        err,
        skip(self),
        fields(inputs = self.inputs.len(), histograms = self.histograms.len()),
    )]
    pub fn build(self) -> Result<Job> {
        let output = self.output.ok_or(ConfigurationError::MissingOutput)?;
        if self.inputs.is_empty() {
            return Err(ConfigurationError::NoInputFiles.into());
        }
        if self.histograms.is_empty() {
            return Err(ConfigurationError::NoHistograms.into());
        }

        let mut specs: Vec<HistogramSpec> = Vec::with_capacity(self.histograms.len());
        for text in &self.histograms {
            let spec = HistogramSpec::parse(text)?;
            if specs.iter().any(|known| known.name() == spec.name()) {
                return Err(ConfigurationError::DuplicateHistogram {
                    name: spec.name().to_owned(),
                }
                .into());
            }
            debug!(name = spec.name(), dimension = spec.dimension(), "parsed histogram spec");
            specs.push(spec);
        }

        Ok(Job {
            output,
            inputs: self.inputs,
            tree: self.tree,
            specs,
        })
    }
}
