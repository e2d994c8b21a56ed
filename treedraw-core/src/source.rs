//! Storage seams: reading trees and writing histogram artifacts.

use std::path::Path;

use crate::histogram::Histogram;

/// A tree found in a data file: its name and the branches it exposes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TreeInfo {
    /// Tree name.
    pub name: String,
    /// Branch names in storage order.
    pub branches: Vec<String>,
}

impl TreeInfo {
    /// Creates a description of tree `name`.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns whether the tree has branch `name`.
    #[must_use]
    pub fn has_branch(&self, name: &str) -> bool {
        self.branches.iter().any(|branch| branch == name)
    }
}

/// One opened data file.
///
/// # Examples
/// ```
/// use treedraw_core::{TreeInfo, TreeSource};
///
/// struct Counter(Vec<TreeInfo>);
///
/// impl TreeSource for Counter {
///     type Error = std::convert::Infallible;
///     fn label(&self) -> &str { "counter" }
///     fn trees(&self) -> &[TreeInfo] { &self.0 }
///     fn scan(
///         &mut self,
///         _tree: &str,
///         branches: &[String],
///         visit: &mut dyn FnMut(&[Option<f64>]),
///     ) -> Result<u64, Self::Error> {
///         for i in 0..3 {
///             let record = vec![Some(f64::from(i)); branches.len()];
///             visit(&record);
///         }
///         Ok(3)
///     }
/// }
///
/// let mut source = Counter(vec![TreeInfo::new("t", ["n"])]);
/// let mut total = 0.0;
/// let records = source.scan("t", &["n".to_owned()], &mut |r| total += r[0].unwrap_or(0.0))?;
/// assert_eq!((records, total), (3, 3.0));
/// # Ok::<(), std::convert::Infallible>(())
/// ```
pub trait TreeSource {
    /// Backend error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Human-readable label, usually the file path.
    fn label(&self) -> &str;

    /// Trees available in this file.
    fn trees(&self) -> &[TreeInfo];

    /// Returns the named tree, if present.
    fn tree(&self, name: &str) -> Option<&TreeInfo> {
        self.trees().iter().find(|tree| tree.name == name)
    }

    /// Visits every record of `tree` in storage order.
    ///
    /// Each record handed to `visit` holds one value per entry of `branches`,
    /// in the same order; `None` marks a null value. Returns the number of
    /// records visited.
    ///
    /// # Errors
    /// Returns the backend error when the tree or a branch is missing or the
    /// data cannot be decoded.
    fn scan(
        &mut self,
        tree: &str,
        branches: &[String],
        visit: &mut dyn FnMut(&[Option<f64>]),
    ) -> Result<u64, Self::Error>;
}

/// Opens data files as [`TreeSource`]s.
pub trait TreeOpener {
    /// The opened file.
    type Source: TreeSource;
    /// Backend error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Opens the file at `path`.
    ///
    /// # Errors
    /// Returns the backend error when the file is missing or unreadable.
    fn open(&self, path: &Path) -> Result<Self::Source, Self::Error>;
}

/// Everything a run produces: the tree it read and the histograms in job order.
#[derive(Clone, Debug, PartialEq)]
pub struct HistogramArtifact {
    tree: String,
    histograms: Vec<Histogram>,
}

impl HistogramArtifact {
    /// Bundles `histograms` filled from `tree`.
    #[must_use]
    pub fn new(tree: impl Into<String>, histograms: Vec<Histogram>) -> Self {
        Self {
            tree: tree.into(),
            histograms,
        }
    }

    /// Tree the histograms were filled from.
    #[must_use]
    pub fn tree(&self) -> &str {
        &self.tree
    }

    /// Histograms in job order.
    #[must_use]
    pub fn histograms(&self) -> &[Histogram] {
        &self.histograms
    }

    /// Looks a histogram up by name.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<&Histogram> {
        self.histograms.iter().find(|histogram| histogram.name() == name)
    }

    /// Consumes the artifact and returns its histograms.
    #[must_use]
    pub fn into_histograms(self) -> Vec<Histogram> {
        self.histograms
    }
}

/// Persists a [`HistogramArtifact`].
pub trait HistogramSink {
    /// Backend error.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Writes `artifact` to `path`, replacing any existing file.
    ///
    /// Implementations must leave an existing file untouched when the write
    /// fails.
    ///
    /// # Errors
    /// Returns the backend error when the artifact cannot be written.
    fn write(&self, path: &Path, artifact: &HistogramArtifact) -> Result<(), Self::Error>;
}
