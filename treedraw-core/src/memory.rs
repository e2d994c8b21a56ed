//! In-memory trees and sinks for tests and examples.
//!
//! [`MemoryOpener`] serves files registered under arbitrary paths and counts
//! how often each one is scanned. [`MemorySink`] keeps written artifacts.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use thiserror::Error;

use crate::source::{HistogramArtifact, HistogramSink, TreeInfo, TreeOpener, TreeSource};

/// Errors raised by the in-memory backend.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum MemoryError {
    /// No file is registered under the path.
    #[error("no in-memory file registered at `{}`", path.display())]
    FileNotFound {
        /// Requested path.
        path: PathBuf,
    },
    /// The file has no such tree.
    #[error("no tree named `{tree}`")]
    TreeNotFound {
        /// Requested tree.
        tree: String,
    },
    /// The tree has no such branch.
    #[error("tree `{tree}` has no branch `{branch}`")]
    BranchNotFound {
        /// Tree being scanned.
        tree: String,
        /// Requested branch.
        branch: String,
    },
    /// The sink was built to refuse writes.
    #[error("writes to `{}` are refused", path.display())]
    WriteRefused {
        /// Destination path.
        path: PathBuf,
    },
    /// The sink lock was poisoned by a panicking writer.
    #[error("in-memory sink lock poisoned")]
    Poisoned,
}

/// One tree: named branches and row-major values.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryTree {
    info: TreeInfo,
    rows: Vec<Vec<Option<f64>>>,
}

impl MemoryTree {
    /// Creates an empty tree with the given branches.
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, branches: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            info: TreeInfo::new(name, branches),
            rows: Vec::new(),
        }
    }

    /// Appends rows; each row holds one value per branch in declaration order.
    ///
    /// Missing trailing values read as null.
    #[must_use]
    pub fn with_rows<I, R>(mut self, rows: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = Option<f64>>,
    {
        self.rows
            .extend(rows.into_iter().map(|row| row.into_iter().collect::<Vec<_>>()));
        self
    }

    /// Tree description.
    #[must_use]
    pub fn info(&self) -> &TreeInfo {
        &self.info
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns whether the tree has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug)]
struct MemoryFile {
    infos: Vec<TreeInfo>,
    trees: Vec<MemoryTree>,
    scans: AtomicUsize,
}

/// Opens registered in-memory files.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use treedraw_core::{TreeOpener, TreeSource, memory::{MemoryOpener, MemoryTree}};
///
/// let opener = MemoryOpener::new()
///     .with_file("a", [MemoryTree::new("t", ["x"]).with_rows([[Some(1.0)]])]);
/// let mut source = opener.open(Path::new("a"))?;
/// let records = source.scan("t", &["x".to_owned()], &mut |_| {})?;
/// assert_eq!(records, 1);
/// assert_eq!(opener.scans("a"), 1);
/// # Ok::<(), treedraw_core::memory::MemoryError>(())
/// ```
#[derive(Clone, Debug, Default)]
pub struct MemoryOpener {
    files: HashMap<PathBuf, Arc<MemoryFile>>,
}

impl MemoryOpener {
    /// Creates an opener with no files.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `trees` as the file at `path`, replacing any earlier file.
    #[must_use]
    pub fn with_file<I>(mut self, path: impl Into<PathBuf>, trees: I) -> Self
    where
        I: IntoIterator<Item = MemoryTree>,
    {
        let trees: Vec<MemoryTree> = trees.into_iter().collect();
        let file = MemoryFile {
            infos: trees.iter().map(|tree| tree.info.clone()).collect(),
            trees,
            scans: AtomicUsize::new(0),
        };
        self.files.insert(path.into(), Arc::new(file));
        self
    }

    /// Number of scans performed on the file at `path` so far.
    #[must_use]
    pub fn scans(&self, path: impl AsRef<Path>) -> usize {
        self.files
            .get(path.as_ref())
            .map_or(0, |file| file.scans.load(Ordering::Relaxed))
    }
}

impl TreeOpener for MemoryOpener {
    type Source = MemoryTreeSource;
    type Error = MemoryError;

    fn open(&self, path: &Path) -> Result<Self::Source, Self::Error> {
        let file = self
            .files
            .get(path)
            .ok_or_else(|| MemoryError::FileNotFound {
                path: path.to_path_buf(),
            })?;
        Ok(MemoryTreeSource {
            label: path.display().to_string(),
            file: Arc::clone(file),
        })
    }
}

/// An opened in-memory file.
#[derive(Clone, Debug)]
pub struct MemoryTreeSource {
    label: String,
    file: Arc<MemoryFile>,
}

impl TreeSource for MemoryTreeSource {
    type Error = MemoryError;

    fn label(&self) -> &str {
        &self.label
    }

    fn trees(&self) -> &[TreeInfo] {
        &self.file.infos
    }

    fn scan(
        &mut self,
        tree: &str,
        branches: &[String],
        visit: &mut dyn FnMut(&[Option<f64>]),
    ) -> Result<u64, Self::Error> {
        let data = self
            .file
            .trees
            .iter()
            .find(|candidate| candidate.info.name == tree)
            .ok_or_else(|| MemoryError::TreeNotFound {
                tree: tree.to_owned(),
            })?;
        let columns = branches
            .iter()
            .map(|branch| {
                data.info
                    .branches
                    .iter()
                    .position(|name| name == branch)
                    .ok_or_else(|| MemoryError::BranchNotFound {
                        tree: tree.to_owned(),
                        branch: branch.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.file.scans.fetch_add(1, Ordering::Relaxed);

        let mut record = vec![None; columns.len()];
        for row in &data.rows {
            for (slot, &column) in record.iter_mut().zip(&columns) {
                *slot = row.get(column).copied().flatten();
            }
            visit(&record);
        }
        Ok(data.rows.len() as u64)
    }
}

/// Keeps written artifacts in memory, keyed by path.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: Mutex<Vec<(PathBuf, HistogramArtifact)>>,
    refuse: bool,
}

impl MemorySink {
    /// Creates a sink that accepts every write.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that refuses every write.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    /// The artifact last written to `path`.
    #[must_use]
    pub fn artifact(&self, path: impl AsRef<Path>) -> Option<HistogramArtifact> {
        let artifacts = self.artifacts.lock().ok()?;
        artifacts
            .iter()
            .find(|(written, _)| written == path.as_ref())
            .map(|(_, artifact)| artifact.clone())
    }

    /// Number of distinct paths holding an artifact.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.artifacts.lock().map_or(0, |artifacts| artifacts.len())
    }
}

impl HistogramSink for MemorySink {
    type Error = MemoryError;

    fn write(&self, path: &Path, artifact: &HistogramArtifact) -> Result<(), Self::Error> {
        if self.refuse {
            return Err(MemoryError::WriteRefused {
                path: path.to_path_buf(),
            });
        }
        let mut artifacts = self.artifacts.lock().map_err(|_| MemoryError::Poisoned)?;
        artifacts.retain(|(written, _)| written != path);
        artifacts.push((path.to_path_buf(), artifact.clone()));
        Ok(())
    }
}
