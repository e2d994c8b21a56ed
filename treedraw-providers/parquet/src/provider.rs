//! Parquet-backed tree sources.
use std::{
    fs::File,
    path::{Path, PathBuf},
};

use arrow_array::{Array, Float64Array, StructArray, cast::AsArray, types::Float64Type};
use arrow_cast::cast::cast;
use arrow_schema::DataType;
use parquet::arrow::{
    ProjectionMask,
    arrow_reader::{ArrowReaderMetadata, ArrowReaderOptions, ParquetRecordBatchReaderBuilder},
};
use tracing::{debug, instrument};

use treedraw_core::{TreeInfo, TreeOpener, TreeSource};

use crate::{
    errors::ParquetTreeError,
    schema::{discover_trees, resolve_tree},
};

/// Rows decoded per record batch unless overridden.
pub const DEFAULT_BATCH_SIZE: usize = 8192;

/// An open Parquet file whose struct columns are trees.
#[derive(Debug)]
pub struct ParquetTreeFile {
    label: String,
    path: PathBuf,
    file: File,
    metadata: ArrowReaderMetadata,
    trees: Vec<TreeInfo>,
    batch_size: usize,
}

impl ParquetTreeFile {
    /// Opens `path` and reads its footer.
    ///
    /// # Errors
    /// Returns [`ParquetTreeError::Io`] when the file cannot be opened and
    /// [`ParquetTreeError::Parquet`] when it is not a Parquet file.
    #[instrument(name = "parquet.open", err, skip(path), fields(path = %path.display()))]
    pub fn open(path: &Path) -> Result<Self, ParquetTreeError> {
        let file = File::open(path)?;
        let metadata = ArrowReaderMetadata::load(&file, ArrowReaderOptions::default())?;
        let trees = discover_trees(metadata.schema());
        debug!(
            trees = trees.len(),
            rows = metadata.metadata().file_metadata().num_rows(),
            "read parquet footer"
        );
        Ok(Self {
            label: path.display().to_string(),
            path: path.to_path_buf(),
            file,
            metadata,
            trees,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Overrides the number of rows decoded per batch.
    #[must_use]
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TreeSource for ParquetTreeFile {
    type Error = ParquetTreeError;

    fn label(&self) -> &str {
        &self.label
    }

    fn trees(&self) -> &[TreeInfo] {
        &self.trees
    }

    #[instrument(
        name = "parquet.scan",
        err,
        skip(self, branches, visit),
        fields(path = %self.label, branches = branches.len()),
    )]
    fn scan(
        &mut self,
        tree: &str,
        branches: &[String],
        visit: &mut dyn FnMut(&[Option<f64>]),
    ) -> Result<u64, Self::Error> {
        let root = resolve_tree(self.metadata.schema(), tree, branches)?;
        let mask = ProjectionMask::roots(self.metadata.parquet_schema(), [root]);
        let reader = ParquetRecordBatchReaderBuilder::new_with_metadata(
            self.file.try_clone()?,
            self.metadata.clone(),
        )
        .with_projection(mask)
        .with_batch_size(self.batch_size)
        .build()?;

        let mut record = vec![None; branches.len()];
        let mut records = 0_u64;
        for batch in reader {
            let batch = batch?;
            let column = batch.column(0);
            let rows = column.as_struct_opt().ok_or_else(|| ParquetTreeError::NotATree {
                column: tree.to_owned(),
                actual: column.data_type().clone(),
            })?;
            let values = widen_branches(rows, tree, branches)?;
            for row in 0..rows.len() {
                if rows.is_null(row) {
                    continue;
                }
                for (slot, array) in record.iter_mut().zip(&values) {
                    *slot = array.is_valid(row).then(|| array.value(row));
                }
                visit(&record);
                records += 1;
            }
        }
        debug!(records, "scan finished");
        Ok(records)
    }
}

/// Casts the requested children of `rows` to `Float64`.
fn widen_branches(
    rows: &StructArray,
    tree: &str,
    branches: &[String],
) -> Result<Vec<Float64Array>, ParquetTreeError> {
    branches
        .iter()
        .map(|branch| {
            let child = rows
                .column_by_name(branch)
                .ok_or_else(|| ParquetTreeError::BranchNotFound {
                    tree: tree.to_owned(),
                    branch: branch.clone(),
                })?;
            let widened = cast(child, &DataType::Float64)?;
            Ok(widened.as_primitive::<Float64Type>().clone())
        })
        .collect()
}

/// Opens Parquet files as [`ParquetTreeFile`]s.
///
/// # Examples
/// ```no_run
/// use std::path::Path;
/// use treedraw_core::{TreeOpener, TreeSource};
/// use treedraw_providers_parquet::ParquetOpener;
///
/// let opener = ParquetOpener::new();
/// let file = opener.open(Path::new("events.parquet"))?;
/// for tree in file.trees() {
///     println!("{}: {}", tree.name, tree.branches.join(", "));
/// }
/// # Ok::<(), treedraw_providers_parquet::ParquetTreeError>(())
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ParquetOpener {
    batch_size: usize,
}

impl Default for ParquetOpener {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl ParquetOpener {
    /// Creates an opener using [`DEFAULT_BATCH_SIZE`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of rows decoded per batch for every opened file.
    #[must_use]
    pub fn with_batch_size(mut self, rows: usize) -> Self {
        self.batch_size = rows.max(1);
        self
    }
}

impl TreeOpener for ParquetOpener {
    type Source = ParquetTreeFile;
    type Error = ParquetTreeError;

    fn open(&self, path: &Path) -> Result<Self::Source, Self::Error> {
        Ok(ParquetTreeFile::open(path)?.with_batch_size(self.batch_size))
    }
}
