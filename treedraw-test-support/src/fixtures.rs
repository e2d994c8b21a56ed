//! Builders for Parquet files laid out as trees.
//!
//! Each [`TreeFixture`] becomes one top-level struct column whose children
//! are the branches. Plain top-level columns can be added alongside to check
//! that readers ignore them.

use std::{fs::File, path::Path, sync::Arc};

use arrow_array::{
    ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray, StructArray,
};
use arrow_buffer::NullBuffer;
use arrow_schema::{ArrowError, DataType, Field, Fields, Schema};
use parquet::{arrow::ArrowWriter, errors::ParquetError, file::properties::WriterProperties};
use thiserror::Error;

/// Failures while writing a fixture file.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Columns of different lengths were combined.
    #[error("column `{column}` has {found} rows but {expected} were expected")]
    RowCount {
        /// Offending column or tree.
        column: String,
        /// Rows in the first column.
        expected: usize,
        /// Rows in this column.
        found: usize,
    },
    /// The file could not be created.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Arrow rejected the arrays.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    /// Parquet encoding failed.
    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),
}

/// Values of one column.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnValues {
    /// 64-bit floats.
    Float64(Vec<Option<f64>>),
    /// 32-bit floats.
    Float32(Vec<Option<f32>>),
    /// 32-bit integers.
    Int32(Vec<Option<i32>>),
    /// 64-bit integers.
    Int64(Vec<Option<i64>>),
    /// Booleans.
    Boolean(Vec<Option<bool>>),
    /// Strings, which are never branches.
    Utf8(Vec<Option<String>>),
}

impl ColumnValues {
    fn len(&self) -> usize {
        match self {
            Self::Float64(values) => values.len(),
            Self::Float32(values) => values.len(),
            Self::Int32(values) => values.len(),
            Self::Int64(values) => values.len(),
            Self::Boolean(values) => values.len(),
            Self::Utf8(values) => values.len(),
        }
    }

    fn data_type(&self) -> DataType {
        match self {
            Self::Float64(_) => DataType::Float64,
            Self::Float32(_) => DataType::Float32,
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Boolean(_) => DataType::Boolean,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    fn to_array(&self) -> ArrayRef {
        match self {
            Self::Float64(values) => Arc::new(Float64Array::from(values.clone())),
            Self::Float32(values) => Arc::new(Float32Array::from(values.clone())),
            Self::Int32(values) => Arc::new(Int32Array::from(values.clone())),
            Self::Int64(values) => Arc::new(Int64Array::from(values.clone())),
            Self::Boolean(values) => Arc::new(BooleanArray::from(values.clone())),
            Self::Utf8(values) => Arc::new(StringArray::from(values.clone())),
        }
    }
}

/// One tree: a struct column of branches.
///
/// # Examples
/// ```
/// use treedraw_test_support::fixtures::TreeFixture;
///
/// let tree = TreeFixture::new("events")
///     .with_f64("px", [Some(1.0), Some(-2.0), None])
///     .with_i64("n", [Some(3), Some(1), Some(2)])
///     .with_null_rows([2]);
/// assert_eq!(tree.rows(), 3);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TreeFixture {
    name: String,
    branches: Vec<(String, ColumnValues)>,
    null_rows: Vec<usize>,
}

impl TreeFixture {
    /// Creates a tree with no branches.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            branches: Vec::new(),
            null_rows: Vec::new(),
        }
    }

    /// Adds a branch with arbitrary values.
    #[must_use]
    pub fn with_branch(mut self, name: impl Into<String>, values: ColumnValues) -> Self {
        self.branches.push((name.into(), values));
        self
    }

    /// Adds a `Float64` branch.
    #[must_use]
    pub fn with_f64(self, name: impl Into<String>, values: impl IntoIterator<Item = Option<f64>>) -> Self {
        self.with_branch(name, ColumnValues::Float64(values.into_iter().collect()))
    }

    /// Adds an `Int64` branch.
    #[must_use]
    pub fn with_i64(self, name: impl Into<String>, values: impl IntoIterator<Item = Option<i64>>) -> Self {
        self.with_branch(name, ColumnValues::Int64(values.into_iter().collect()))
    }

    /// Adds a `Boolean` branch.
    #[must_use]
    pub fn with_bool(self, name: impl Into<String>, values: impl IntoIterator<Item = Option<bool>>) -> Self {
        self.with_branch(name, ColumnValues::Boolean(values.into_iter().collect()))
    }

    /// Marks whole rows of the tree as null.
    #[must_use]
    pub fn with_null_rows(mut self, rows: impl IntoIterator<Item = usize>) -> Self {
        self.null_rows.extend(rows);
        self
    }

    /// Tree name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rows in the first branch, or zero for a tree without branches.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.branches.first().map_or(0, |(_, values)| values.len())
    }

    fn to_column(&self, rows: usize) -> Result<(Field, ArrayRef), FixtureError> {
        let mut fields = Vec::with_capacity(self.branches.len());
        let mut arrays = Vec::with_capacity(self.branches.len());
        for (name, values) in &self.branches {
            if values.len() != rows {
                return Err(FixtureError::RowCount {
                    column: format!("{}.{name}", self.name),
                    expected: rows,
                    found: values.len(),
                });
            }
            fields.push(Field::new(name, values.data_type(), true));
            arrays.push(values.to_array());
        }
        let nulls = (!self.null_rows.is_empty()).then(|| {
            NullBuffer::from(
                (0..rows)
                    .map(|row| !self.null_rows.contains(&row))
                    .collect::<Vec<bool>>(),
            )
        });
        let fields = Fields::from(fields);
        let array = StructArray::try_new(fields.clone(), arrays, nulls)?;
        Ok((
            Field::new(&self.name, DataType::Struct(fields), true),
            Arc::new(array),
        ))
    }
}

/// A whole file: trees plus optional plain columns.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TreeFileFixture {
    trees: Vec<TreeFixture>,
    plain: Vec<(String, ColumnValues)>,
    row_group_size: Option<usize>,
}

impl TreeFileFixture {
    /// Creates an empty file description.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tree.
    #[must_use]
    pub fn with_tree(mut self, tree: TreeFixture) -> Self {
        self.trees.push(tree);
        self
    }

    /// Adds a plain top-level column.
    #[must_use]
    pub fn with_plain_column(mut self, name: impl Into<String>, values: ColumnValues) -> Self {
        self.plain.push((name.into(), values));
        self
    }

    /// Limits row groups to `rows` rows so readers see several batches.
    #[must_use]
    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = Some(rows);
        self
    }

    /// Writes the file to `path`.
    ///
    /// # Errors
    /// Returns [`FixtureError`] when columns disagree on their length or the
    /// file cannot be encoded.
    pub fn write(&self, path: &Path) -> Result<(), FixtureError> {
        let rows = self
            .trees
            .first()
            .map(TreeFixture::rows)
            .or_else(|| self.plain.first().map(|(_, values)| values.len()))
            .unwrap_or(0);

        let mut fields = Vec::new();
        let mut arrays = Vec::new();
        for tree in &self.trees {
            let (field, array) = tree.to_column(rows)?;
            fields.push(field);
            arrays.push(array);
        }
        for (name, values) in &self.plain {
            if values.len() != rows {
                return Err(FixtureError::RowCount {
                    column: name.clone(),
                    expected: rows,
                    found: values.len(),
                });
            }
            fields.push(Field::new(name, values.data_type(), true));
            arrays.push(values.to_array());
        }

        let schema = Arc::new(Schema::new(fields));
        let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;
        let properties = self
            .row_group_size
            .map(|size| WriterProperties::builder().set_max_row_group_size(size).build());
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, schema, properties)?;
        writer.write(&batch)?;
        writer.close()?;
        Ok(())
    }
}

/// Writes a file holding the given trees.
///
/// # Errors
/// See [`TreeFileFixture::write`].
pub fn write_tree_file(path: &Path, trees: impl IntoIterator<Item = TreeFixture>) -> Result<(), FixtureError> {
    trees
        .into_iter()
        .fold(TreeFileFixture::new(), TreeFileFixture::with_tree)
        .write(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    use parquet::file::reader::{FileReader, SerializedFileReader};
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    fn writes_struct_columns() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("trees.parquet");
        write_tree_file(
            &path,
            [
                TreeFixture::new("events").with_f64("px", [Some(1.0), None]),
                TreeFixture::new("runs").with_i64("lumi", [Some(4), Some(5)]),
            ],
        )
        .expect("fixture writes");

        let reader = SerializedFileReader::new(File::open(&path).expect("open")).expect("reader");
        assert_eq!(reader.metadata().file_metadata().num_rows(), 2);
        let leaves = reader.metadata().file_metadata().schema_descr().num_columns();
        assert_eq!(leaves, 2);
    }

    #[rstest]
    fn rejects_ragged_columns() {
        let dir = TempDir::new().expect("temp dir");
        let err = TreeFileFixture::new()
            .with_tree(TreeFixture::new("events").with_f64("px", [Some(1.0)]))
            .with_plain_column("id", ColumnValues::Int32(vec![Some(1), Some(2)]))
            .write(&dir.path().join("bad.parquet"))
            .expect_err("lengths differ");
        assert!(matches!(err, FixtureError::RowCount { expected: 1, found: 2, .. }));
    }
}
