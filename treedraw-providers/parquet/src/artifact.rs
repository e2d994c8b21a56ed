//! Histogram artifacts stored as one Parquet row per histogram cell.
use std::{collections::HashMap, fs::File, path::Path, sync::Arc};

use arrow_array::{
    Array, ArrayRef, Float64Array, RecordBatch, StringArray, UInt8Array, UInt32Array, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use parquet::arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

use treedraw_core::{Axis, Histogram, HistogramArtifact, HistogramSink};

use crate::errors::ParquetTreeError;

/// Schema metadata key holding the tree name.
pub const TREE_METADATA_KEY: &str = "treedraw.tree";

fn artifact_schema(tree: &str) -> SchemaRef {
    let fields = vec![
        Field::new("histogram", DataType::Utf8, false),
        Field::new("dimension", DataType::UInt8, false),
        Field::new("entries", DataType::UInt64, false),
        Field::new("x_bins", DataType::UInt32, false),
        Field::new("x_low", DataType::Float64, false),
        Field::new("x_high", DataType::Float64, false),
        Field::new("y_bins", DataType::UInt32, true),
        Field::new("y_low", DataType::Float64, true),
        Field::new("y_high", DataType::Float64, true),
        Field::new("bin_x", DataType::UInt32, false),
        Field::new("bin_y", DataType::UInt32, false),
        Field::new("content", DataType::Float64, false),
        Field::new("sumw2", DataType::Float64, false),
    ];
    let metadata = HashMap::from([(TREE_METADATA_KEY.to_owned(), tree.to_owned())]);
    Arc::new(Schema::new_with_metadata(fields, metadata))
}

#[derive(Default)]
struct CellColumns {
    histogram: Vec<String>,
    dimension: Vec<u8>,
    entries: Vec<u64>,
    x_bins: Vec<u32>,
    x_low: Vec<f64>,
    x_high: Vec<f64>,
    y_bins: Vec<Option<u32>>,
    y_low: Vec<Option<f64>>,
    y_high: Vec<Option<f64>>,
    bin_x: Vec<u32>,
    bin_y: Vec<u32>,
    content: Vec<f64>,
    sumw2: Vec<f64>,
}

impl CellColumns {
    fn push_histogram(&mut self, histogram: &Histogram) {
        let x = histogram.x_axis();
        let y = histogram.y_axis();
        let x_cells = x.bins() + 2;
        let cells = histogram.contents().iter().zip(histogram.sumw2());
        for (index, (&content, &sumw2)) in (0_u32..).zip(cells) {
            self.histogram.push(histogram.name().to_owned());
            self.dimension.push(histogram.dimension());
            self.entries.push(histogram.entries());
            self.x_bins.push(x.bins());
            self.x_low.push(x.low());
            self.x_high.push(x.high());
            self.y_bins.push(y.map(Axis::bins));
            self.y_low.push(y.map(Axis::low));
            self.y_high.push(y.map(Axis::high));
            self.bin_x.push(index % x_cells);
            self.bin_y.push(index / x_cells);
            self.content.push(content);
            self.sumw2.push(sumw2);
        }
    }

    fn into_batch(self, schema: SchemaRef) -> Result<RecordBatch, ParquetTreeError> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from(self.histogram)),
            Arc::new(UInt8Array::from(self.dimension)),
            Arc::new(UInt64Array::from(self.entries)),
            Arc::new(UInt32Array::from(self.x_bins)),
            Arc::new(Float64Array::from(self.x_low)),
            Arc::new(Float64Array::from(self.x_high)),
            Arc::new(UInt32Array::from(self.y_bins)),
            Arc::new(Float64Array::from(self.y_low)),
            Arc::new(Float64Array::from(self.y_high)),
            Arc::new(UInt32Array::from(self.bin_x)),
            Arc::new(UInt32Array::from(self.bin_y)),
            Arc::new(Float64Array::from(self.content)),
            Arc::new(Float64Array::from(self.sumw2)),
        ];
        Ok(RecordBatch::try_new(schema, columns)?)
    }
}

/// Writes artifacts as Parquet through a temporary file in the destination
/// directory, so the destination is either fully replaced or left untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParquetArtifactWriter;

impl ParquetArtifactWriter {
    /// Creates a writer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HistogramSink for ParquetArtifactWriter {
    type Error = ParquetTreeError;

    #[instrument(
        name = "parquet.write_artifact",
        err,
        skip(self, path, artifact),
        fields(path = %path.display(), histograms = artifact.histograms().len()),
    )]
    fn write(&self, path: &Path, artifact: &HistogramArtifact) -> Result<(), Self::Error> {
        let schema = artifact_schema(artifact.tree());
        let mut columns = CellColumns::default();
        for histogram in artifact.histograms() {
            columns.push_histogram(histogram);
        }
        let batch = columns.into_batch(Arc::clone(&schema))?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let staged = NamedTempFile::new_in(directory)?;
        let mut writer = ArrowWriter::try_new(staged.reopen()?, schema, None)?;
        writer.write(&batch)?;
        writer.close()?;
        staged.persist(path)?;
        debug!(rows = batch.num_rows(), "artifact written");
        Ok(())
    }
}

/// Reads an artifact written by [`ParquetArtifactWriter`].
///
/// # Errors
/// Returns [`ParquetTreeError::ArtifactColumn`] when a column is missing or
/// mistyped and [`ParquetTreeError::InvalidArtifact`] when the cells do not
/// describe valid histograms.
#[instrument(name = "parquet.read_artifact", err, skip(path), fields(path = %path.display()))]
pub fn read_artifact(path: &Path) -> Result<HistogramArtifact, ParquetTreeError> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(path)?)?;
    let tree = builder
        .schema()
        .metadata()
        .get(TREE_METADATA_KEY)
        .cloned()
        .ok_or_else(|| ParquetTreeError::InvalidArtifact {
            reason: format!("schema metadata lacks `{TREE_METADATA_KEY}`"),
        })?;

    let mut histograms: Vec<Histogram> = Vec::new();
    let mut pending: Option<PendingHistogram> = None;
    for batch in builder.build()? {
        let batch = batch?;
        let cells = CellView::new(&batch)?;
        for row in 0..batch.num_rows() {
            let name = cells.histogram.value(row);
            if pending.as_ref().is_none_or(|current| current.name != name) {
                if let Some(done) = pending.take() {
                    histograms.push(done.finish()?);
                }
                pending = Some(PendingHistogram::start(&cells, row)?);
            }
            if let Some(current) = pending.as_mut() {
                current.contents.push(cells.content.value(row));
                current.sumw2.push(cells.sumw2.value(row));
            }
        }
    }
    if let Some(done) = pending {
        histograms.push(done.finish()?);
    }
    Ok(HistogramArtifact::new(tree, histograms))
}

struct CellView<'a> {
    histogram: &'a StringArray,
    dimension: &'a UInt8Array,
    entries: &'a UInt64Array,
    x_bins: &'a UInt32Array,
    x_low: &'a Float64Array,
    x_high: &'a Float64Array,
    y_bins: &'a UInt32Array,
    y_low: &'a Float64Array,
    y_high: &'a Float64Array,
    content: &'a Float64Array,
    sumw2: &'a Float64Array,
}

impl<'a> CellView<'a> {
    fn new(batch: &'a RecordBatch) -> Result<Self, ParquetTreeError> {
        Ok(Self {
            histogram: column(batch, "histogram")?,
            dimension: column(batch, "dimension")?,
            entries: column(batch, "entries")?,
            x_bins: column(batch, "x_bins")?,
            x_low: column(batch, "x_low")?,
            x_high: column(batch, "x_high")?,
            y_bins: column(batch, "y_bins")?,
            y_low: column(batch, "y_low")?,
            y_high: column(batch, "y_high")?,
            content: column(batch, "content")?,
            sumw2: column(batch, "sumw2")?,
        })
    }
}

fn column<'a, T: Array + 'static>(
    batch: &'a RecordBatch,
    name: &'static str,
) -> Result<&'a T, ParquetTreeError> {
    let array = batch
        .column_by_name(name)
        .ok_or(ParquetTreeError::ArtifactColumn {
            column: name,
            actual: None,
        })?;
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| ParquetTreeError::ArtifactColumn {
            column: name,
            actual: Some(array.data_type().clone()),
        })
}

struct PendingHistogram {
    name: String,
    x: Axis,
    y: Option<Axis>,
    entries: u64,
    contents: Vec<f64>,
    sumw2: Vec<f64>,
}

impl PendingHistogram {
    fn start(cells: &CellView<'_>, row: usize) -> Result<Self, ParquetTreeError> {
        let name = cells.histogram.value(row).to_owned();
        let invalid = |reason: String| ParquetTreeError::InvalidArtifact {
            reason: format!("histogram `{name}`: {reason}"),
        };
        let x = Axis::new(
            cells.x_bins.value(row),
            cells.x_low.value(row),
            cells.x_high.value(row),
        )
        .map_err(|err| invalid(err.to_string()))?;
        let y = match cells.dimension.value(row) {
            1 => None,
            2 if cells.y_bins.is_valid(row) => Some(
                Axis::new(
                    cells.y_bins.value(row),
                    cells.y_low.value(row),
                    cells.y_high.value(row),
                )
                .map_err(|err| invalid(err.to_string()))?,
            ),
            2 => return Err(invalid("2-D cell without a y axis".to_owned())),
            other => return Err(invalid(format!("unsupported dimension {other}"))),
        };
        Ok(Self {
            name,
            x,
            y,
            entries: cells.entries.value(row),
            contents: Vec::new(),
            sumw2: Vec::new(),
        })
    }

    fn finish(self) -> Result<Histogram, ParquetTreeError> {
        Histogram::from_parts(self.name, self.x, self.y, self.contents, self.sumw2, self.entries)
            .map_err(|err| ParquetTreeError::InvalidArtifact {
                reason: err.to_string(),
            })
    }
}
