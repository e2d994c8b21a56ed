//! Parquet storage for treedraw: trees are read from struct columns and
//! histogram artifacts are written as one row per cell.

mod artifact;
mod errors;
mod provider;
mod schema;

pub use artifact::{ParquetArtifactWriter, TREE_METADATA_KEY, read_artifact};
pub use errors::ParquetTreeError;
pub use provider::{DEFAULT_BATCH_SIZE, ParquetOpener, ParquetTreeFile};

#[cfg(test)]
mod tests;
