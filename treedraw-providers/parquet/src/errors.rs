use arrow_schema::{ArrowError, DataType};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParquetTreeError {
    #[error("tree `{tree}` not found in Parquet schema")]
    TreeNotFound { tree: String },
    #[error("column `{column}` must be a Struct to be read as a tree but found {actual:?}")]
    NotATree { column: String, actual: DataType },
    #[error("branch `{branch}` not found in tree `{tree}`")]
    BranchNotFound { tree: String, branch: String },
    #[error("branch `{branch}` of tree `{tree}` has non-numeric type {actual:?}")]
    UnsupportedBranchType {
        tree: String,
        branch: String,
        actual: DataType,
    },
    #[error("artifact column `{column}` is missing or has type {actual:?}")]
    ArtifactColumn {
        column: &'static str,
        actual: Option<DataType>,
    },
    #[error("invalid artifact: {reason}")]
    InvalidArtifact { reason: String },
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to move artifact into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}
