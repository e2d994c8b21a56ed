pub(crate) use super::{
    ParquetArtifactWriter, ParquetOpener, ParquetTreeError, ParquetTreeFile, read_artifact,
};

mod artifact;
mod provider;
mod support;
