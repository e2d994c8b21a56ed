//! Treedraw core library.
//!
//! Builds a [`Job`] from explicit fields or a configuration file, validates it
//! against the inputs with [`BatchHistogramRunner`], and fills every requested
//! histogram in a single pass over the tree.
#![cfg_attr(docsrs, feature(doc_cfg))]

mod config;
mod error;
mod fill;
mod histogram;
mod job;
mod runner;
mod source;
mod spec;

pub mod expr;
pub mod memory;

pub use crate::{
    error::{
        BoxError, ConfigurationError, ConfigurationErrorCode, ErrorKind, IoError, IoErrorCode,
        JobError, Result, SpecDefect,
    },
    histogram::{
        AUTO_RANGE_BUFFER, Axis, AxisError, Binning, DEFAULT_BINS_1D, DEFAULT_BINS_2D, Histogram,
        HistogramFiller, MAX_CELLS, ShapeMismatch,
    },
    job::{Job, JobBuilder},
    runner::{
        BatchHistogramRunner, HistogramSummary, RunSummary, RunnerState, ValidatedRunner, run_job,
    },
    source::{HistogramArtifact, HistogramSink, TreeInfo, TreeOpener, TreeSource},
    spec::HistogramSpec,
};
