//! Command-line interface for the treedraw batch histogram filler.
//!
//! A job comes either from a configuration file or from explicit flags,
//! never both. The job runs against Parquet inputs and writes a Parquet
//! histogram artifact.

mod commands;

pub use commands::{
    Cli, ExecutionSummary, JobOrigin, exit_status, job_from_cli, render_summary, run_cli,
};

#[cfg(test)]
mod tests;
