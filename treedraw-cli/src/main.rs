//! Entry point for the `treedraw` binary.
//!
//! Parses arguments, runs the histogram job, prints the summary to stdout and
//! maps failures to exit codes: 2 for configuration errors, 1 for everything
//! else. Clap usage errors exit with 2 on their own.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use tracing::{error, field};
use treedraw_cli::{
    cli::{Cli, exit_status, render_summary, run_cli},
    logging::{self, LoggingError},
};
use treedraw_core::JobError;

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let summary = run_cli(cli).context("histogram job failed")?;
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    render_summary(&summary, &mut writer).context("failed to render summary")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }

    if let Err(err) = try_main() {
        let job_error = err.downcast_ref::<JobError>();
        let code_field = job_error.map(|job| field::display(job.code()));
        let message = format!("{err:#}");
        error!(error = %message, code = code_field, "command execution failed");
        return ExitCode::from(exit_status(job_error.map(JobError::kind)));
    }

    ExitCode::SUCCESS
}

#[expect(
    clippy::print_stderr,
    reason = "Emit one-off diagnostic before tracing is initialized"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("failed to initialize logging: {err}");
}
