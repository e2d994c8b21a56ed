//! Support library for the `treedraw` binary.
//!
//! Exposes argument parsing, job execution and logging setup so tests can
//! drive the command pipeline without spawning a process.

pub mod cli;
pub mod logging;
