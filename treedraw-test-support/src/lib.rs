//! Shared test utilities used across treedraw crates.

pub mod fixtures;
pub mod proptest_profile;
pub mod tracing;
