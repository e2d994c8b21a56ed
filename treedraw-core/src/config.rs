//! Sectioned job configuration files.
//!
//! ```text
//! # output
//! out.parquet
//!
//! # inputs
//! run1.parquet
//! run2.parquet
//!
//! # optional tree name, then histograms
//! events
//! px=px
//! pxpy=px:py if e > 1
//! ```
//!
//! Blank lines separate the output, input and histogram sections. `#` starts a
//! comment. Inside the histogram section blank lines are ignored, and a single
//! line without `=` before the first histogram names the tree.

use std::{fs, path::Path};

use tracing::instrument;

use crate::{
    Result,
    error::{ConfigurationError, IoError},
    job::{Job, JobBuilder},
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Section {
    Start,
    Output,
    AfterOutput,
    Inputs,
    Histograms,
}

impl Job {
    /// Reads and parses a configuration file.
    ///
    /// # Errors
    /// Returns [`IoError::ConfigRead`] when the file cannot be read,
    /// [`ConfigurationError::ConfigSyntax`] when the section layout is wrong,
    /// and any error of [`JobBuilder::build`].
    #[instrument(name = "job.from_config_file", err, skip(path), fields(path = %path.display()))]
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| IoError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_config_str(&text, path)
    }

    /// Parses configuration text; `path` is only used in diagnostics.
    ///
    /// # Errors
    /// As for [`Job::from_config_file`], minus the read failure.
    ///
    /// # Examples
    /// ```
    /// use std::path::Path;
    /// use treedraw_core::Job;
    ///
    /// let text = "out.parquet\n\nrun1.parquet\n\nevents\npx=px # transverse\n";
    /// let job = Job::from_config_str(text, Path::new("job.cfg"))?;
    /// assert_eq!(job.tree(), Some("events"));
    /// assert_eq!(job.specs()[0].x().source(), "px");
    /// # Ok::<(), treedraw_core::JobError>(())
    /// ```
    pub fn from_config_str(text: &str, path: &Path) -> Result<Self> {
        let syntax = |line: usize, reason: &str| ConfigurationError::ConfigSyntax {
            path: path.to_path_buf(),
            line,
            reason: reason.to_owned(),
        };

        let mut section = Section::Start;
        let mut builder = JobBuilder::new();
        let mut tree: Option<String> = None;
        let mut histograms = 0_usize;
        let mut last_line = 0_usize;

        for (index, raw) in text.lines().enumerate() {
            let number = index + 1;
            last_line = number;
            let trimmed = raw.trim();
            if trimmed.starts_with('#') {
                continue;
            }
            let line = trimmed.split_once('#').map_or(trimmed, |(head, _)| head).trim();

            if line.is_empty() {
                section = match section {
                    Section::Output => Section::AfterOutput,
                    Section::Inputs => Section::Histograms,
                    other => other,
                };
                continue;
            }

            section = match section {
                Section::Start => {
                    builder = builder.with_output(line);
                    Section::Output
                }
                Section::Output => {
                    return Err(syntax(
                        number,
                        "the output section holds exactly one path; separate the inputs with a blank line",
                    )
                    .into());
                }
                Section::AfterOutput | Section::Inputs => {
                    builder = builder.with_input(line);
                    Section::Inputs
                }
                Section::Histograms if !line.contains('=') => {
                    if tree.is_some() {
                        return Err(syntax(number, "only one tree name line is allowed").into());
                    }
                    if histograms > 0 {
                        return Err(
                            syntax(number, "the tree name must precede the histogram lines").into(),
                        );
                    }
                    tree = Some(line.to_owned());
                    Section::Histograms
                }
                Section::Histograms => {
                    histograms += 1;
                    builder = builder.with_histogram(line);
                    Section::Histograms
                }
            };
        }

        let eof = last_line.max(1);
        match section {
            Section::Start => return Err(syntax(eof, "missing output section").into()),
            Section::Output | Section::AfterOutput => {
                return Err(syntax(eof, "missing inputs section").into());
            }
            Section::Inputs => return Err(syntax(eof, "missing histogram section").into()),
            Section::Histograms if tree.is_none() && histograms == 0 => {
                return Err(syntax(eof, "missing histogram section").into());
            }
            Section::Histograms => {}
        }

        if let Some(tree) = tree {
            builder = builder.with_tree(tree);
        }
        builder.build()
    }
}
