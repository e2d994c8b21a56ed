//! Error types for the treedraw core library.
//!
//! Every failure is either a [`ConfigurationError`] (the job description is
//! invalid, ambiguous or contradictory) or an [`IoError`] (a file could not be
//! read or written). [`JobError`] wraps both so callers can branch on
//! [`ErrorKind`] and report a stable machine-readable code.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

use crate::expr::ExpressionError;

/// Boxed error raised by a storage backend.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

macro_rules! define_error_codes {
    (
        $(#[$enum_meta:meta])*
        enum $CodeTy:ident for $ErrTy:ident {
            $(
                $(#[$variant_meta:meta])*
                $CodeVariant:ident => $ErrVariant:ident $( { $($pattern:tt)* } )? => $code:expr
            ),+ $(,)?
        }
    ) => {
        $(#[$enum_meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
        #[non_exhaustive]
        pub enum $CodeTy {
            $(
                $(#[$variant_meta])*
                $CodeVariant,
            )+
        }

        impl $CodeTy {
            /// Return the stable machine-readable representation of this error code.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$CodeVariant => $code,)+
                }
            }
        }

        impl fmt::Display for $CodeTy {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $ErrTy {
            #[doc = concat!(
                "Retrieve the stable [`",
                stringify!($CodeTy),
                "`] for this error."
            )]
            pub const fn code(&self) -> $CodeTy {
                match self {
                    $(Self::$ErrVariant $( { $($pattern)* } )? => $CodeTy::$CodeVariant,)+
                }
            }
        }
    };
}

/// Reasons a textual histogram spec failed to parse.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SpecDefect {
    /// The spec has no `=` separating the name from the expression.
    #[error("missing `=` between name and expression")]
    MissingEquals,
    /// Nothing precedes the `=`.
    #[error("no histogram name before `=`")]
    EmptyName,
    /// The name contains whitespace.
    #[error("histogram name `{name}` contains whitespace")]
    InvalidName {
        /// Offending name.
        name: String,
    },
    /// Nothing follows the `=` (or only a cut does).
    #[error("no expression after `=`")]
    EmptyExpression,
    /// One of the `:`-separated fields is blank.
    #[error("expression field {field} is empty")]
    EmptyField {
        /// One-based field position.
        field: usize,
    },
    /// The `if` keyword is not followed by a cut.
    #[error("`if` is not followed by a cut expression")]
    EmptyCut,
    /// More than two `:`-separated fields were given.
    #[error("{found} expression fields given but at most 2 are supported")]
    TooManyDimensions {
        /// Number of fields found.
        found: usize,
    },
    /// The `(nbins,low,high,...)` suffix on the name is invalid.
    #[error("invalid binning: {reason}")]
    InvalidBinning {
        /// Human-readable explanation.
        reason: String,
    },
}

/// The job description is invalid, ambiguous or contradictory.
#[non_exhaustive]
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigurationError {
    /// A configuration file and explicit job arguments were both supplied.
    #[error("both a configuration file and explicit job options were provided")]
    ConflictingSources,
    /// No output path was given.
    #[error("no output path was provided")]
    MissingOutput,
    /// No input files were given.
    #[error("no input files were provided")]
    NoInputFiles,
    /// No histogram specs were given.
    #[error("no histogram expressions were provided")]
    NoHistograms,
    /// A histogram spec is syntactically malformed.
    #[error("malformed histogram spec `{spec}`: {defect}")]
    MalformedSpec {
        /// Raw spec text.
        spec: String,
        /// What is wrong with it.
        defect: SpecDefect,
    },
    /// An expression or cut failed to parse.
    #[error("invalid expression `{expression}`: {source}")]
    InvalidExpression {
        /// Raw expression text.
        expression: String,
        /// Parser diagnostic.
        #[source]
        source: ExpressionError,
    },
    /// Two histogram specs share a name.
    #[error("histogram name `{name}` is used more than once")]
    DuplicateHistogram {
        /// Repeated name.
        name: String,
    },
    /// No tree name was given and the first input holds no tree.
    #[error("no tree name given and `{file}` contains no tree")]
    NoTree {
        /// First input file.
        file: PathBuf,
    },
    /// No tree name was given and the first input holds several trees.
    #[error("no tree name given and `{file}` contains several trees: {}", candidates.join(", "))]
    AmbiguousTree {
        /// First input file.
        file: PathBuf,
        /// Trees found in that file.
        candidates: Vec<String>,
    },
    /// An input file does not contain the requested tree.
    #[error("tree `{tree}` not found in `{file}`")]
    TreeNotFound {
        /// Requested tree.
        tree: String,
        /// File that lacks it.
        file: PathBuf,
    },
    /// An expression references a branch the tree does not have.
    #[error("branch `{branch}` not found in tree `{tree}` of `{file}`")]
    UnknownBranch {
        /// Missing branch.
        branch: String,
        /// Tree that was searched.
        tree: String,
        /// File that lacks it.
        file: PathBuf,
    },
    /// A configuration file violates the sectioned format.
    #[error("{}:{line}: {reason}", path.display())]
    ConfigSyntax {
        /// Configuration file.
        path: PathBuf,
        /// One-based line number.
        line: usize,
        /// Human-readable explanation.
        reason: String,
    },
}

define_error_codes! {
    /// Stable codes describing [`ConfigurationError`] variants.
    enum ConfigurationErrorCode for ConfigurationError {
        /// A configuration file and explicit job arguments were both supplied.
        ConflictingSources => ConflictingSources => "CONFIG_CONFLICTING_SOURCES",
        /// No output path was given.
        MissingOutput => MissingOutput => "CONFIG_MISSING_OUTPUT",
        /// No input files were given.
        NoInputFiles => NoInputFiles => "CONFIG_NO_INPUT_FILES",
        /// No histogram specs were given.
        NoHistograms => NoHistograms => "CONFIG_NO_HISTOGRAMS",
        /// A histogram spec is syntactically malformed.
        MalformedSpec => MalformedSpec { .. } => "CONFIG_MALFORMED_SPEC",
        /// An expression or cut failed to parse.
        InvalidExpression => InvalidExpression { .. } => "CONFIG_INVALID_EXPRESSION",
        /// Two histogram specs share a name.
        DuplicateHistogram => DuplicateHistogram { .. } => "CONFIG_DUPLICATE_HISTOGRAM",
        /// The first input holds no tree.
        NoTree => NoTree { .. } => "CONFIG_NO_TREE",
        /// The first input holds several trees.
        AmbiguousTree => AmbiguousTree { .. } => "CONFIG_AMBIGUOUS_TREE",
        /// An input file does not contain the requested tree.
        TreeNotFound => TreeNotFound { .. } => "CONFIG_TREE_NOT_FOUND",
        /// An expression references a missing branch.
        UnknownBranch => UnknownBranch { .. } => "CONFIG_UNKNOWN_BRANCH",
        /// A configuration file violates the sectioned format.
        ConfigSyntax => ConfigSyntax { .. } => "CONFIG_SYNTAX",
    }
}

/// A file could not be read or written.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum IoError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file `{}`: {source}", path.display())]
    ConfigRead {
        /// Configuration file.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// An input file could not be opened as a data file.
    #[error("failed to open input `{}`: {source}", path.display())]
    InputOpen {
        /// Input file.
        path: PathBuf,
        /// Backend error.
        #[source]
        source: BoxError,
    },
    /// Reading records from an input file failed mid-scan.
    #[error("failed to read tree `{tree}` from `{}`: {source}", path.display())]
    InputRead {
        /// Input file.
        path: PathBuf,
        /// Tree being scanned.
        tree: String,
        /// Backend error.
        #[source]
        source: BoxError,
    },
    /// The directory that should hold the output does not exist.
    #[error("output directory `{}` does not exist", path.display())]
    OutputDirectory {
        /// Missing directory.
        path: PathBuf,
    },
    /// Writing the output artifact failed.
    #[error("failed to write output `{}`: {source}", path.display())]
    OutputWrite {
        /// Output path.
        path: PathBuf,
        /// Backend error.
        #[source]
        source: BoxError,
    },
}

define_error_codes! {
    /// Stable codes describing [`IoError`] variants.
    enum IoErrorCode for IoError {
        /// The configuration file could not be read.
        ConfigRead => ConfigRead { .. } => "IO_CONFIG_READ",
        /// An input file could not be opened.
        InputOpen => InputOpen { .. } => "IO_INPUT_OPEN",
        /// Reading records failed mid-scan.
        InputRead => InputRead { .. } => "IO_INPUT_READ",
        /// The output directory does not exist.
        OutputDirectory => OutputDirectory { .. } => "IO_OUTPUT_DIRECTORY",
        /// Writing the output artifact failed.
        OutputWrite => OutputWrite { .. } => "IO_OUTPUT_WRITE",
    }
}

/// Coarse classification of a [`JobError`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorKind {
    /// See [`ConfigurationError`].
    Configuration,
    /// See [`IoError`].
    Io,
}

/// Error returned by job construction, validation and execution.
#[derive(Debug, Error)]
pub enum JobError {
    /// The job description is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A file could not be read or written.
    #[error(transparent)]
    Io(#[from] IoError),
}

impl JobError {
    /// Returns whether this is a configuration or an I/O failure.
    ///
    /// # Examples
    /// ```
    /// use treedraw_core::{ConfigurationError, ErrorKind, JobError};
    ///
    /// let err = JobError::from(ConfigurationError::NoInputFiles);
    /// assert_eq!(err.kind(), ErrorKind::Configuration);
    /// assert_eq!(err.code(), "CONFIG_NO_INPUT_FILES");
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Returns the stable code of the wrapped error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Configuration(err) => err.code().as_str(),
            Self::Io(err) => err.code().as_str(),
        }
    }
}

/// Convenient alias for results returned by the core API.
pub type Result<T> = core::result::Result<T, JobError>;
