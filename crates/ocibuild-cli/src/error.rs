//! CLI-specific error types with exit-code mapping.

use miette::Diagnostic;
use thiserror::Error;

/// Successful exit.
pub const EXIT_OK: i32 = 0;
/// Malformed arguments or an invalid build target.
pub const EXIT_USAGE: i32 = 2;
/// The build itself failed (registry, cache, I/O, or engine error).
pub const EXIT_BUILD: i32 = 3;

/// CLI-layer errors, distinct from [`ocibuild_build::Error`] so argument
/// parsing mistakes are reported with a different exit code than build
/// failures.
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// A command-line argument was well-formed but semantically invalid,
    /// e.g. a `--tag` given to `save`.
    #[error("{message}")]
    #[diagnostic(code(ocibuild::cli::usage))]
    Usage {
        /// Description of the invalid usage.
        message: String,
    },

    /// The build engine itself failed.
    #[error(transparent)]
    #[diagnostic(code(ocibuild::cli::build))]
    Build(#[from] ocibuild_build::Error),
}

impl CliError {
    /// Build a [`CliError::Usage`].
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    /// The process exit code this error should produce.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Usage { .. } => EXIT_USAGE,
            Self::Build(_) => EXIT_BUILD,
        }
    }
}
