//! Error types for the step graph and runner.

use miette::Diagnostic;
use thiserror::Error;

/// Error type for step graph construction and execution.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A step declared a dependency on a name that was never added.
    #[error("step {step:?} depends on unknown step {dependency:?}")]
    #[diagnostic(code(ocibuild::graph::unknown_dependency))]
    UnknownDependency {
        /// The step with the dangling dependency.
        step: String,
        /// The missing dependency name.
        dependency: String,
    },

    /// Adding an edge would create a cycle.
    #[error("step graph contains a cycle involving {0:?}")]
    #[diagnostic(code(ocibuild::graph::cycle))]
    Cycle(String),

    /// A step name was registered twice.
    #[error("duplicate step name {0:?}")]
    #[diagnostic(code(ocibuild::graph::duplicate_step))]
    DuplicateStep(String),

    /// A step's function returned an error. Wraps the failing step's name
    /// together with the underlying cause so the orchestrator can report
    /// which step broke the build.
    #[error("step {step:?} failed: {source}")]
    #[diagnostic(code(ocibuild::graph::step_failed))]
    StepFailed {
        /// Name of the step that failed.
        step: String,
        /// Underlying cause.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The build was cancelled before this step ran.
    #[error("build cancelled")]
    #[diagnostic(code(ocibuild::graph::cancelled))]
    Cancelled,
}

impl Error {
    /// Build a [`Error::StepFailed`].
    pub fn step_failed(
        step: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::StepFailed {
            step: step.into(),
            source: Box::new(source),
        }
    }
}

/// Result type for step graph operations.
pub type Result<T> = std::result::Result<T, Error>;
