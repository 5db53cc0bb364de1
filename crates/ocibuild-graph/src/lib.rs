//! Declarative step graph and bounded-concurrency async runner.
//!
//! Steps are submitted to a worker pool as soon as their declared upstreams
//! complete; a failing step cancels the rest of the build and its name is
//! attached to the error that bubbles up.

mod cancellation;
mod error;
mod graph;
mod runner;

pub use cancellation::CancellationToken;
pub use error::{Error, Result};
pub use graph::{StepGraph, StepInputs, StepShape};
pub use runner::Runner;
