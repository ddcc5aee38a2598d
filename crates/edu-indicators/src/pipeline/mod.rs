//! Pipeline module.
//!
//! Orchestrates a run: load, filter, expand, merge, compute counts,
//! validate and persist.

mod builder;
pub mod progress;
mod result;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
pub use result::{PipelineResult, RunSummary, SourceBundle, SourceSummary};
