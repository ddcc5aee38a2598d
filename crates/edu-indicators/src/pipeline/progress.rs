//! Progress reporting for the consolidation pipeline.
//!
//! A run is a short batch job, but loading the workbooks dominates its
//! duration, so hosts that show a progress bar get one update per stage
//! and one per source while loading.
//!
//! # Example
//!
//! ```rust,ignore
//! use edu_indicators::Pipeline;
//!
//! let result = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the consolidation pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Validating configuration and preparing the run
    Initializing,
    /// Reading and coercing the three source extracts
    LoadingSources,
    /// Restricting sources to the target region and networks
    Filtering,
    /// Expanding wide per-grade columns into long rows
    Reshaping,
    /// Joining rates and index values onto enrollment
    Merging,
    /// Computing absolute counts
    Metrics,
    /// Counting suspicious rows
    Validation,
    /// Writing the fact table and aggregates
    Persisting,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::LoadingSources => "Loading Sources",
            Self::Filtering => "Filtering Rows",
            Self::Reshaping => "Expanding Grades",
            Self::Merging => "Merging Sources",
            Self::Metrics => "Computing Metrics",
            Self::Validation => "Validating Output",
            Self::Persisting => "Writing Outputs",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall run (0.0 - 1.0).
    ///
    /// Weights of the non-terminal stages sum to 1.0.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.02,
            Self::LoadingSources => 0.40,
            Self::Filtering => 0.05,
            Self::Reshaping => 0.10,
            Self::Merging => 0.10,
            Self::Metrics => 0.03,
            Self::Validation => 0.05,
            Self::Persisting => 0.25,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::LoadingSources => 0.02,
            Self::Filtering => 0.42,
            Self::Reshaping => 0.47,
            Self::Merging => 0.57,
            Self::Metrics => 0.67,
            Self::Validation => 0.70,
            Self::Persisting => 0.75,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// Progress update with optional sub-stage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,

    /// Optional sub-stage description (e.g., "Source: rates")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_stage: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage without sub-stage info.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            sub_stage: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Creates a new progress update with sub-stage information.
    pub fn with_sub_stage(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        stage_progress: f32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sub_stage: Some(sub_stage.into()),
            ..Self::new(stage, stage_progress, message)
        }
    }

    /// Creates a new progress update with item counts.
    pub fn with_items(
        stage: PipelineStage,
        sub_stage: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::with_sub_stage(stage, sub_stage, stage_progress, message)
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Complete, 1.0, message)
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(PipelineStage::Failed, 0.0, message)
    }
}

/// Receives progress updates during a run.
///
/// Implementations must be `Send + Sync` so a host can run the pipeline on
/// a worker thread and forward updates elsewhere.
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::{ProgressReporter, ProgressUpdate};
///
/// struct JsonLinesReporter;
///
/// impl ProgressReporter for JsonLinesReporter {
///     fn report(&self, update: ProgressUpdate) {
///         if let Ok(line) = serde_json::to_string(&update) {
///             eprintln!("{}", line);
///         }
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called at the start and end of each stage, and once per loaded source.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}
