//! Main consolidation pipeline.
//!
//! This module provides the `Pipeline` struct and its builder.

use crate::config::{ConfigValidationError, PipelineConfig};
use crate::error::Result;
use crate::filter::RowFilter;
use crate::merge;
use crate::metrics;
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::pipeline::result::{PipelineResult, RunSummary, SourceBundle};
use crate::reporting::ReportGenerator;
use crate::reshape;
use crate::sources::{self, SourceKind};
use crate::types::{EnrollmentRow, FactRow, SourceIndexRecord};
use crate::validation::ValidationReport;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The consolidation pipeline.
///
/// Use [`Pipeline::builder()`] to create a pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::{Pipeline, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .target_region("ES")
///     .output_dir("database")
///     .build()?;
///
/// let result = Pipeline::builder()
///     .config(config)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run()?;
///
/// println!("{} fact rows", result.facts.len());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    reporter: ReportGenerator,
}

// Hosts may move a configured pipeline onto a worker thread.
static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Load the three configured sources and consolidate them.
    ///
    /// # Errors
    ///
    /// Missing files, sheets or columns are fatal and name the source.
    /// Cell-level parse problems never fail a run.
    pub fn run(&self) -> Result<PipelineResult> {
        self.finish(self.run_internal())
    }

    /// Consolidate sources that are already in memory.
    ///
    /// Outputs are still written when `save_to_disk` is set.
    pub fn consolidate(&self, sources: SourceBundle) -> Result<PipelineResult> {
        let start_time = Instant::now();
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting consolidation...",
        ));
        self.finish(self.consolidate_internal(sources, start_time))
    }

    fn finish(&self, outcome: Result<PipelineResult>) -> Result<PipelineResult> {
        match outcome {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed: {} fact rows",
                    result.facts.len()
                )));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self) -> Result<PipelineResult> {
        let start_time = Instant::now();

        info!("Starting consolidation pipeline...");
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Initializing,
            0.0,
            "Starting consolidation pipeline...",
        ));

        // Step 1: Load sources
        info!("Step 1: Loading sources...");
        let kinds = [SourceKind::Index, SourceKind::Enrollment, SourceKind::Rates];
        let total = kinds.len();
        let mut loaded = 0;
        let mut announce = |kind: SourceKind| {
            loaded += 1;
            self.report_progress(ProgressUpdate::with_items(
                PipelineStage::LoadingSources,
                format!("Source: {}", kind),
                loaded,
                total,
                format!("Loaded {} source", kind),
            ));
        };

        let index = sources::index::load(&self.config.index)?;
        announce(SourceKind::Index);
        let enrollment = sources::enrollment::load(&self.config.enrollment)?;
        announce(SourceKind::Enrollment);
        let rates = sources::rates::load(&self.config.rates)?;
        announce(SourceKind::Rates);

        info!(
            "Loaded {} index rows, {} enrollment rows, {} rate rows",
            index.records.len(),
            enrollment.records.len(),
            rates.records.len()
        );

        self.consolidate_internal(
            SourceBundle {
                index,
                enrollment,
                rates,
            },
            start_time,
        )
    }

    fn consolidate_internal(&self, sources: SourceBundle, start_time: Instant) -> Result<PipelineResult> {
        let mut summary = RunSummary::default();
        summary.record_sources(&sources);
        let SourceBundle {
            index,
            enrollment,
            rates,
        } = sources;

        // Step 2: Filter
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Filtering,
            0.0,
            format!("Filtering to region {}...", self.config.filters.target_region),
        ));
        info!("Step 2: Filtering rows...");
        let filter = RowFilter::new(&self.config.filters);
        let (index, index_stats) = filter.filter_index(index.records);
        let (enrollment, enrollment_stats) = filter.filter_enrollment(enrollment.records);
        let (rates, rate_stats) = filter.filter_rates(rates.records);
        summary.filters = vec![index_stats, enrollment_stats, rate_stats];
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Filtering,
            1.0,
            "Filtering complete",
        ));

        // Step 3: Expand to one row per grade
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Reshaping,
            0.0,
            "Expanding grade columns...",
        ));
        info!("Step 3: Expanding grade columns...");
        let enrollment_rows = reshape::expand_enrollment(&enrollment);
        let rate_rows = reshape::expand_rates(&rates);
        let index_rows = reshape::expand_index(&index);
        summary.enrollment_rows = enrollment_rows.len();
        summary.rate_rows = rate_rows.len();
        summary.index_rows = index_rows.len();
        debug!(
            "Long rows: {} enrollment, {} rates, {} index",
            enrollment_rows.len(),
            rate_rows.len(),
            index_rows.len()
        );
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Reshaping,
            1.0,
            "Grade expansion complete",
        ));

        // Step 4: Join rates and index values onto enrollment
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Merging,
            0.0,
            "Merging sources...",
        ));
        info!("Step 4: Merging sources...");
        let (mut facts, merge_stats) = merge::consolidate(&enrollment_rows, &rate_rows, &index_rows);
        summary.merge = merge_stats;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Merging,
            1.0,
            format!("Merged into {} fact rows", facts.len()),
        ));

        // Step 5: Absolute counts
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Metrics,
            0.0,
            "Computing absolute counts...",
        ));
        info!("Step 5: Computing absolute counts...");
        metrics::apply_absolute_counts(&mut facts);
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Metrics,
            1.0,
            "Absolute counts complete",
        ));

        // Step 6: Validation
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Validation,
            0.0,
            "Validating fact table...",
        ));
        info!("Step 6: Validating fact table...");
        let validation = ValidationReport::from_facts(&facts, &summary.merge);
        validation.log();
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Validation,
            1.0,
            format!("{} warnings", validation.warnings.len()),
        ));

        // Step 7: Persist
        if self.config.save_to_disk {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Persisting,
                0.0,
                format!("Writing outputs to {}...", self.reporter.output_dir().display()),
            ));
            info!("Step 7: Writing outputs...");
            summary.outputs = self.persist(&facts, &enrollment_rows, &index)?;
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Persisting,
                1.0,
                format!("Wrote {} files", summary.outputs.len()),
            ));
        } else {
            info!("Step 7: Skipping outputs (save_to_disk disabled)");
        }

        summary.duration_ms = start_time.elapsed().as_millis() as u64;
        info!("Pipeline finished in {} ms", summary.duration_ms);

        Ok(PipelineResult {
            facts,
            enrollment: enrollment_rows,
            index,
            summary,
            validation,
        })
    }

    fn persist(
        &self,
        facts: &[FactRow],
        enrollment_rows: &[EnrollmentRow],
        index: &[SourceIndexRecord],
    ) -> Result<Vec<PathBuf>> {
        let include_index = self.config.include_index_columns;
        let mut outputs = vec![
            self.reporter.write_fact_table(facts, include_index)?,
            self.reporter.write_enrollment_aggregate(enrollment_rows)?,
            self.reporter.write_index_aggregate(index)?,
        ];
        if self.config.write_schema_metadata {
            outputs.push(self.reporter.write_schema_metadata(include_index)?);
        }
        Ok(outputs)
    }

    /// Write the JSON run report for a finished run.
    pub fn write_run_report(&self, result: &PipelineResult) -> Result<PathBuf> {
        let report = ReportGenerator::build_run_report(result);
        self.reporter.write_run_report(&report)
    }
}

/// Builder for creating a configured [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a closure to receive progress updates.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reporter = ReportGenerator::new(config.output_dir.clone(), config.output_names.clone());

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
            reporter,
        })
    }
}
