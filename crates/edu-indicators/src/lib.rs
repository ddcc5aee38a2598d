//! Educational Indicators Consolidation Library
//!
//! Reshapes three municipal education extracts onto one grain,
//! (municipality, network, grade), and serves the result to a presentation
//! layer.
//!
//! # Overview
//!
//! - **Source Loading**: spreadsheet (`calamine`) and delimited (`encoding_rs` + polars)
//!   extracts read as text, restricted to the columns the pipeline needs
//! - **Type Coercion**: sentinels to null, unparsable counts to zero, percentages to fractions
//! - **Row Filter**: target region, state and municipal networks only
//! - **Grain Expansion**: one row per grade for enrollment, rates and index values
//! - **Consolidation**: left joins from enrollment on (municipality code, network, grade)
//! - **Derived Metrics**: absolute approved, retained and dropped-out counts
//! - **Validation & Persistence**: sanity counts, the fact table and two legacy aggregates
//! - **Data Access**: [`DataStore`] and [`FactQuery`] for dashboards and reports
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use edu_indicators::{DataStore, FactQuery, Network, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_json_file("pipeline.json")?;
//! let result = Pipeline::builder()
//!     .config(config.clone())
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run()?;
//!
//! println!("{} fact rows", result.validation.total_rows);
//!
//! let store = DataStore::open(&config.output_dir, &config.output_names)?;
//! let rates = store.performance(&FactQuery::all().with_network(Network::Municipal));
//! println!("Approval: {:.1}%", rates.approval_pct);
//! ```
//!
//! # Grain caveat
//!
//! The index is published per municipality and network for the whole final
//! cycle, not per grade. It is repeated on grades 6 to 9; the schema sidecar
//! written next to the fact table says so.

pub mod access;
pub mod coercion;
pub mod config;
pub mod error;
pub mod filter;
pub mod merge;
pub mod metrics;
pub mod pipeline;
pub mod reporting;
pub mod reshape;
pub mod sources;
pub mod types;
pub mod utils;
pub mod validation;

// Re-exports for convenient access
pub use access::{
    DataStore, EnrollmentRank, FactQuery, IndexRank, MunicipalitySlice, NetworkIndexSummary,
    PerformanceRates, RegionOfficeEnrollment, SummaryStats,
};
pub use coercion::{ColumnCoercion, TypeCoercer};
pub use config::{
    ConfigValidationError, FilterConfig, OutputNames, PipelineConfig, PipelineConfigBuilder,
    SourceConfig,
};
pub use error::{PipelineError, ResultExt};
pub use filter::{FilterStats, RowFilter};
pub use merge::MergeStats;
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineResult, PipelineStage,
    ProgressReporter, ProgressUpdate, RunSummary, SourceBundle, SourceSummary,
};
pub use reporting::{ReportGenerator, RunReport, SchemaMetadata};
pub use sources::{LoadedSource, SourceKind};
pub use types::{
    EnrollmentRow, FactRow, Grade, GradeRates, GrainKey, IndexRow, MunicipalityOffice, Network,
    RateRow, SourceEnrollmentRecord, SourceIndexRecord, SourceRateRecord,
};
pub use utils::format_number;
pub use validation::ValidationReport;
