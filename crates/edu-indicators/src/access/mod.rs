//! Read-side access to the consolidated outputs.
//!
//! A presentation layer builds one [`DataStore`] per process, from the
//! output directory of a run or straight from a [`crate::PipelineResult`],
//! and passes it by reference. Every report takes an immutable
//! [`FactQuery`]:
//!
//! - performance views read the fact table
//! - enrollment views read the enrollment aggregate
//! - index views read the index aggregate and ignore the grade filter

mod query;
mod reports;
mod store;

pub use query::FactQuery;
pub use reports::{
    EnrollmentRank, IndexRank, MunicipalitySlice, NetworkIndexSummary, PerformanceRates,
    RegionOfficeEnrollment, SummaryStats,
};
pub use store::{CITIES_FILE, DataStore};
