//! Persistence of the consolidated tables.
//!
//! Outputs of a run, all written to the configured output directory:
//! - the fact table (one row per municipality, network and grade)
//! - the enrollment and index aggregates kept for older consumers
//! - a schema sidecar describing the fact table
//! - an optional JSON run report (`--emit-report`)
//!
//! Tables are `;`-delimited UTF-8 with a header row; nulls are empty fields.
//!
//! # Example
//!
//! ```rust,ignore
//! use edu_indicators::reporting::ReportGenerator;
//!
//! let generator = ReportGenerator::new("database", OutputNames::default());
//! generator.write_fact_table(&result.facts, false)?;
//! generator.write_schema_metadata(false)?;
//! ```

pub mod frames;
mod generator;

pub use generator::{ColumnSchema, ReportGenerator, RunReport, SchemaMetadata};
