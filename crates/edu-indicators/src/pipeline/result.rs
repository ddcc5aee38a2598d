//! Result types returned by a pipeline run.

use crate::filter::FilterStats;
use crate::merge::MergeStats;
use crate::sources::{LoadedSource, SourceKind};
use crate::types::{
    EnrollmentRow, FactRow, SourceEnrollmentRecord, SourceIndexRecord, SourceRateRecord,
};
use crate::validation::ValidationReport;
use serde::Serialize;
use std::path::PathBuf;

/// The three typed sources a run consolidates.
#[derive(Debug, Clone)]
pub struct SourceBundle {
    pub index: LoadedSource<SourceIndexRecord>,
    pub enrollment: LoadedSource<SourceEnrollmentRecord>,
    pub rates: LoadedSource<SourceRateRecord>,
}

impl SourceBundle {
    /// Bundle records built in memory, e.g. by a host that already parsed them.
    pub fn from_records(
        index: Vec<SourceIndexRecord>,
        enrollment: Vec<SourceEnrollmentRecord>,
        rates: Vec<SourceRateRecord>,
    ) -> Self {
        Self {
            index: LoadedSource::from_records(index),
            enrollment: LoadedSource::from_records(enrollment),
            rates: LoadedSource::from_records(rates),
        }
    }
}

/// What loading one source produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSummary {
    pub source: SourceKind,
    pub raw_rows: usize,
    pub rows_without_code: usize,
    pub coercion_steps: Vec<String>,
}

impl SourceSummary {
    fn of<T>(source: SourceKind, loaded: &LoadedSource<T>) -> Self {
        Self {
            source,
            raw_rows: loaded.raw_rows,
            rows_without_code: loaded.rows_without_code,
            coercion_steps: loaded.coercion_steps.clone(),
        }
    }
}

/// Row counts and timings of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub sources: Vec<SourceSummary>,
    pub filters: Vec<FilterStats>,
    /// Long rows produced by grain expansion.
    pub enrollment_rows: usize,
    pub rate_rows: usize,
    pub index_rows: usize,
    pub merge: MergeStats,
    /// Total execution time in milliseconds.
    pub duration_ms: u64,
    /// Files written by this run, in write order.
    pub outputs: Vec<PathBuf>,
}

impl RunSummary {
    pub(crate) fn record_sources(&mut self, sources: &SourceBundle) {
        self.sources = vec![
            SourceSummary::of(SourceKind::Index, &sources.index),
            SourceSummary::of(SourceKind::Enrollment, &sources.enrollment),
            SourceSummary::of(SourceKind::Rates, &sources.rates),
        ];
    }
}

/// Everything a run produced.
///
/// The tables themselves are skipped when serializing; the run report
/// carries only the summary and validation counts.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// The consolidated fact table, in pipeline order.
    #[serde(skip_serializing)]
    pub facts: Vec<FactRow>,
    /// Enrollment in long form, before the joins.
    #[serde(skip_serializing)]
    pub enrollment: Vec<EnrollmentRow>,
    /// Index records after filtering, one per municipality and network.
    #[serde(skip_serializing)]
    pub index: Vec<SourceIndexRecord>,
    pub summary: RunSummary,
    pub validation: ValidationReport,
}
