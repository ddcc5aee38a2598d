//! Row filters restricting each source to the target region and networks.

use crate::config::FilterConfig;
use crate::sources::SourceKind;
use crate::types::{SourceEnrollmentRecord, SourceIndexRecord, SourceRateRecord};
use crate::utils::canonical_code;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Kept/dropped counts of one filter pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub source: SourceKind,
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped_rows: usize,
}

/// Applies the configured region and network predicates.
pub struct RowFilter<'a> {
    config: &'a FilterConfig,
    excluded_codes: Vec<String>,
}

impl<'a> RowFilter<'a> {
    pub fn new(config: &'a FilterConfig) -> Self {
        let excluded_codes = config
            .excluded_dependency_codes
            .iter()
            .map(|code| canonical_code(code))
            .collect();
        Self {
            config,
            excluded_codes,
        }
    }

    fn in_region(&self, region: &str) -> bool {
        region.trim() == self.config.target_region.trim()
    }

    /// Target region, excluding the aggregate public network.
    pub fn keeps_index(&self, record: &SourceIndexRecord) -> bool {
        self.in_region(&record.region)
            && record.network.trim() != self.config.excluded_index_network.trim()
    }

    /// Target region, excluding federal and private schools.
    pub fn keeps_enrollment(&self, record: &SourceEnrollmentRecord) -> bool {
        self.in_region(&record.region)
            && !self
                .excluded_codes
                .iter()
                .any(|code| *code == record.dependency_code)
    }

    /// Target region, state or municipal network, all locations combined.
    pub fn keeps_rate(&self, record: &SourceRateRecord) -> bool {
        self.in_region(&record.region)
            && self
                .config
                .rate_networks
                .iter()
                .any(|network| network.trim() == record.network.trim())
            && record.category.trim() == self.config.rate_category.trim()
    }

    pub fn filter_index(&self, records: Vec<SourceIndexRecord>) -> (Vec<SourceIndexRecord>, FilterStats) {
        apply(SourceKind::Index, records, |r| self.keeps_index(r))
    }

    pub fn filter_enrollment(
        &self,
        records: Vec<SourceEnrollmentRecord>,
    ) -> (Vec<SourceEnrollmentRecord>, FilterStats) {
        apply(SourceKind::Enrollment, records, |r| self.keeps_enrollment(r))
    }

    pub fn filter_rates(&self, records: Vec<SourceRateRecord>) -> (Vec<SourceRateRecord>, FilterStats) {
        apply(SourceKind::Rates, records, |r| self.keeps_rate(r))
    }
}

fn apply<T>(source: SourceKind, records: Vec<T>, keep: impl Fn(&T) -> bool) -> (Vec<T>, FilterStats) {
    let input_rows = records.len();
    let kept: Vec<T> = records.into_iter().filter(|r| keep(r)).collect();
    let stats = FilterStats {
        source,
        input_rows,
        kept_rows: kept.len(),
        dropped_rows: input_rows - kept.len(),
    };
    debug!(
        "{} filter: kept {} of {} rows ({} dropped)",
        source, stats.kept_rows, stats.input_rows, stats.dropped_rows
    );
    (kept, stats)
}
