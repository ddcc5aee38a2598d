//! Sanity checks over the consolidated fact table.
//!
//! Nothing here removes rows. Suspicious rows are counted and described in
//! [`ValidationReport::warnings`]; an empty table is reported, not fatal.

use crate::merge::MergeStats;
use crate::types::{FactRow, Grade, Network};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Counts describing the fact table of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_rows: usize,
    /// Distinct municipalities, counted by code.
    pub distinct_municipalities: usize,
    pub networks: Vec<Network>,
    pub grades: Vec<Grade>,
    pub zero_enrollment_rows: usize,
    pub missing_approval_rate_rows: usize,
    pub missing_index_rows: usize,
    pub duplicate_rate_keys: usize,
    pub duplicate_index_keys: usize,
    /// Fact rows sharing a key with an earlier fact row.
    pub duplicate_fact_keys: usize,
    pub is_empty: bool,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Build the report from the fact table and the join statistics.
    pub fn from_facts(facts: &[FactRow], merge: &MergeStats) -> Self {
        let municipalities: HashSet<&str> = facts
            .iter()
            .map(|fact| fact.municipality_code.as_str())
            .collect();
        let networks: BTreeSet<Network> = facts.iter().map(|fact| fact.network).collect();
        let grades: BTreeSet<Grade> = facts.iter().map(|fact| fact.grade).collect();

        let mut keys = HashSet::with_capacity(facts.len());
        let duplicate_fact_keys = facts.iter().filter(|fact| !keys.insert(fact.key())).count();

        let mut report = Self {
            total_rows: facts.len(),
            distinct_municipalities: municipalities.len(),
            networks: networks.into_iter().collect(),
            grades: grades.into_iter().collect(),
            zero_enrollment_rows: facts.iter().filter(|fact| fact.enrollment == 0).count(),
            missing_approval_rate_rows: facts
                .iter()
                .filter(|fact| fact.approval_rate.is_none())
                .count(),
            missing_index_rows: facts
                .iter()
                .filter(|fact| fact.observed_index.is_none())
                .count(),
            duplicate_rate_keys: merge.duplicate_rate_keys,
            duplicate_index_keys: merge.duplicate_index_keys,
            duplicate_fact_keys,
            is_empty: facts.is_empty(),
            warnings: Vec::new(),
        };
        report.warnings = report.collect_warnings();
        report
    }

    fn collect_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.is_empty {
            warnings.push(
                "Fact table is empty: no enrollment rows survived filtering (check the target region and source files)"
                    .to_string(),
            );
            return warnings;
        }
        if self.zero_enrollment_rows > 0 {
            warnings.push(format!(
                "{} rows have zero enrollment",
                self.zero_enrollment_rows
            ));
        }
        if self.missing_approval_rate_rows > 0 {
            warnings.push(format!(
                "{} rows have no approval rate; their absolute counts are 0",
                self.missing_approval_rate_rows
            ));
        }
        if self.duplicate_rate_keys + self.duplicate_index_keys > 0 {
            warnings.push(format!(
                "Duplicate right-side keys ignored: {} rate, {} index",
                self.duplicate_rate_keys, self.duplicate_index_keys
            ));
        }
        if self.duplicate_fact_keys > 0 {
            warnings.push(format!(
                "{} fact rows repeat a (municipality, network, grade) key; several dependency codes map to the same network",
                self.duplicate_fact_keys
            ));
        }
        warnings
    }

    /// Emit the report through `tracing`.
    pub fn log(&self) {
        info!("Fact table: {} rows", self.total_rows);
        info!("Municipalities: {}", self.distinct_municipalities);
        info!("Networks: {:?}", self.networks);
        info!(
            "Grades: {:?}",
            self.grades.iter().map(|g| g.value()).collect::<Vec<_>>()
        );
        info!("Rows with zero enrollment: {}", self.zero_enrollment_rows);
        info!("Rows without approval rate: {}", self.missing_approval_rate_rows);
        info!("Rows without index values: {}", self.missing_index_rows);
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EnrollmentRow;

    fn fact(code: &str, network: Network, grade: Grade, enrollment: i64, approval: Option<f64>) -> FactRow {
        let mut fact = FactRow::from_enrollment(&EnrollmentRow {
            municipality_code: code.into(),
            municipality_name: format!("M{}", code),
            region: "ES".into(),
            network,
            grade,
            enrollment,
        });
        fact.approval_rate = approval;
        fact
    }

    #[test]
    fn test_report_counts() {
        let facts = vec![
            fact("1", Network::Municipal, Grade::SIXTH, 10, Some(0.9)),
            fact("1", Network::Municipal, Grade::SEVENTH, 0, None),
            fact("2", Network::Estadual, Grade::SIXTH, 5, Some(0.8)),
        ];

        let report = ValidationReport::from_facts(&facts, &MergeStats::default());

        assert_eq!(report.total_rows, 3);
        assert_eq!(report.distinct_municipalities, 2);
        assert_eq!(report.networks, vec![Network::Estadual, Network::Municipal]);
        assert_eq!(report.grades, vec![Grade::SIXTH, Grade::SEVENTH]);
        assert_eq!(report.zero_enrollment_rows, 1);
        assert_eq!(report.missing_approval_rate_rows, 1);
        assert_eq!(report.missing_index_rows, 3);
        assert_eq!(report.duplicate_fact_keys, 0);
        assert!(!report.is_empty);
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_empty_table_is_flagged() {
        let report = ValidationReport::from_facts(&[], &MergeStats::default());

        assert!(report.is_empty);
        assert_eq!(report.total_rows, 0);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("empty"));
    }

    #[test]
    fn test_duplicate_fact_keys() {
        let facts = vec![
            fact("1", Network::Municipal, Grade::SIXTH, 10, Some(0.9)),
            fact("1", Network::Municipal, Grade::SIXTH, 3, Some(0.9)),
        ];
        let merge = MergeStats {
            duplicate_rate_keys: 2,
            ..MergeStats::default()
        };

        let report = ValidationReport::from_facts(&facts, &merge);

        assert_eq!(report.duplicate_fact_keys, 1);
        assert_eq!(report.duplicate_rate_keys, 2);
        assert!(report.warnings.iter().any(|w| w.contains("Duplicate right-side keys")));
    }
}
