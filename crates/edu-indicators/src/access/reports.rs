//! Aggregates returned by [`super::DataStore`] queries.

use crate::types::{EnrollmentRow, FactRow, Network, SourceIndexRecord};
use serde::Serialize;

/// Headline numbers for the overview page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    /// Municipalities in the lookup, or in the fact table when no lookup is loaded.
    pub municipality_count: usize,
    pub index_records: usize,
    /// Index records whose observed value reached the target.
    pub above_target_records: usize,
    pub total_enrollment: i64,
    /// Unweighted mean over fact rows that have a rate.
    pub mean_approval_rate: Option<f64>,
    pub mean_dropout_rate: Option<f64>,
    pub networks: Vec<String>,
}

/// Enrollment-weighted outcome percentages of a set of fact rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerformanceRates {
    pub enrollment: i64,
    pub approved: f64,
    pub retained: f64,
    pub dropped_out: f64,
    pub approval_pct: f64,
    pub retention_pct: f64,
    pub dropout_pct: f64,
}

impl PerformanceRates {
    /// `Σ absolute / Σ enrollment × 100`; all percentages are 0 without enrollment.
    pub fn from_facts<'a>(facts: impl IntoIterator<Item = &'a FactRow>) -> Self {
        let mut rates = Self::default();
        for fact in facts {
            rates.enrollment += fact.enrollment;
            rates.approved += fact.approval_count;
            rates.retained += fact.retention_count;
            rates.dropped_out += fact.dropout_count;
        }
        if rates.enrollment > 0 {
            let total = rates.enrollment as f64;
            rates.approval_pct = rates.approved / total * 100.0;
            rates.retention_pct = rates.retained / total * 100.0;
            rates.dropout_pct = rates.dropped_out / total * 100.0;
        }
        rates
    }
}

/// Enrollment of one (municipality, network) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentRank {
    pub municipality_name: String,
    pub network: Network,
    pub enrollment: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionOfficeEnrollment {
    pub region_office: String,
    pub enrollment: i64,
}

/// Index statistics of one network, over records with an observed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkIndexSummary {
    pub network: Network,
    pub records: usize,
    pub mean_observed: f64,
    pub mean_target: Option<f64>,
    pub above_target: usize,
}

impl NetworkIndexSummary {
    pub fn above_target_pct(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.above_target as f64 / self.records as f64 * 100.0
        }
    }

    /// Mean observed minus mean target.
    pub fn gap(&self) -> Option<f64> {
        self.mean_target.map(|target| self.mean_observed - target)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexRank {
    pub municipality_name: String,
    pub network: String,
    pub observed: f64,
    pub target: Option<f64>,
    pub above_target: Option<bool>,
}

/// Every row of one municipality across the three tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MunicipalitySlice {
    pub municipality_code: String,
    pub index: Vec<SourceIndexRecord>,
    pub enrollment: Vec<EnrollmentRow>,
    pub facts: Vec<FactRow>,
}

pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Grade;

    fn fact(enrollment: i64, approved: f64, dropped: f64) -> FactRow {
        let mut fact = FactRow::from_enrollment(&EnrollmentRow {
            municipality_code: "3205309".into(),
            municipality_name: "Vitória".into(),
            region: "ES".into(),
            network: Network::Municipal,
            grade: Grade::SIXTH,
            enrollment,
        });
        fact.approval_count = approved;
        fact.dropout_count = dropped;
        fact
    }

    #[test]
    fn test_performance_is_enrollment_weighted() {
        let facts = [fact(100, 90.0, 5.0), fact(300, 150.0, 15.0)];

        let rates = PerformanceRates::from_facts(&facts);

        assert_eq!(rates.enrollment, 400);
        assert!((rates.approval_pct - 60.0).abs() < 1e-9);
        assert!((rates.dropout_pct - 5.0).abs() < 1e-9);
        assert_eq!(rates.retention_pct, 0.0);
    }

    #[test]
    fn test_performance_without_enrollment_is_zero() {
        let rates = PerformanceRates::from_facts(&[fact(0, 0.0, 0.0)]);
        assert_eq!(rates, PerformanceRates::default());
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(Vec::new()), None);
        assert_eq!(mean([1.0, 2.0, 6.0]), Some(3.0));
    }

    #[test]
    fn test_network_index_summary() {
        let summary = NetworkIndexSummary {
            network: Network::Estadual,
            records: 4,
            mean_observed: 5.0,
            mean_target: Some(4.5),
            above_target: 3,
        };
        assert_eq!(summary.above_target_pct(), 75.0);
        assert_eq!(summary.gap(), Some(0.5));
    }
}
