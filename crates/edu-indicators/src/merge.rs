//! Key-based consolidation of the three long tables.
//!
//! Both joins are left joins from the enrollment side: every enrollment row
//! yields exactly one fact row, with rate and index fields left null when
//! the right side has no matching (municipality, network, grade).

use crate::types::{EnrollmentRow, FactRow, GrainKey, IndexRow, RateRow};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::{debug, warn};

/// Match and duplicate counts of the two joins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub enrollment_rows: usize,
    pub rate_matches: usize,
    pub index_matches: usize,
    /// Rate rows ignored because an earlier row had the same key.
    pub duplicate_rate_keys: usize,
    /// Index rows ignored because an earlier row had the same key.
    pub duplicate_index_keys: usize,
    /// Index rows whose network cannot match any enrollment row.
    pub unkeyed_index_rows: usize,
}

/// Build a first-row-wins lookup, counting the rows it had to ignore.
fn first_wins<'a, T>(rows: impl IntoIterator<Item = (GrainKey, &'a T)>) -> (HashMap<GrainKey, &'a T>, usize) {
    let mut lookup = HashMap::new();
    let mut duplicates = 0;
    for (key, row) in rows {
        match lookup.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
            Entry::Occupied(_) => duplicates += 1,
        }
    }
    (lookup, duplicates)
}

/// Left-join enrollment with rates, then with index values.
///
/// Absolute counts are left at zero; see [`crate::metrics`].
pub fn consolidate(
    enrollment: &[EnrollmentRow],
    rates: &[RateRow],
    index: &[IndexRow],
) -> (Vec<FactRow>, MergeStats) {
    let (rate_lookup, duplicate_rate_keys) = first_wins(rates.iter().map(|row| (row.key(), row)));

    let mut unkeyed_index_rows = 0;
    let (index_lookup, duplicate_index_keys) = first_wins(index.iter().filter_map(|row| {
        let key = row.key();
        if key.is_none() {
            unkeyed_index_rows += 1;
        }
        key.map(|key| (key, row))
    }));

    let mut stats = MergeStats {
        enrollment_rows: enrollment.len(),
        duplicate_rate_keys,
        duplicate_index_keys,
        unkeyed_index_rows,
        ..MergeStats::default()
    };

    let facts: Vec<FactRow> = enrollment
        .iter()
        .map(|row| {
            let mut fact = FactRow::from_enrollment(row);
            let key = row.key();

            if let Some(rate) = rate_lookup.get(&key) {
                stats.rate_matches += 1;
                fact.approval_rate = rate.rates.approval;
                fact.retention_rate = rate.rates.retention;
                fact.dropout_rate = rate.rates.dropout;
            }

            if let Some(index_row) = index_lookup.get(&key) {
                stats.index_matches += 1;
                fact.observed_index = index_row.observed;
                fact.target_index = index_row.target;
                fact.above_target = index_row.above_target;
            }

            fact
        })
        .collect();

    if stats.duplicate_rate_keys > 0 {
        warn!(
            "{} rate rows share a key with an earlier row; the first row was used",
            stats.duplicate_rate_keys
        );
    }
    if stats.duplicate_index_keys > 0 {
        warn!(
            "{} index rows share a key with an earlier row; the first row was used",
            stats.duplicate_index_keys
        );
    }
    debug!(
        "Joined {} enrollment rows: {} with rates, {} with index values",
        stats.enrollment_rows, stats.rate_matches, stats.index_matches
    );

    (facts, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Grade, GradeRates, Network};

    fn enrollment(code: &str, network: Network, grade: Grade, count: i64) -> EnrollmentRow {
        EnrollmentRow {
            municipality_code: code.into(),
            municipality_name: "Vitória".into(),
            region: "ES".into(),
            network,
            grade,
            enrollment: count,
        }
    }

    fn rate(code: &str, network: Network, grade: Grade, approval: f64) -> RateRow {
        RateRow {
            municipality_code: code.into(),
            network,
            grade,
            rates: GradeRates {
                approval: Some(approval),
                retention: Some(0.0),
                dropout: Some(0.0),
            },
        }
    }

    fn index(code: &str, network: &str, grade: Grade, observed: f64) -> IndexRow {
        IndexRow {
            municipality_code: code.into(),
            municipality_name: "Vitória".into(),
            region: "ES".into(),
            network: network.into(),
            grade,
            observed: Some(observed),
            target: Some(5.0),
            above_target: Some(observed >= 5.0),
        }
    }

    #[test]
    fn test_left_join_keeps_unmatched_enrollment() {
        let left = vec![
            enrollment("3205309", Network::Estadual, Grade::SIXTH, 100),
            enrollment("3205309", Network::Municipal, Grade::SIXTH, 50),
        ];
        let rates = vec![rate("3205309", Network::Municipal, Grade::SIXTH, 0.9)];

        let (facts, stats) = consolidate(&left, &rates, &[]);

        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].approval_rate, None);
        assert_eq!(facts[1].approval_rate, Some(0.9));
        assert_eq!(stats.rate_matches, 1);
        assert_eq!(stats.index_matches, 0);
    }

    #[test]
    fn test_right_side_without_enrollment_is_dropped() {
        let left = vec![enrollment("3205309", Network::Estadual, Grade::SIXTH, 100)];
        let rates = vec![rate("3200102", Network::Estadual, Grade::SIXTH, 0.9)];
        let idx = vec![index("3200102", "Estadual", Grade::SIXTH, 6.0)];

        let (facts, _) = consolidate(&left, &rates, &idx);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].municipality_code, "3205309");
        assert_eq!(facts[0].observed_index, None);
    }

    #[test]
    fn test_duplicate_keys_first_row_wins() {
        let left = vec![enrollment("3205309", Network::Municipal, Grade::SEVENTH, 10)];
        let rates = vec![
            rate("3205309", Network::Municipal, Grade::SEVENTH, 0.8),
            rate("3205309", Network::Municipal, Grade::SEVENTH, 0.1),
        ];
        let idx = vec![
            index("3205309", "Municipal", Grade::SEVENTH, 6.0),
            index("3205309", "Municipal", Grade::SEVENTH, 4.0),
            index("3205309", "Pública", Grade::SEVENTH, 4.0),
        ];

        let (facts, stats) = consolidate(&left, &rates, &idx);

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].approval_rate, Some(0.8));
        assert_eq!(facts[0].observed_index, Some(6.0));
        assert_eq!(facts[0].above_target, Some(true));
        assert_eq!(stats.duplicate_rate_keys, 1);
        assert_eq!(stats.duplicate_index_keys, 1);
        assert_eq!(stats.unkeyed_index_rows, 1);
    }
}
