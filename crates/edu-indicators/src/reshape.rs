//! Grain expansion: wide source rows (one column per grade) to long rows.

use crate::types::{
    EnrollmentRow, Grade, IndexRow, Network, RateRow, SourceEnrollmentRecord, SourceIndexRecord,
    SourceRateRecord,
};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Running totals of one (municipality, dependency code) group.
struct EnrollmentGroup<'a> {
    municipality_name: &'a str,
    region: &'a str,
    totals: [i64; 4],
}

/// Aggregate school rows by municipality and dependency code, then emit
/// one row per grade.
///
/// Name and region come from the first row of each group. Groups are
/// emitted in ascending (municipality code, dependency code) order.
/// Totals saturate at `i64::MAX`.
pub fn expand_enrollment(records: &[SourceEnrollmentRecord]) -> Vec<EnrollmentRow> {
    let mut groups: BTreeMap<(&str, &str), EnrollmentGroup<'_>> = BTreeMap::new();

    for record in records {
        let group = groups
            .entry((record.municipality_code.as_str(), record.dependency_code.as_str()))
            .or_insert_with(|| EnrollmentGroup {
                municipality_name: &record.municipality_name,
                region: &record.region,
                totals: [0; 4],
            });
        for (total, count) in group.totals.iter_mut().zip(record.enrollment) {
            *total = total.saturating_add(count);
        }
    }

    debug!(
        "Aggregated {} school rows into {} municipality/network groups",
        records.len(),
        groups.len()
    );

    groups
        .into_iter()
        .flat_map(|((code, dependency), group)| {
            let network = Network::from_dependency_code(dependency);
            Grade::ALL.into_iter().map(move |grade| EnrollmentRow {
                municipality_code: code.to_string(),
                municipality_name: group.municipality_name.to_string(),
                region: group.region.to_string(),
                network,
                grade,
                enrollment: group.totals[grade.index()],
            })
        })
        .collect()
}

/// Emit one rate row per grade for every source row with a known network.
pub fn expand_rates(records: &[SourceRateRecord]) -> Vec<RateRow> {
    let mut unknown_network = 0;
    let mut rows = Vec::with_capacity(records.len() * Grade::ALL.len());

    for record in records {
        let Some(network) = Network::from_label(&record.network) else {
            unknown_network += 1;
            continue;
        };
        for grade in Grade::ALL {
            rows.push(RateRow {
                municipality_code: record.municipality_code.clone(),
                network,
                grade,
                rates: record.rates_for(grade),
            });
        }
    }

    if unknown_network > 0 {
        debug!(
            "Skipped {} rate rows whose network is neither Estadual nor Municipal",
            unknown_network
        );
    }
    rows
}

/// Copy each index row onto the four grades of the final cycle.
///
/// The index is not published per grade, so every grade of a
/// (municipality, network) carries the same observed value and target.
pub fn expand_index(records: &[SourceIndexRecord]) -> Vec<IndexRow> {
    if !records.is_empty() {
        warn!(
            "Index values are published for the whole final cycle; broadcasting {} rows across grades 6-9",
            records.len()
        );
    }

    records
        .iter()
        .flat_map(|record| {
            let above_target = record.above_target();
            Grade::ALL.into_iter().map(move |grade| IndexRow {
                municipality_code: record.municipality_code.clone(),
                municipality_name: record.municipality_name.clone(),
                region: record.region.clone(),
                network: record.network.clone(),
                grade,
                observed: record.observed,
                target: record.target,
                above_target,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GradeRates;

    fn school(code: &str, name: &str, dependency: &str, enrollment: [i64; 4]) -> SourceEnrollmentRecord {
        SourceEnrollmentRecord {
            census_year: "2023".into(),
            region: "ES".into(),
            municipality_code: code.into(),
            municipality_name: name.into(),
            enrollment,
            dependency_code: dependency.into(),
        }
    }

    #[test]
    fn test_expand_enrollment_single_school() {
        let rows = expand_enrollment(&[school("3205309", "Vitória", "2", [100, 90, 80, 70])]);

        assert_eq!(rows.len(), 4);
        let counts: Vec<i64> = rows.iter().map(|r| r.enrollment).collect();
        assert_eq!(counts, vec![100, 90, 80, 70]);
        assert!(rows.iter().all(|r| r.network == Network::Estadual));
        let grades: Vec<Grade> = rows.iter().map(|r| r.grade).collect();
        assert_eq!(grades, Grade::ALL.to_vec());
    }

    #[test]
    fn test_expand_enrollment_sums_schools_and_keeps_first_name() {
        let rows = expand_enrollment(&[
            school("3205309", "Vitória", "3", [10, 10, 10, 10]),
            school("3200102", "Afonso Cláudio", "2", [1, 2, 3, 4]),
            school("3205309", "VITORIA", "3", [5, 0, 1, 2]),
        ]);

        assert_eq!(rows.len(), 8);
        // Ascending by code: 3200102 first.
        assert_eq!(rows[0].municipality_code, "3200102");
        let vitoria: Vec<&EnrollmentRow> = rows
            .iter()
            .filter(|r| r.municipality_code == "3205309")
            .collect();
        assert!(vitoria.iter().all(|r| r.municipality_name == "Vitória"));
        assert!(vitoria.iter().all(|r| r.network == Network::Municipal));
        let counts: Vec<i64> = vitoria.iter().map(|r| r.enrollment).collect();
        assert_eq!(counts, vec![15, 10, 11, 12]);
    }

    #[test]
    fn test_expand_enrollment_conserves_totals() {
        let records = vec![
            school("1", "A", "2", [3, 4, 5, 6]),
            school("1", "A", "2", [7, 8, 9, 10]),
            school("1", "A", "3", [1, 1, 1, 1]),
        ];
        let rows = expand_enrollment(&records);

        let raw: i64 = records.iter().flat_map(|r| r.enrollment).sum();
        let long: i64 = rows.iter().map(|r| r.enrollment).sum();
        assert_eq!(raw, long);
    }

    #[test]
    fn test_expand_enrollment_saturates_instead_of_overflowing() {
        let rows = expand_enrollment(&[
            school("1", "A", "3", [i64::MAX, 0, 0, 0]),
            school("1", "A", "3", [i64::MAX, 1, 0, 0]),
        ]);

        assert_eq!(rows[0].enrollment, i64::MAX);
        assert_eq!(rows[1].enrollment, 1);
        assert!(rows.iter().all(|r| r.enrollment >= 0));
    }

    #[test]
    fn test_expand_rates_picks_grade_triple() {
        let mut rates = [GradeRates::default(); 4];
        rates[Grade::EIGHTH.index()] = GradeRates {
            approval: Some(0.9),
            retention: Some(0.07),
            dropout: Some(0.03),
        };
        let record = SourceRateRecord {
            census_year: "2023".into(),
            region: "ES".into(),
            municipality_code: "3205309".into(),
            municipality_name: "Vitória".into(),
            network: "Municipal".into(),
            category: "Total".into(),
            rates,
        };
        let federal = SourceRateRecord {
            network: "Federal".into(),
            ..record.clone()
        };

        let rows = expand_rates(&[record, federal]);

        assert_eq!(rows.len(), 4);
        let eighth = rows.iter().find(|r| r.grade == Grade::EIGHTH).unwrap();
        assert_eq!(eighth.rates.approval, Some(0.9));
        assert_eq!(eighth.network, Network::Municipal);
        let sixth = rows.iter().find(|r| r.grade == Grade::SIXTH).unwrap();
        assert_eq!(sixth.rates.approval, None);
    }

    #[test]
    fn test_expand_index_broadcasts() {
        let record = SourceIndexRecord {
            region: "ES".into(),
            municipality_code: "3205309".into(),
            municipality_name: "Vitória".into(),
            observed: Some(5.8),
            target: Some(5.5),
            network: "Municipal".into(),
        };

        let rows = expand_index(&[record]);

        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.observed == Some(5.8)
            && r.target == Some(5.5)
            && r.above_target == Some(true)));
    }
}
