//! Derived metrics: absolute counts from enrollment and rates.

use crate::types::FactRow;

/// `enrollment * rate`, or 0 when the rate is missing.
///
/// Rates are never negative after coercion and enrollment is clamped at
/// zero, so the product is never negative either.
pub fn absolute_count(enrollment: i64, rate: Option<f64>) -> f64 {
    match rate {
        Some(rate) => (enrollment as f64 * rate).max(0.0),
        None => 0.0,
    }
}

/// Fill the dropout, approval and retention counts of every fact row.
pub fn apply_absolute_counts(facts: &mut [FactRow]) {
    for fact in facts {
        fact.dropout_count = absolute_count(fact.enrollment, fact.dropout_rate);
        fact.approval_count = absolute_count(fact.enrollment, fact.approval_rate);
        fact.retention_count = absolute_count(fact.enrollment, fact.retention_rate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EnrollmentRow, Grade, Network};

    #[test]
    fn test_absolute_count() {
        assert!((absolute_count(100, Some(0.984)) - 98.4).abs() < 1e-9);
        assert_eq!(absolute_count(100, None), 0.0);
        assert_eq!(absolute_count(0, Some(0.5)), 0.0);
    }

    #[test]
    fn test_apply_absolute_counts() {
        let mut fact = FactRow::from_enrollment(&EnrollmentRow {
            municipality_code: "3205309".into(),
            municipality_name: "Vitória".into(),
            region: "ES".into(),
            network: Network::Municipal,
            grade: Grade::SIXTH,
            enrollment: 200,
        });
        fact.approval_rate = Some(0.9);
        fact.dropout_rate = Some(0.025);

        let mut facts = vec![fact];
        apply_absolute_counts(&mut facts);

        assert!((facts[0].approval_count - 180.0).abs() < 1e-9);
        assert!((facts[0].dropout_count - 5.0).abs() < 1e-9);
        assert_eq!(facts[0].retention_count, 0.0);
    }
}
