//! Enrollment census microdata (one row per school).

use super::{LoadedSource, SourceKind, count_values, load_raw, text_values};
use crate::coercion::{ColumnCoercion, TypeCoercer};
use crate::config::SourceConfig;
use crate::error::{Result, ResultExt};
use crate::types::{Grade, SourceEnrollmentRecord};
use polars::prelude::*;

pub const CENSUS_YEAR: &str = "NU_ANO_CENSO";
pub const REGION: &str = "SG_UF";
pub const MUNICIPALITY_CODE: &str = "CO_MUNICIPIO";
pub const MUNICIPALITY_NAME: &str = "NO_MUNICIPIO";
pub const DEPENDENCY: &str = "TP_DEPENDENCIA";

/// Enrollment columns of the final cycle, in [`Grade::ALL`] order.
pub const GRADE_COLUMNS: [&str; 4] = [
    "QT_MAT_FUND_AF_6",
    "QT_MAT_FUND_AF_7",
    "QT_MAT_FUND_AF_8",
    "QT_MAT_FUND_AF_9",
];

pub const REQUIRED_COLUMNS: [&str; 9] = [
    CENSUS_YEAR,
    REGION,
    MUNICIPALITY_CODE,
    MUNICIPALITY_NAME,
    GRADE_COLUMNS[0],
    GRADE_COLUMNS[1],
    GRADE_COLUMNS[2],
    GRADE_COLUMNS[3],
    DEPENDENCY,
];

const COERCION_PLAN: [(&str, ColumnCoercion); 9] = [
    (CENSUS_YEAR, ColumnCoercion::Code),
    (REGION, ColumnCoercion::Text),
    (MUNICIPALITY_CODE, ColumnCoercion::Code),
    (MUNICIPALITY_NAME, ColumnCoercion::Text),
    (GRADE_COLUMNS[0], ColumnCoercion::Count),
    (GRADE_COLUMNS[1], ColumnCoercion::Count),
    (GRADE_COLUMNS[2], ColumnCoercion::Count),
    (GRADE_COLUMNS[3], ColumnCoercion::Count),
    (DEPENDENCY, ColumnCoercion::Code),
];

/// Column holding the enrollment of a grade.
pub fn grade_column(grade: Grade) -> &'static str {
    GRADE_COLUMNS[grade.index()]
}

/// Load and type the enrollment census.
pub fn load(source: &SourceConfig) -> Result<LoadedSource<SourceEnrollmentRecord>> {
    let df = load_raw(SourceKind::Enrollment, source, &REQUIRED_COLUMNS)?;
    records_from_frame(df).context("Failed to type enrollment source")
}

/// Coerce a raw all-text frame and lift it into records.
pub fn records_from_frame(df: DataFrame) -> Result<LoadedSource<SourceEnrollmentRecord>> {
    let raw_rows = df.height();
    let (df, coercion_steps) = TypeCoercer.coerce(df, &COERCION_PLAN)?;

    let years = text_values(&df, CENSUS_YEAR)?;
    let regions = text_values(&df, REGION)?;
    let codes = text_values(&df, MUNICIPALITY_CODE)?;
    let names = text_values(&df, MUNICIPALITY_NAME)?;
    let dependencies = text_values(&df, DEPENDENCY)?;
    let grade_counts = GRADE_COLUMNS
        .iter()
        .map(|column| count_values(&df, column))
        .collect::<Result<Vec<_>>>()?;

    let mut records = Vec::with_capacity(raw_rows);
    let mut rows_without_code = 0;
    for i in 0..raw_rows {
        let Some(code) = codes[i].clone() else {
            rows_without_code += 1;
            continue;
        };
        records.push(SourceEnrollmentRecord {
            census_year: years[i].clone().unwrap_or_default(),
            region: regions[i].clone().unwrap_or_default(),
            municipality_code: code,
            municipality_name: names[i].clone().unwrap_or_default(),
            enrollment: [
                grade_counts[0][i],
                grade_counts[1][i],
                grade_counts[2][i],
                grade_counts[3][i],
            ],
            dependency_code: dependencies[i].clone().unwrap_or_default(),
        });
    }

    Ok(LoadedSource {
        records,
        raw_rows,
        rows_without_code,
        coercion_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_from_frame() {
        let df = df! {
            CENSUS_YEAR => ["2023", "2023"],
            REGION => ["ES", "ES"],
            MUNICIPALITY_CODE => ["3205309", "3205309"],
            MUNICIPALITY_NAME => ["Vitória", "Vitória"],
            GRADE_COLUMNS[0] => ["100", ""],
            GRADE_COLUMNS[1] => ["90.0", "x"],
            GRADE_COLUMNS[2] => ["80", "5"],
            GRADE_COLUMNS[3] => ["70", "-2"],
            DEPENDENCY => ["2", "3.0"],
        }
        .unwrap();

        let loaded = records_from_frame(df).unwrap();

        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.records[0].enrollment, [100, 90, 80, 70]);
        assert_eq!(loaded.records[0].enrollment_for(Grade::SEVENTH), 90);
        assert_eq!(loaded.records[1].enrollment, [0, 0, 5, 0]);
        assert_eq!(loaded.records[1].dependency_code, "3");
        assert!(!loaded.coercion_steps.is_empty());
    }

    #[test]
    fn test_grade_column() {
        assert_eq!(grade_column(Grade::SIXTH), "QT_MAT_FUND_AF_6");
        assert_eq!(grade_column(Grade::NINTH), "QT_MAT_FUND_AF_9");
    }
}
