//! Promotion, retention and dropout rate extract.
//!
//! Rate columns are named `{measure}_CAT_FUN_0{grade}` where measure 1 is
//! approval, 2 is retention and 3 is dropout. Values are published as
//! percentages and stored as fractions.

use super::{LoadedSource, SourceKind, float_values, load_raw, text_values};
use crate::coercion::{ColumnCoercion, TypeCoercer};
use crate::config::SourceConfig;
use crate::error::{Result, ResultExt};
use crate::types::{Grade, GradeRates, SourceRateRecord};
use polars::prelude::*;

pub const CENSUS_YEAR: &str = "NU_ANO_CENSO";
pub const REGION: &str = "SG_UF";
pub const MUNICIPALITY_CODE: &str = "CO_MUNICIPIO";
pub const MUNICIPALITY_NAME: &str = "NO_MUNICIPIO";
pub const NETWORK: &str = "NO_DEPENDENCIA";
pub const CATEGORY: &str = "NO_CATEGORIA";

/// Approval, retention and dropout columns per grade, in [`Grade::ALL`] order.
pub const RATE_COLUMNS: [[&str; 3]; 4] = [
    ["1_CAT_FUN_06", "2_CAT_FUN_06", "3_CAT_FUN_06"],
    ["1_CAT_FUN_07", "2_CAT_FUN_07", "3_CAT_FUN_07"],
    ["1_CAT_FUN_08", "2_CAT_FUN_08", "3_CAT_FUN_08"],
    ["1_CAT_FUN_09", "2_CAT_FUN_09", "3_CAT_FUN_09"],
];

const LABEL_COLUMNS: [&str; 6] = [
    CENSUS_YEAR,
    REGION,
    MUNICIPALITY_CODE,
    MUNICIPALITY_NAME,
    NETWORK,
    CATEGORY,
];

/// Every column the rate source must provide.
pub fn required_columns() -> Vec<&'static str> {
    LABEL_COLUMNS
        .iter()
        .copied()
        .chain(RATE_COLUMNS.iter().flatten().copied())
        .collect()
}

fn coercion_plan() -> Vec<(&'static str, ColumnCoercion)> {
    let mut plan = vec![
        (CENSUS_YEAR, ColumnCoercion::Code),
        (REGION, ColumnCoercion::Text),
        (MUNICIPALITY_CODE, ColumnCoercion::Code),
        (MUNICIPALITY_NAME, ColumnCoercion::Text),
        (NETWORK, ColumnCoercion::Text),
        (CATEGORY, ColumnCoercion::Text),
    ];
    plan.extend(
        RATE_COLUMNS
            .iter()
            .flatten()
            .map(|&column| (column, ColumnCoercion::Rate)),
    );
    plan
}

/// Approval, retention and dropout column names for a grade.
pub fn rate_columns(grade: Grade) -> [&'static str; 3] {
    RATE_COLUMNS[grade.index()]
}

/// Load and type the rate extract.
pub fn load(source: &SourceConfig) -> Result<LoadedSource<SourceRateRecord>> {
    let df = load_raw(SourceKind::Rates, source, &required_columns())?;
    records_from_frame(df).context("Failed to type rate source")
}

/// Coerce a raw all-text frame and lift it into records.
pub fn records_from_frame(df: DataFrame) -> Result<LoadedSource<SourceRateRecord>> {
    let raw_rows = df.height();
    let (df, coercion_steps) = TypeCoercer.coerce(df, &coercion_plan())?;

    let years = text_values(&df, CENSUS_YEAR)?;
    let regions = text_values(&df, REGION)?;
    let codes = text_values(&df, MUNICIPALITY_CODE)?;
    let names = text_values(&df, MUNICIPALITY_NAME)?;
    let networks = text_values(&df, NETWORK)?;
    let categories = text_values(&df, CATEGORY)?;

    let mut per_grade = Vec::with_capacity(Grade::ALL.len());
    for grade in Grade::ALL {
        let [approval, retention, dropout] = rate_columns(grade);
        per_grade.push((
            float_values(&df, approval)?,
            float_values(&df, retention)?,
            float_values(&df, dropout)?,
        ));
    }

    let mut records = Vec::with_capacity(raw_rows);
    let mut rows_without_code = 0;
    for i in 0..raw_rows {
        let Some(code) = codes[i].clone() else {
            rows_without_code += 1;
            continue;
        };
        let mut rates = [GradeRates::default(); 4];
        for (slot, (approval, retention, dropout)) in rates.iter_mut().zip(&per_grade) {
            *slot = GradeRates {
                approval: approval[i],
                retention: retention[i],
                dropout: dropout[i],
            };
        }
        records.push(SourceRateRecord {
            census_year: years[i].clone().unwrap_or_default(),
            region: regions[i].clone().unwrap_or_default(),
            municipality_code: code,
            municipality_name: names[i].clone().unwrap_or_default(),
            network: networks[i].clone().unwrap_or_default(),
            category: categories[i].clone().unwrap_or_default(),
            rates,
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

    fn raw_frame(approval_6: &str, dropout_9: &str) -> DataFrame {
        let mut columns = vec![
            Column::new(CENSUS_YEAR.into(), ["2023"]),
            Column::new(REGION.into(), ["ES"]),
            Column::new(MUNICIPALITY_CODE.into(), ["3205309"]),
            Column::new(MUNICIPALITY_NAME.into(), ["Vitória"]),
            Column::new(NETWORK.into(), ["Estadual"]),
            Column::new(CATEGORY.into(), ["Total"]),
        ];
        for &column in RATE_COLUMNS.iter().flatten() {
            let value = match column {
                "1_CAT_FUN_06" => approval_6,
                "3_CAT_FUN_09" => dropout_9,
                _ => "1.0",
            };
            columns.push(Column::new(column.into(), [value]));
        }
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_required_columns() {
        let columns = required_columns();
        assert_eq!(columns.len(), 18);
        assert!(columns.contains(&"2_CAT_FUN_08"));
    }

    #[test]
    fn test_records_from_frame_converts_percentages() {
        let loaded = records_from_frame(raw_frame("98.4", "--")).unwrap();

        assert_eq!(loaded.records.len(), 1);
        let record = &loaded.records[0];
        let sixth = record.rates_for(Grade::SIXTH);
        assert!((sixth.approval.unwrap() - 0.984).abs() < 1e-12);
        assert!((sixth.retention.unwrap() - 0.01).abs() < 1e-12);
        assert_eq!(record.rates_for(Grade::NINTH).dropout, None);
    }
}
