//! Index-and-target extract.

use super::{LoadedSource, SourceKind, float_values, load_raw, text_values};
use crate::coercion::{ColumnCoercion, TypeCoercer};
use crate::config::SourceConfig;
use crate::error::{Result, ResultExt};
use crate::types::SourceIndexRecord;
use polars::prelude::*;

pub const REGION: &str = "SG_UF";
pub const MUNICIPALITY_CODE: &str = "CO_MUNICIPIO";
pub const MUNICIPALITY_NAME: &str = "NO_MUNICIPIO";
pub const OBSERVED: &str = "VL_OBSERVADO_2023";
pub const TARGET: &str = "VL_PROJECAO_2021";
pub const NETWORK: &str = "REDE";

pub const REQUIRED_COLUMNS: [&str; 6] = [
    REGION,
    MUNICIPALITY_CODE,
    MUNICIPALITY_NAME,
    OBSERVED,
    TARGET,
    NETWORK,
];

const COERCION_PLAN: [(&str, ColumnCoercion); 6] = [
    (REGION, ColumnCoercion::Text),
    (MUNICIPALITY_CODE, ColumnCoercion::Code),
    (MUNICIPALITY_NAME, ColumnCoercion::Text),
    (OBSERVED, ColumnCoercion::IndexValue),
    (TARGET, ColumnCoercion::IndexValue),
    (NETWORK, ColumnCoercion::Text),
];

/// Load and type the index extract.
pub fn load(source: &SourceConfig) -> Result<LoadedSource<SourceIndexRecord>> {
    let df = load_raw(SourceKind::Index, source, &REQUIRED_COLUMNS)?;
    records_from_frame(df).context("Failed to type index source")
}

/// Coerce a raw all-text frame and lift it into records.
pub fn records_from_frame(df: DataFrame) -> Result<LoadedSource<SourceIndexRecord>> {
    let raw_rows = df.height();
    let (df, coercion_steps) = TypeCoercer.coerce(df, &COERCION_PLAN)?;

    let regions = text_values(&df, REGION)?;
    let codes = text_values(&df, MUNICIPALITY_CODE)?;
    let names = text_values(&df, MUNICIPALITY_NAME)?;
    let observed = float_values(&df, OBSERVED)?;
    let targets = float_values(&df, TARGET)?;
    let networks = text_values(&df, NETWORK)?;

    let mut records = Vec::with_capacity(raw_rows);
    let mut rows_without_code = 0;
    for i in 0..raw_rows {
        let Some(code) = codes[i].clone() else {
            rows_without_code += 1;
            continue;
        };
        records.push(SourceIndexRecord {
            region: regions[i].clone().unwrap_or_default(),
            municipality_code: code,
            municipality_name: names[i].clone().unwrap_or_default(),
            observed: observed[i],
            target: targets[i],
            network: networks[i].clone().unwrap_or_default(),
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
            REGION => ["ES", "ES", "ES"],
            MUNICIPALITY_CODE => ["3205309.0", "3200102", ""],
            MUNICIPALITY_NAME => ["Vitória", "Afonso Cláudio", "Fonte: Inep"],
            OBSERVED => ["5.8", "-", ""],
            TARGET => ["5.5", "5.1", ""],
            NETWORK => ["Municipal", "Estadual", ""],
        }
        .unwrap();

        let loaded = records_from_frame(df).unwrap();

        assert_eq!(loaded.raw_rows, 3);
        assert_eq!(loaded.rows_without_code, 1);
        assert_eq!(loaded.records.len(), 2);

        let vitoria = &loaded.records[0];
        assert_eq!(vitoria.municipality_code, "3205309");
        assert_eq!(vitoria.observed, Some(5.8));
        assert_eq!(vitoria.above_target(), Some(true));

        let afonso = &loaded.records[1];
        assert_eq!(afonso.observed, None);
        assert_eq!(afonso.target, Some(5.1));
        assert_eq!(afonso.above_target(), None);
    }
}
