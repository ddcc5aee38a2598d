//! Conversions between typed rows and the persisted table layouts.

use crate::error::Result;
use crate::sources::text_values;
use crate::types::{EnrollmentRow, FactRow, Grade, Network, SourceIndexRecord};
use crate::utils::{canonical_code, parse_decimal};
use polars::prelude::*;
use tracing::warn;

pub const CO_MUNICIPIO: &str = "CO_MUNICIPIO";
pub const NO_MUNICIPIO: &str = "NO_MUNICIPIO";
pub const SG_UF: &str = "SG_UF";
pub const REDE: &str = "REDE";
pub const ANO_ESCOLAR: &str = "ANO_ESCOLAR";
pub const QT_MATRICULAS: &str = "QT_MATRICULAS";
pub const TAXA_EVASAO: &str = "TAXA_EVASAO";
pub const TAXA_APROVACAO: &str = "TAXA_APROVACAO";
pub const TAXA_REPROVACAO: &str = "TAXA_REPROVACAO";
pub const EVASAO_ABSOLUTA: &str = "EVASAO_ABSOLUTA";
pub const APROVADOS_ABSOLUTOS: &str = "APROVADOS_ABSOLUTOS";
pub const REPROVADOS_ABSOLUTOS: &str = "REPROVADOS_ABSOLUTOS";
pub const VL_OBSERVADO_2023: &str = "VL_OBSERVADO_2023";
pub const VL_PROJECAO_2021: &str = "VL_PROJECAO_2021";
pub const ACIMA_META: &str = "ACIMA_META";
/// Above-target column of the legacy index aggregate (lower case there).
pub const ACIMA_META_LEGACY: &str = "acima_meta";

/// Fact table columns, in file order.
pub const FACT_COLUMNS: [&str; 12] = [
    CO_MUNICIPIO,
    NO_MUNICIPIO,
    SG_UF,
    REDE,
    ANO_ESCOLAR,
    QT_MATRICULAS,
    TAXA_EVASAO,
    TAXA_APROVACAO,
    TAXA_REPROVACAO,
    EVASAO_ABSOLUTA,
    APROVADOS_ABSOLUTOS,
    REPROVADOS_ABSOLUTOS,
];

/// Optional broadcast index columns appended to the fact table.
pub const FACT_INDEX_COLUMNS: [&str; 3] = [VL_OBSERVADO_2023, VL_PROJECAO_2021, ACIMA_META];

pub const ENROLLMENT_COLUMNS: [&str; 6] =
    [CO_MUNICIPIO, NO_MUNICIPIO, SG_UF, REDE, ANO_ESCOLAR, QT_MATRICULAS];

pub const INDEX_COLUMNS: [&str; 7] = [
    SG_UF,
    CO_MUNICIPIO,
    NO_MUNICIPIO,
    VL_OBSERVADO_2023,
    VL_PROJECAO_2021,
    REDE,
    ACIMA_META_LEGACY,
];

/// Sort facts by municipality name, network and grade.
///
/// The municipality code breaks ties so the order never depends on input order.
pub fn sort_facts(facts: &mut [FactRow]) {
    facts.sort_by(|a, b| {
        a.municipality_name
            .cmp(&b.municipality_name)
            .then_with(|| a.network.as_str().cmp(b.network.as_str()))
            .then_with(|| a.grade.cmp(&b.grade))
            .then_with(|| a.municipality_code.cmp(&b.municipality_code))
    });
}

// =============================================================================
// Rows to frames
// =============================================================================

pub fn facts_to_frame(facts: &[FactRow], include_index_columns: bool) -> Result<DataFrame> {
    let mut columns = vec![
        Column::new(CO_MUNICIPIO.into(), facts.iter().map(|f| f.municipality_code.as_str()).collect::<Vec<_>>()),
        Column::new(NO_MUNICIPIO.into(), facts.iter().map(|f| f.municipality_name.as_str()).collect::<Vec<_>>()),
        Column::new(SG_UF.into(), facts.iter().map(|f| f.region.as_str()).collect::<Vec<_>>()),
        Column::new(REDE.into(), facts.iter().map(|f| f.network.as_str()).collect::<Vec<_>>()),
        Column::new(ANO_ESCOLAR.into(), facts.iter().map(|f| i32::from(f.grade.value())).collect::<Vec<_>>()),
        Column::new(QT_MATRICULAS.into(), facts.iter().map(|f| f.enrollment).collect::<Vec<_>>()),
        Column::new(TAXA_EVASAO.into(), facts.iter().map(|f| f.dropout_rate).collect::<Vec<_>>()),
        Column::new(TAXA_APROVACAO.into(), facts.iter().map(|f| f.approval_rate).collect::<Vec<_>>()),
        Column::new(TAXA_REPROVACAO.into(), facts.iter().map(|f| f.retention_rate).collect::<Vec<_>>()),
        Column::new(EVASAO_ABSOLUTA.into(), facts.iter().map(|f| f.dropout_count).collect::<Vec<_>>()),
        Column::new(APROVADOS_ABSOLUTOS.into(), facts.iter().map(|f| f.approval_count).collect::<Vec<_>>()),
        Column::new(REPROVADOS_ABSOLUTOS.into(), facts.iter().map(|f| f.retention_count).collect::<Vec<_>>()),
    ];

    if include_index_columns {
        columns.push(Column::new(
            VL_OBSERVADO_2023.into(),
            facts.iter().map(|f| f.observed_index).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            VL_PROJECAO_2021.into(),
            facts.iter().map(|f| f.target_index).collect::<Vec<_>>(),
        ));
        columns.push(Column::new(
            ACIMA_META.into(),
            facts.iter().map(|f| f.above_target).collect::<Vec<_>>(),
        ));
    }

    Ok(DataFrame::new(columns)?)
}

pub fn enrollment_to_frame(rows: &[EnrollmentRow]) -> Result<DataFrame> {
    let columns = vec![
        Column::new(CO_MUNICIPIO.into(), rows.iter().map(|r| r.municipality_code.as_str()).collect::<Vec<_>>()),
        Column::new(NO_MUNICIPIO.into(), rows.iter().map(|r| r.municipality_name.as_str()).collect::<Vec<_>>()),
        Column::new(SG_UF.into(), rows.iter().map(|r| r.region.as_str()).collect::<Vec<_>>()),
        Column::new(REDE.into(), rows.iter().map(|r| r.network.as_str()).collect::<Vec<_>>()),
        Column::new(ANO_ESCOLAR.into(), rows.iter().map(|r| i32::from(r.grade.value())).collect::<Vec<_>>()),
        Column::new(QT_MATRICULAS.into(), rows.iter().map(|r| r.enrollment).collect::<Vec<_>>()),
    ];
    Ok(DataFrame::new(columns)?)
}

pub fn index_to_frame(records: &[SourceIndexRecord]) -> Result<DataFrame> {
    let columns = vec![
        Column::new(SG_UF.into(), records.iter().map(|r| r.region.as_str()).collect::<Vec<_>>()),
        Column::new(CO_MUNICIPIO.into(), records.iter().map(|r| r.municipality_code.as_str()).collect::<Vec<_>>()),
        Column::new(NO_MUNICIPIO.into(), records.iter().map(|r| r.municipality_name.as_str()).collect::<Vec<_>>()),
        Column::new(VL_OBSERVADO_2023.into(), records.iter().map(|r| r.observed).collect::<Vec<_>>()),
        Column::new(VL_PROJECAO_2021.into(), records.iter().map(|r| r.target).collect::<Vec<_>>()),
        Column::new(REDE.into(), records.iter().map(|r| r.network.as_str()).collect::<Vec<_>>()),
        Column::new(ACIMA_META_LEGACY.into(), records.iter().map(|r| r.above_target()).collect::<Vec<_>>()),
    ];
    Ok(DataFrame::new(columns)?)
}

// =============================================================================
// Frames to rows (all-text frames read back from disk)
// =============================================================================

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|column| column.as_str() == name)
}

fn decimals(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    Ok(text_values(df, name)?
        .into_iter()
        .map(|value| value.as_deref().and_then(parse_decimal))
        .collect())
}

fn optional_decimals(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    if has_column(df, name) {
        decimals(df, name)
    } else {
        Ok(vec![None; df.height()])
    }
}

fn grades(df: &DataFrame) -> Result<Vec<Option<Grade>>> {
    Ok(decimals(df, ANO_ESCOLAR)?
        .into_iter()
        .map(|value| value.and_then(|v| u8::try_from(v as i64).ok()).and_then(Grade::new))
        .collect())
}

fn labels(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    Ok(text_values(df, name)?
        .into_iter()
        .map(|value| value.map(|v| v.trim().to_string()).unwrap_or_default())
        .collect())
}

fn codes(df: &DataFrame) -> Result<Vec<String>> {
    Ok(text_values(df, CO_MUNICIPIO)?
        .into_iter()
        .map(|value| value.map(|v| canonical_code(&v)).unwrap_or_default())
        .collect())
}

/// Read fact rows from an all-text frame; index columns are optional.
pub fn facts_from_frame(df: &DataFrame) -> Result<Vec<FactRow>> {
    let codes = codes(df)?;
    let names = labels(df, NO_MUNICIPIO)?;
    let regions = labels(df, SG_UF)?;
    let networks = labels(df, REDE)?;
    let grades = grades(df)?;
    let enrollment = decimals(df, QT_MATRICULAS)?;
    let dropout = decimals(df, TAXA_EVASAO)?;
    let approval = decimals(df, TAXA_APROVACAO)?;
    let retention = decimals(df, TAXA_REPROVACAO)?;
    let dropout_count = decimals(df, EVASAO_ABSOLUTA)?;
    let approval_count = decimals(df, APROVADOS_ABSOLUTOS)?;
    let retention_count = decimals(df, REPROVADOS_ABSOLUTOS)?;
    let observed = optional_decimals(df, VL_OBSERVADO_2023)?;
    let target = optional_decimals(df, VL_PROJECAO_2021)?;
    let above: Vec<Option<bool>> = if has_column(df, ACIMA_META) {
        text_values(df, ACIMA_META)?
            .into_iter()
            .map(|value| value.as_deref().and_then(parse_bool))
            .collect()
    } else {
        vec![None; df.height()]
    };

    let mut facts = Vec::with_capacity(df.height());
    let mut invalid = 0;
    for i in 0..df.height() {
        let (Some(network), Some(grade)) = (Network::from_label(&networks[i]), grades[i]) else {
            invalid += 1;
            continue;
        };
        facts.push(FactRow {
            municipality_code: codes[i].clone(),
            municipality_name: names[i].clone(),
            region: regions[i].clone(),
            network,
            grade,
            enrollment: enrollment[i].map(|v| v.max(0.0) as i64).unwrap_or(0),
            dropout_rate: dropout[i],
            approval_rate: approval[i],
            retention_rate: retention[i],
            dropout_count: dropout_count[i].unwrap_or(0.0),
            approval_count: approval_count[i].unwrap_or(0.0),
            retention_count: retention_count[i].unwrap_or(0.0),
            observed_index: observed[i],
            target_index: target[i],
            above_target: above[i],
        });
    }

    if invalid > 0 {
        warn!("Skipped {} fact rows with an unknown network or grade", invalid);
    }
    Ok(facts)
}

/// Read enrollment rows from an all-text frame.
pub fn enrollment_from_frame(df: &DataFrame) -> Result<Vec<EnrollmentRow>> {
    let codes = codes(df)?;
    let names = labels(df, NO_MUNICIPIO)?;
    let regions = labels(df, SG_UF)?;
    let networks = labels(df, REDE)?;
    let grades = grades(df)?;
    let enrollment = decimals(df, QT_MATRICULAS)?;

    let mut rows = Vec::with_capacity(df.height());
    for i in 0..df.height() {
        let (Some(network), Some(grade)) = (Network::from_label(&networks[i]), grades[i]) else {
            continue;
        };
        rows.push(EnrollmentRow {
            municipality_code: codes[i].clone(),
            municipality_name: names[i].clone(),
            region: regions[i].clone(),
            network,
            grade,
            enrollment: enrollment[i].map(|v| v.max(0.0) as i64).unwrap_or(0),
        });
    }
    Ok(rows)
}

/// Read index records from an all-text frame.
///
/// The above-target flag is recomputed from the values rather than trusted.
pub fn index_from_frame(df: &DataFrame) -> Result<Vec<SourceIndexRecord>> {
    let regions = labels(df, SG_UF)?;
    let codes = codes(df)?;
    let names = labels(df, NO_MUNICIPIO)?;
    let observed = decimals(df, VL_OBSERVADO_2023)?;
    let target = decimals(df, VL_PROJECAO_2021)?;
    let networks = labels(df, REDE)?;

    Ok((0..df.height())
        .map(|i| SourceIndexRecord {
            region: regions[i].clone(),
            municipality_code: codes[i].clone(),
            municipality_name: names[i].clone(),
            observed: observed[i],
            target: target[i],
            network: networks[i].clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(name: &str, network: Network, grade: Grade) -> FactRow {
        FactRow::from_enrollment(&EnrollmentRow {
            municipality_code: "1".into(),
            municipality_name: name.into(),
            region: "ES".into(),
            network,
            grade,
            enrollment: 10,
        })
    }

    #[test]
    fn test_sort_facts() {
        let mut facts = vec![
            fact("Vitória", Network::Estadual, Grade::SEVENTH),
            fact("Afonso Cláudio", Network::Municipal, Grade::SIXTH),
            fact("Vitória", Network::Estadual, Grade::SIXTH),
            fact("Afonso Cláudio", Network::Estadual, Grade::NINTH),
        ];
        sort_facts(&mut facts);

        let order: Vec<(&str, Network, u8)> = facts
            .iter()
            .map(|f| (f.municipality_name.as_str(), f.network, f.grade.value()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Afonso Cláudio", Network::Estadual, 9),
                ("Afonso Cláudio", Network::Municipal, 6),
                ("Vitória", Network::Estadual, 6),
                ("Vitória", Network::Estadual, 7),
            ]
        );
    }

    #[test]
    fn test_facts_to_frame_layout() {
        let facts = vec![fact("Vitória", Network::Estadual, Grade::SIXTH)];

        let df = facts_to_frame(&facts, false).unwrap();
        assert_eq!(df.get_column_names_str(), FACT_COLUMNS.to_vec());

        let df = facts_to_frame(&facts, true).unwrap();
        assert_eq!(df.width(), 15);
        assert_eq!(df.column(ACIMA_META).unwrap().null_count(), 1);
    }

    #[test]
    fn test_facts_from_text_frame() {
        let df = df! {
            CO_MUNICIPIO => ["3205309"],
            NO_MUNICIPIO => ["Vitória"],
            SG_UF => ["ES"],
            REDE => ["Municipal"],
            ANO_ESCOLAR => ["6"],
            QT_MATRICULAS => ["100"],
            TAXA_EVASAO => ["0.02"],
            TAXA_APROVACAO => ["0.9"],
            TAXA_REPROVACAO => [""],
            EVASAO_ABSOLUTA => ["2.0"],
            APROVADOS_ABSOLUTOS => ["90.0"],
            REPROVADOS_ABSOLUTOS => ["0.0"],
        }
        .unwrap();

        let facts = facts_from_frame(&df).unwrap();

        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].grade, Grade::SIXTH);
        assert_eq!(facts[0].approval_rate, Some(0.9));
        assert_eq!(facts[0].retention_rate, None);
        assert_eq!(facts[0].above_target, None);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool(""), None);
    }
}
