//! Writers for the fact table, the legacy aggregates, the schema sidecar and
//! the run report.

use super::frames::{
    self, ACIMA_META, ANO_ESCOLAR, APROVADOS_ABSOLUTOS, CO_MUNICIPIO, EVASAO_ABSOLUTA, NO_MUNICIPIO,
    QT_MATRICULAS, REDE, REPROVADOS_ABSOLUTOS, SG_UF, TAXA_APROVACAO, TAXA_EVASAO, TAXA_REPROVACAO,
    VL_OBSERVADO_2023, VL_PROJECAO_2021,
};
use crate::config::OutputNames;
use crate::error::{PipelineError, Result};
use crate::pipeline::PipelineResult;
use crate::types::{EnrollmentRow, FactRow, SourceIndexRecord};
use chrono::Local;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

// ============================================================================
// Schema metadata
// ============================================================================

/// Description of one fact table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: String,
    pub nullable: bool,
    /// Unit of the stored value, when it has one.
    pub unit: Option<String>,
    pub description: String,
}

impl ColumnSchema {
    fn new(name: &str, dtype: &str, nullable: bool, unit: Option<&str>, description: &str) -> Self {
        Self {
            name: name.to_string(),
            dtype: dtype.to_string(),
            nullable,
            unit: unit.map(str::to_string),
            description: description.to_string(),
        }
    }
}

/// Sidecar describing the fact table layout.
///
/// Contains no timestamp, so unchanged inputs produce an identical file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub table: String,
    pub separator: String,
    pub encoding: String,
    pub grain: Vec<String>,
    pub sort_order: Vec<String>,
    pub columns: Vec<ColumnSchema>,
    /// How the index values relate to the grade grain.
    pub broadcast: String,
}

impl SchemaMetadata {
    pub fn for_fact_table(table: &str, include_index_columns: bool) -> Self {
        let mut columns = vec![
            ColumnSchema::new(CO_MUNICIPIO, "string", false, None, "Municipality code"),
            ColumnSchema::new(NO_MUNICIPIO, "string", false, None, "Municipality name"),
            ColumnSchema::new(SG_UF, "string", false, None, "Region (state) code"),
            ColumnSchema::new(REDE, "string", false, None, "Network: Estadual or Municipal"),
            ColumnSchema::new(ANO_ESCOLAR, "int", false, None, "Grade, 6 to 9"),
            ColumnSchema::new(QT_MATRICULAS, "int", false, Some("students"), "Enrollment"),
            ColumnSchema::new(TAXA_EVASAO, "float", true, Some("fraction"), "Dropout rate"),
            ColumnSchema::new(TAXA_APROVACAO, "float", true, Some("fraction"), "Approval rate"),
            ColumnSchema::new(TAXA_REPROVACAO, "float", true, Some("fraction"), "Retention rate"),
            ColumnSchema::new(
                EVASAO_ABSOLUTA,
                "float",
                false,
                Some("students"),
                "Enrollment x dropout rate, 0 when the rate is missing",
            ),
            ColumnSchema::new(
                APROVADOS_ABSOLUTOS,
                "float",
                false,
                Some("students"),
                "Enrollment x approval rate, 0 when the rate is missing",
            ),
            ColumnSchema::new(
                REPROVADOS_ABSOLUTOS,
                "float",
                false,
                Some("students"),
                "Enrollment x retention rate, 0 when the rate is missing",
            ),
        ];
        if include_index_columns {
            columns.push(ColumnSchema::new(
                VL_OBSERVADO_2023,
                "float",
                true,
                None,
                "Observed index value (broadcast)",
            ));
            columns.push(ColumnSchema::new(
                VL_PROJECAO_2021,
                "float",
                true,
                None,
                "Index target (broadcast)",
            ));
            columns.push(ColumnSchema::new(
                ACIMA_META,
                "bool",
                true,
                None,
                "Observed >= target; empty when either value is missing",
            ));
        }

        Self {
            table: table.to_string(),
            separator: ";".to_string(),
            encoding: "utf-8".to_string(),
            grain: vec![CO_MUNICIPIO.to_string(), REDE.to_string(), ANO_ESCOLAR.to_string()],
            sort_order: vec![NO_MUNICIPIO.to_string(), REDE.to_string(), ANO_ESCOLAR.to_string()],
            columns,
            broadcast: "The index and its target are published for the whole final cycle \
                        (grades 6-9), not per grade. The same observed value, target and \
                        above-target flag are repeated on all four grades of a municipality \
                        and network; they must not be summed or averaged across grades."
                .to_string(),
        }
    }
}

// ============================================================================
// Run report
// ============================================================================

/// JSON report of a whole run, written with `--emit-report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    /// Timestamp when the report was generated
    pub generated_at: String,
    #[serde(flatten)]
    pub result: &'a PipelineResult,
}

// ============================================================================
// Generator
// ============================================================================

/// Writes the fact table, the legacy aggregates and the metadata files.
pub struct ReportGenerator {
    output_dir: PathBuf,
    names: OutputNames,
}

impl Default for ReportGenerator {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("database"),
            names: OutputNames::default(),
        }
    }
}

impl ReportGenerator {
    pub fn new(output_dir: impl Into<PathBuf>, names: OutputNames) -> Self {
        Self {
            output_dir: output_dir.into(),
            names,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Write the fact table, sorted by municipality name, network and grade.
    pub fn write_fact_table(&self, facts: &[FactRow], include_index_columns: bool) -> Result<PathBuf> {
        let mut sorted = facts.to_vec();
        frames::sort_facts(&mut sorted);
        let mut df = frames::facts_to_frame(&sorted, include_index_columns)?;
        self.write_csv(&self.names.fact_table, &mut df)
    }

    /// Write the enrollment-long table in pipeline order.
    pub fn write_enrollment_aggregate(&self, rows: &[EnrollmentRow]) -> Result<PathBuf> {
        let mut df = frames::enrollment_to_frame(rows)?;
        self.write_csv(&self.names.enrollment_aggregate, &mut df)
    }

    /// Write the filtered index table with its above-target flag.
    pub fn write_index_aggregate(&self, records: &[SourceIndexRecord]) -> Result<PathBuf> {
        let mut df = frames::index_to_frame(records)?;
        self.write_csv(&self.names.index_aggregate, &mut df)
    }

    pub fn write_schema_metadata(&self, include_index_columns: bool) -> Result<PathBuf> {
        let metadata = SchemaMetadata::for_fact_table(&self.names.fact_table, include_index_columns);
        self.write_json(&self.names.schema_metadata, &metadata)
    }

    pub fn build_run_report(result: &PipelineResult) -> RunReport<'_> {
        RunReport {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            result,
        }
    }

    pub fn write_run_report(&self, report: &RunReport<'_>) -> Result<PathBuf> {
        self.write_json(&self.names.run_report, report)
    }

    fn write_csv(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(name);
        let mut file = File::create(&output_path)?;

        CsvWriter::new(&mut file)
            .include_header(true)
            .with_separator(b';')
            .with_quote_char(b'"')
            .finish(df)
            .map_err(|e| PipelineError::WriteFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Saved {} ({} rows): {}", name, df.height(), output_path.display());
        Ok(output_path)
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)?;
        let output_path = self.output_dir.join(name);
        let mut file = File::create(&output_path)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        file.write_all(b"\n")?;

        info!("Saved {}: {}", name, output_path.display());
        Ok(output_path)
    }
}
