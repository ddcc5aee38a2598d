//! Source loading for the three statistical extracts.
//!
//! Each extract is read into an all-text [`DataFrame`] restricted to the
//! columns the pipeline needs, coerced with [`crate::coercion::TypeCoercer`]
//! and lifted into typed records:
//! - [`index`]: index value and target per municipality and network
//! - [`enrollment`]: per-school enrollment census
//! - [`rates`]: approval, retention and dropout percentages
//!
//! Workbooks (`.xlsx`, `.xlsm`, `.xlsb`, `.xls`, `.ods`) go through
//! [`spreadsheet`]; any other extension is treated as delimited text.

mod delimited;
pub mod enrollment;
pub mod index;
pub mod rates;
mod spreadsheet;

use crate::config::SourceConfig;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::debug;

/// Which of the three extracts a value or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Index,
    Enrollment,
    Rates,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Index => "index",
            SourceKind::Enrollment => "enrollment",
            SourceKind::Rates => "rates",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed records of one source plus what happened while loading them.
#[derive(Debug, Clone)]
pub struct LoadedSource<T> {
    pub records: Vec<T>,
    /// Data rows read below the header.
    pub raw_rows: usize,
    /// Rows dropped because they carry no municipality code.
    pub rows_without_code: usize,
    /// Per-column coercion notes.
    pub coercion_steps: Vec<String>,
}

impl<T> LoadedSource<T> {
    /// Wrap records that were built in memory rather than read from a file.
    pub fn from_records(records: Vec<T>) -> Self {
        Self {
            raw_rows: records.len(),
            records,
            rows_without_code: 0,
            coercion_steps: Vec::new(),
        }
    }
}

const SPREADSHEET_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Whether a path is read as a workbook rather than delimited text.
pub fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SPREADSHEET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Read the required columns of a source as text, in `required` order.
pub fn load_raw(kind: SourceKind, source: &SourceConfig, required: &[&str]) -> Result<DataFrame> {
    if !source.path.is_file() {
        return Err(PipelineError::SourceNotFound {
            kind,
            path: source.path.clone(),
        });
    }

    let df = if is_spreadsheet(&source.path) {
        debug!("Reading {} workbook {} (sheet '{}')", kind, source.path.display(), source.sheet);
        spreadsheet::read_sheet(kind, &source.path, &source.sheet, source.skip_rows, required)?
    } else {
        debug!("Reading {} delimited file {}", kind, source.path.display());
        delimited::read_delimited(kind, source, required)?
    };

    debug!("{} source: {} rows x {} columns", kind, df.height(), df.width());
    Ok(df)
}

// =============================================================================
// Column extraction
// =============================================================================

pub(crate) fn text_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let series = df.column(name)?.as_materialized_series();
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

pub(crate) fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let series = df.column(name)?.as_materialized_series();
    Ok(series.f64()?.into_iter().collect())
}

pub(crate) fn count_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    let series = df.column(name)?.as_materialized_series();
    Ok(series
        .i64()?
        .into_iter()
        .map(|value| value.unwrap_or(0))
        .collect())
}
