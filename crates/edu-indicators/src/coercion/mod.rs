//! Type coercion for raw source tables.
//!
//! Source readers hand back every column as text. This module turns the
//! columns a source declares into their working types:
//! - enrollment counts to non-negative `Int64` (zero-filled)
//! - index and target values to nullable `Float64` (sentinel aware)
//! - percentage rates to nullable fractions
//! - identifier codes to their canonical text form
//!
//! No value-level failure escapes this stage.

mod converters;

use crate::error::Result;
use crate::utils::parse_decimal;
use converters::{string_to_code, string_to_count, string_to_index_value, string_to_rate, trim_text};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a single raw column is coerced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnCoercion {
    /// Non-negative integer, 0 when missing.
    Count,
    /// Floating point, `"-"` means null.
    IndexValue,
    /// Percentage divided by 100, null when missing.
    Rate,
    /// Canonical identifier text.
    Code,
    /// Trimmed label.
    Text,
}

/// Applies a per-column coercion plan to a raw DataFrame.
pub struct TypeCoercer;

impl TypeCoercer {
    /// Coerce the listed columns in place; columns not in the plan are left untouched.
    ///
    /// Returns the coerced frame and one step message per column that lost
    /// values to null or zero, for the run log.
    pub fn coerce(
        &self,
        df: DataFrame,
        plan: &[(&str, ColumnCoercion)],
    ) -> Result<(DataFrame, Vec<String>)> {
        let mut df = df;
        let mut steps = Vec::new();

        for &(col_name, coercion) in plan {
            let series = df.column(col_name)?.as_materialized_series().clone();
            let series = if series.dtype() == &DataType::String {
                series
            } else {
                series.cast(&DataType::String)?
            };
            let raw_present = series
                .str()?
                .into_iter()
                .filter(|v| v.is_some_and(|text| !text.trim().is_empty()))
                .count();

            let coerced = match coercion {
                ColumnCoercion::Count => string_to_count(&series)?,
                ColumnCoercion::IndexValue => string_to_index_value(&series)?,
                ColumnCoercion::Rate => string_to_rate(&series)?,
                ColumnCoercion::Code => string_to_code(&series)?,
                ColumnCoercion::Text => trim_text(&series)?,
            };

            let degraded = match coercion {
                ColumnCoercion::Count => count_zero_filled(&series, &coerced)?,
                _ => raw_present.saturating_sub(coerced.len() - coerced.null_count()),
            };
            if degraded > 0 {
                let step = format!(
                    "Column '{}': {} value(s) coerced to {}",
                    col_name,
                    degraded,
                    if coercion == ColumnCoercion::Count { "0" } else { "null" }
                );
                debug!("  {}", step);
                steps.push(step);
            }

            df.replace(col_name, coerced)?;
        }

        Ok((df, steps))
    }
}

/// Count cells that held text but came out as 0 without being a literal zero.
fn count_zero_filled(raw: &Series, coerced: &Series) -> Result<usize> {
    let raw = raw.str()?;
    let coerced = coerced.i64()?;

    let filled = raw
        .into_iter()
        .zip(coerced.into_iter())
        .filter(|(raw, value)| match (raw, value) {
            (Some(text), Some(0)) if !text.trim().is_empty() => {
                parse_decimal(text).is_none_or(|v| v < 0.0)
            }
            _ => false,
        })
        .count();
    Ok(filled)
}
