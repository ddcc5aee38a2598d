//! Column converters from raw text to typed polars series.
//!
//! Every converter accepts a `String` series and never fails on a value:
//! unparseable cells degrade to null (or zero for counts).

use crate::error::Result;
use crate::utils::{NO_DATA_SENTINEL, canonical_code, parse_decimal};
use polars::prelude::*;

/// Convert enrollment counts to non-null `Int64`.
///
/// Missing or non-numeric cells become 0, fractional values are truncated
/// (`"12.0"` becomes 12) and negative values are clamped to 0.
pub(crate) fn string_to_count(series: &Series) -> Result<Series> {
    let str_series = series.str()?;
    let mut result_vec: Vec<i64> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        let count = opt_val
            .and_then(parse_decimal)
            .map(|value| value.trunc().max(0.0) as i64)
            .unwrap_or(0);
        result_vec.push(count);
    }

    Ok(Series::new(series.name().clone(), result_vec))
}

/// Convert index or target values to nullable `Float64`.
///
/// The no-data sentinel `"-"` and unparseable cells become null.
pub(crate) fn string_to_index_value(series: &Series) -> Result<Series> {
    let str_series = series.str()?;
    let mut result_vec: Vec<Option<f64>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) if val.trim() == NO_DATA_SENTINEL => result_vec.push(None),
            Some(val) => result_vec.push(parse_decimal(val)),
            None => result_vec.push(None),
        }
    }

    Ok(Series::new(series.name().clone(), result_vec))
}

/// Convert a percentage column to a nullable fraction (`98.4` becomes `0.984`).
///
/// Fractions are clamped to `[0, 1]`: `-2` becomes 0 and `104` becomes 1.
pub(crate) fn string_to_rate(series: &Series) -> Result<Series> {
    let str_series = series.str()?;
    let mut result_vec: Vec<Option<f64>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        result_vec.push(opt_val.and_then(parse_decimal).map(|pct| (pct / 100.0).clamp(0.0, 1.0)));
    }

    Ok(Series::new(series.name().clone(), result_vec))
}

/// Canonicalise identifier codes; empty cells become null.
pub(crate) fn string_to_code(series: &Series) -> Result<Series> {
    let str_series = series.str()?;
    let mut result_vec: Vec<Option<String>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val.map(canonical_code) {
            Some(code) if !code.is_empty() => result_vec.push(Some(code)),
            _ => result_vec.push(None),
        }
    }

    Ok(Series::new(series.name().clone(), result_vec))
}

/// Trim surrounding whitespace from labels; empty cells become null.
pub(crate) fn trim_text(series: &Series) -> Result<Series> {
    let str_series = series.str()?;
    let mut result_vec: Vec<Option<&str>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val.map(str::trim) {
            Some(val) if !val.is_empty() => result_vec.push(Some(val)),
            _ => result_vec.push(None),
        }
    }

    Ok(Series::new(series.name().clone(), result_vec))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_null_at(series: &Series, idx: usize) -> bool {
        matches!(series.get(idx).unwrap(), AnyValue::Null)
    }

    fn f64_at(series: &Series, idx: usize) -> f64 {
        series.get(idx).unwrap().try_extract::<f64>().unwrap()
    }

    // ========================================================================
    // string_to_count()
    // ========================================================================

    #[test]
    fn test_count_fills_zero() {
        let series = Series::new("QT_MAT_FUND_AF_6".into(), &[Some("12"), Some("abc"), None, Some("")]);
        let result = string_to_count(&series).unwrap();

        assert_eq!(result.dtype(), &DataType::Int64);
        assert_eq!(result.null_count(), 0);
        let values: Vec<i64> = result.i64().unwrap().into_no_null_iter().collect();
        assert_eq!(values, vec![12, 0, 0, 0]);
    }

    #[test]
    fn test_count_accepts_float_text_and_clamps() {
        let series = Series::new("QT".into(), &["12.0", " 7 ", "-3", "4,0"]);
        let result = string_to_count(&series).unwrap();

        let values: Vec<i64> = result.i64().unwrap().into_no_null_iter().collect();
        assert_eq!(values, vec![12, 7, 0, 4]);
    }

    // ========================================================================
    // string_to_index_value()
    // ========================================================================

    #[test]
    fn test_index_value_sentinel_is_null() {
        let series = Series::new("VL_OBSERVADO_2023".into(), &["5.8", "-", " - ", "5,5", "n/d"]);
        let result = string_to_index_value(&series).unwrap();

        assert_eq!(result.dtype(), &DataType::Float64);
        assert_eq!(f64_at(&result, 0), 5.8);
        assert!(is_null_at(&result, 1));
        assert!(is_null_at(&result, 2));
        assert_eq!(f64_at(&result, 3), 5.5);
        assert!(is_null_at(&result, 4));
    }

    // ========================================================================
    // string_to_rate()
    // ========================================================================

    #[test]
    fn test_rate_divides_by_hundred() {
        let series = Series::new("1_CAT_FUN_06".into(), &[Some("98.4"), Some("100"), Some("--"), None]);
        let result = string_to_rate(&series).unwrap();

        assert!((f64_at(&result, 0) - 0.984).abs() < 1e-12);
        assert_eq!(f64_at(&result, 1), 1.0);
        assert!(is_null_at(&result, 2));
        assert!(is_null_at(&result, 3));
    }

    #[test]
    fn test_rate_is_clamped_to_unit_interval() {
        let series = Series::new("3_CAT_FUN_09".into(), &["-2", "104", "0", "100.0"]);
        let result = string_to_rate(&series).unwrap();

        assert_eq!(f64_at(&result, 0), 0.0);
        assert_eq!(f64_at(&result, 1), 1.0);
        assert_eq!(f64_at(&result, 2), 0.0);
        assert_eq!(f64_at(&result, 3), 1.0);
    }

    // ========================================================================
    // string_to_code() / trim_text()
    // ========================================================================

    #[test]
    fn test_code_canonical_form() {
        let series = Series::new("CO_MUNICIPIO".into(), &[Some("3205309.0"), Some(" 3205309 "), Some(""), None]);
        let result = string_to_code(&series).unwrap();
        let values: Vec<Option<&str>> = result.str().unwrap().into_iter().collect();

        assert_eq!(values, vec![Some("3205309"), Some("3205309"), None, None]);
    }

    #[test]
    fn test_trim_text() {
        let series = Series::new("REDE".into(), &[" Estadual ", "   ", "Municipal"]);
        let result = trim_text(&series).unwrap();
        let values: Vec<Option<&str>> = result.str().unwrap().into_iter().collect();

        assert_eq!(values, vec![Some("Estadual"), None, Some("Municipal")]);
    }
}
