//! Shared utilities for the consolidation pipeline.
//!
//! Small, allocation-light helpers used by the coercion stage, the source
//! readers and the presentation-side reports.

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Marker the index extract uses for "no data".
pub const NO_DATA_SENTINEL: &str = "-";

/// Other cell contents that mean "missing" in the statistical extracts.
pub const MISSING_MARKERS: [&str; 6] = ["--", "nan", "null", "n/a", "na", "#n/a"];

/// Check if a trimmed cell is empty or one of the known missing markers.
pub fn is_missing_marker(s: &str) -> bool {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed == NO_DATA_SENTINEL {
        return true;
    }
    let lower = trimmed.to_ascii_lowercase();
    MISSING_MARKERS.iter().any(|&marker| lower == marker)
}

/// Parse a decimal number, accepting a decimal comma when no point is present.
///
/// Returns `None` for empty cells, missing markers and anything that is not
/// a finite number.
///
/// # Example
///
/// ```rust,ignore
/// use edu_indicators::utils::parse_decimal;
///
/// assert_eq!(parse_decimal(" 98.4 "), Some(98.4));
/// assert_eq!(parse_decimal("5,8"), Some(5.8));
/// assert_eq!(parse_decimal("-"), None);
/// ```
pub fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if is_missing_marker(trimmed) {
        return None;
    }

    let parsed = match trimmed.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) if !trimmed.contains('.') && trimmed.matches(',').count() == 1 => {
            trimmed.replace(',', ".").parse::<f64>().ok()
        }
        Err(_) => None,
    };

    parsed.filter(|value| value.is_finite())
}

/// Canonical text form of a numeric identifier (municipality or dependency code).
///
/// Spreadsheet readers hand integer codes back as floats, so `"3205309.0"`
/// and `"3205309"` must compare equal. Non-numeric codes are only trimmed.
pub fn canonical_code(s: &str) -> String {
    let trimmed = s.trim();
    if let Some((whole, fraction)) = trimmed.split_once('.')
        && !whole.is_empty()
        && whole.chars().all(|c| c.is_ascii_digit())
        && fraction.chars().all(|c| c == '0')
    {
        return whole.to_string();
    }
    trimmed.to_string()
}

// =============================================================================
// Display Utilities
// =============================================================================

/// Format a number with `.` as the thousands separator and `,` for decimals.
///
/// Missing or non-finite values render as `"N/A"`.
pub fn format_number(value: Option<f64>, decimals: usize) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "N/A".to_string();
    };

    let formatted = format!("{:.*}", decimals, value.abs());
    let (integer, fraction) = match formatted.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(integer.len() + integer.len() / 3);
    for (i, digit) in integer.chars().enumerate() {
        if i > 0 && (integer.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match fraction {
        Some(fraction) => format!("{}{},{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_missing_marker() {
        assert!(is_missing_marker(""));
        assert!(is_missing_marker("  "));
        assert!(is_missing_marker("-"));
        assert!(is_missing_marker("--"));
        assert!(is_missing_marker("NaN"));
        assert!(!is_missing_marker("0"));
        assert!(!is_missing_marker("5.8"));
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("42"), Some(42.0));
        assert_eq!(parse_decimal(" 98.4 "), Some(98.4));
        assert_eq!(parse_decimal("5,8"), Some(5.8));
        assert_eq!(parse_decimal("-3.5"), Some(-3.5));
        assert_eq!(parse_decimal("-"), None);
        assert_eq!(parse_decimal("1,234.5"), None);
        assert_eq!(parse_decimal("abc"), None);
        assert_eq!(parse_decimal("inf"), None);
    }

    #[test]
    fn test_canonical_code() {
        assert_eq!(canonical_code("3205309"), "3205309");
        assert_eq!(canonical_code(" 3205309.0 "), "3205309");
        assert_eq!(canonical_code("3205309.00"), "3205309");
        assert_eq!(canonical_code("2"), "2");
        assert_eq!(canonical_code("32.5"), "32.5");
        assert_eq!(canonical_code("ES"), "ES");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(Some(1234567.891), 2), "1.234.567,89");
        assert_eq!(format_number(Some(999.0), 0), "999");
        assert_eq!(format_number(Some(1000.0), 0), "1.000");
        assert_eq!(format_number(Some(-4200.5), 1), "-4.200,5");
        assert_eq!(format_number(None, 2), "N/A");
        assert_eq!(format_number(Some(f64::NAN), 2), "N/A");
    }
}
