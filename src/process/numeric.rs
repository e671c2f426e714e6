// src/process/numeric.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::process::utils::clean_str;

/// Unsigned (or `+`-prefixed) decimal magnitude.
static MAGNITUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?(\d+(\.\d*)?|\.\d+)$").expect("valid magnitude pattern"));

/// How a hyphen inside a numeric cell is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignConvention {
    /// Hyphen marks a negative reading: removed, then the magnitude is negated.
    #[default]
    NegativeMarker,
    /// Hyphen is export noise: removed, sign left untouched.
    Strip,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("no digits left after sanitization")]
    Empty,
    #[error("not a number")]
    NotNumeric,
    #[error("not an integer")]
    NotInteger,
}

/// Normalize a numeric cell into canonical form: commas removed, hyphens
/// resolved per `convention`. Digits are never reformatted, so `"12.30"`
/// stays `"12.30"`.
pub fn sanitize_numeric(raw: &str, convention: SignConvention) -> Result<String, SanitizeError> {
    let cleaned = clean_str(raw);
    let without_commas: String = cleaned.chars().filter(|c| *c != ',').collect();

    let has_marker = without_commas.contains('-');
    let magnitude: String = if has_marker {
        without_commas.chars().filter(|c| *c != '-').collect()
    } else {
        without_commas
    };

    if magnitude.is_empty() {
        return Err(SanitizeError::Empty);
    }
    if !MAGNITUDE.is_match(&magnitude) {
        return Err(SanitizeError::NotNumeric);
    }

    match (has_marker, convention) {
        (true, SignConvention::NegativeMarker) => Ok(negate(&magnitude)),
        _ => Ok(magnitude),
    }
}

/// [`sanitize_numeric`], then require a whole `i64`.
pub fn sanitize_integer(raw: &str, convention: SignConvention) -> Result<i64, SanitizeError> {
    let canonical = sanitize_numeric(raw, convention)?;
    canonical
        .parse::<i64>()
        .map_err(|_| SanitizeError::NotInteger)
}

/// Value identity of a canonical numeric string: `"+1.50"`, `"01.5"` and
/// `"1.5"` all give `"1.5"`, `"-0.0"` gives `"0"`.
pub fn normalize_decimal(canonical: &str) -> String {
    let (negative, digits) = match canonical.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, canonical.trim_start_matches('+')),
    };
    let (int, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let int = match int.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let frac = frac.trim_end_matches('0');

    let mut out = if frac.is_empty() {
        int.to_string()
    } else {
        format!("{int}.{frac}")
    };
    if negative && out != "0" {
        out.insert(0, '-');
    }
    out
}

fn negate(magnitude: &str) -> String {
    let unsigned = magnitude.trim_start_matches('+');
    // -0 is still 0
    if unsigned.chars().all(|c| c == '0' || c == '.') {
        return unsigned.to_string();
    }
    format!("-{unsigned}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use SignConvention::{NegativeMarker, Strip};

    #[test]
    fn strips_thousands_separators() {
        assert_eq!(sanitize_numeric("1,234", NegativeMarker).unwrap(), "1234");
        assert_eq!(
            sanitize_numeric("\"1,234,567.25\"", NegativeMarker).unwrap(),
            "1234567.25"
        );
    }

    #[test]
    fn comma_removal_keeps_digit_sequence() {
        for raw in ["1,000", "12,345.6", "9,9,9", "1,234,567,890"] {
            let out = sanitize_numeric(raw, Strip).unwrap();
            assert!(!out.contains(','));
            assert_eq!(out, raw.replace(',', ""));
        }
    }

    #[test]
    fn hyphen_as_negative_marker() {
        assert_eq!(sanitize_numeric("-56", NegativeMarker).unwrap(), "-56");
        assert_eq!(sanitize_numeric("1,234-", NegativeMarker).unwrap(), "-1234");
        assert_eq!(sanitize_numeric("12-.5", NegativeMarker).unwrap(), "-12.5");
    }

    #[test]
    fn hyphen_as_noise() {
        assert_eq!(sanitize_numeric("-56", Strip).unwrap(), "56");
        assert_eq!(sanitize_numeric("1,234-", Strip).unwrap(), "1234");
    }

    #[test]
    fn zero_stays_unsigned() {
        assert_eq!(sanitize_numeric("-0", NegativeMarker).unwrap(), "0");
        assert_eq!(sanitize_numeric("-0.00", NegativeMarker).unwrap(), "0.00");
    }

    #[test]
    fn plain_values_pass_through() {
        assert_eq!(sanitize_numeric("12.30", NegativeMarker).unwrap(), "12.30");
        assert_eq!(sanitize_numeric("+7", NegativeMarker).unwrap(), "+7");
        assert_eq!(sanitize_numeric(".5", NegativeMarker).unwrap(), ".5");
    }

    #[test]
    fn rejects_non_numeric() {
        assert_eq!(
            sanitize_numeric("abc", NegativeMarker),
            Err(SanitizeError::NotNumeric)
        );
        assert_eq!(
            sanitize_numeric("1.2.3", NegativeMarker),
            Err(SanitizeError::NotNumeric)
        );
        assert_eq!(
            sanitize_numeric("1e5", NegativeMarker),
            Err(SanitizeError::NotNumeric)
        );
        assert_eq!(sanitize_numeric("-", NegativeMarker), Err(SanitizeError::Empty));
        assert_eq!(sanitize_numeric(",", Strip), Err(SanitizeError::Empty));
    }

    #[test]
    fn integers() {
        assert_eq!(sanitize_integer("1,200", NegativeMarker).unwrap(), 1200);
        assert_eq!(sanitize_integer("-3", NegativeMarker).unwrap(), -3);
        assert_eq!(
            sanitize_integer("3.5", NegativeMarker),
            Err(SanitizeError::NotInteger)
        );
    }

    #[test]
    fn normalized_decimals_compare_by_value() {
        assert_eq!(normalize_decimal("1.0"), "1");
        assert_eq!(normalize_decimal("1"), "1");
        assert_eq!(normalize_decimal("+01.50"), "1.5");
        assert_eq!(normalize_decimal(".5"), "0.5");
        assert_eq!(normalize_decimal("-0.00"), "0");
        assert_eq!(normalize_decimal("-12.30"), "-12.3");
        assert_eq!(normalize_decimal("100"), "100");
    }
}
