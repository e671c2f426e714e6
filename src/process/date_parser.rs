use chrono::NaiveDate;

/// Parse a cleaned cell with the dataset's strftime `format`
/// (e.g. `"%m/%d/%Y"` for report exports).
pub fn parse_date(s: &str, format: &str) -> Result<NaiveDate, chrono::ParseError> {
    NaiveDate::parse_from_str(s.trim(), format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_dates() {
        let d = parse_date("01/05/2024", "%m/%d/%Y").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let d = parse_date("2024/12/14", "%Y/%m/%d").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 12, 14).unwrap());
    }

    #[test]
    fn rejects_impossible_dates() {
        assert!(parse_date("02/30/2024", "%m/%d/%Y").is_err());
        assert!(parse_date("yesterday", "%m/%d/%Y").is_err());
    }
}
