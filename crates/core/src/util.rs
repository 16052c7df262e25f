//! Small shared helpers.

use chrono::NaiveDate;

/// Permissive date parsing for operator-entered cells.
///
/// Accepts the formats operators actually type; callers preserve the original
/// text when this returns `None`.
pub fn parse_loose_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    const FORMATS: [&str; 7] = [
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%d/%m/%Y",
        "%m/%d/%Y",
        "%d.%m.%Y",
        "%d-%b-%Y",
        "%B %d, %Y",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
}

/// Render an optional date the way the workbook shows it.
pub fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_formats() {
        let expected = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        assert_eq!(parse_loose_date("2026-03-14"), Some(expected));
        assert_eq!(parse_loose_date("2026/03/14"), Some(expected));
        assert_eq!(parse_loose_date("14.03.2026"), Some(expected));
        assert_eq!(parse_loose_date("14-Mar-2026"), Some(expected));
        assert_eq!(parse_loose_date("March 14, 2026"), Some(expected));
    }

    #[test]
    fn garbage_returns_none() {
        assert_eq!(parse_loose_date("next tuesday"), None);
        assert_eq!(parse_loose_date(""), None);
        assert_eq!(parse_loose_date("   "), None);
    }
}
