use crate::error::Diagnostic;
use crate::symbols::SymbolTable;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::Date;

/// Accepted `valid_from` / `valid_until` layouts, tried in order.
const DATE_FORMATS: &[&[BorrowedFormatItem<'static>]] = &[
    format_description!("[year]-[month padding:none]-[day padding:none]"),
    format_description!("[day padding:none]-[month padding:none]-[year]"),
    format_description!("[month padding:none]-[day padding:none]-[year]"),
    format_description!("[year]/[month padding:none]/[day padding:none]"),
    format_description!("[day padding:none]/[month padding:none]/[year]"),
    format_description!("[month padding:none]/[day padding:none]/[year]"),
    format_description!("[year].[month padding:none].[day padding:none]"),
    format_description!("[day padding:none].[month padding:none].[year]"),
    format_description!("[month repr:long case_sensitive:false] [day padding:none], [year]"),
    format_description!("[month repr:short case_sensitive:false] [day padding:none], [year]"),
];

/// Parse a validity date in any supported layout. Blank input is `None`.
pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| Date::parse(raw, format).ok())
}

/// True when `valid_until` lies strictly before `today`.
pub fn is_expired(valid_until: Option<Date>, today: Date) -> bool {
    valid_until.is_some_and(|d| d < today)
}

pub(super) fn check_user_validity(table: &SymbolTable, diags: &mut Vec<Diagnostic>) {
    for user in table.users() {
        let mut parse_field = |field: &str, value: Option<&String>| {
            let raw = value?;
            let parsed = parse_date(raw);
            if parsed.is_none() {
                diags.push(Diagnostic::warning(
                    user.line_number,
                    format!(
                        "User '{}' (line {}) has unrecognized {} date '{}'",
                        user.name, user.line_number, field, raw
                    ),
                ));
            }
            parsed
        };
        let from = parse_field("valid_from", user.valid_from.as_ref());
        let until = parse_field("valid_until", user.valid_until.as_ref());
        if let (Some(from), Some(until)) = (from, until) {
            if from > until {
                diags.push(Diagnostic::semantic(
                    user.line_number,
                    format!(
                        "User '{}' (line {}) has valid_from {} after valid_until {}",
                        user.name, user.line_number, from, until
                    ),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn accepts_all_supported_layouts() {
        let expected = date!(2025 - 02 - 01);
        for raw in [
            "2025-02-01",
            "01-02-2025",
            "2025/02/01",
            "01/02/2025",
            "2025.02.01",
            "01.02.2025",
            "February 1, 2025",
            "Feb 1, 2025",
            "february 1, 2025",
        ] {
            assert_eq!(parse_date(raw), Some(expected), "{}", raw);
        }
    }

    #[test]
    fn day_first_wins_over_month_first() {
        // 02-01-2025 reads as 2 January, like the ordered format list says
        assert_eq!(parse_date("02-01-2025"), Some(date!(2025 - 01 - 02)));
        // but month-first still applies when day-first is impossible
        assert_eq!(parse_date("12-31-2025"), Some(date!(2025 - 12 - 31)));
    }

    #[test]
    fn rejects_garbage_and_blank() {
        assert_eq!(parse_date("next tuesday"), None);
        assert_eq!(parse_date("   "), None);
        assert_eq!(parse_date("2025-13-01"), None);
    }

    #[test]
    fn expiry_is_strictly_before_today() {
        let today = date!(2025 - 06 - 15);
        assert!(is_expired(Some(date!(2025 - 06 - 14)), today));
        assert!(!is_expired(Some(today), today));
        assert!(!is_expired(None, today));
    }
}
