//! Locale-specific amount and date parsing, declared per institution.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::str::FromStr;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥', '₣'];

/// Decimal and digit-grouping separators of one export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    pub decimal: char,
    pub grouping: Option<char>,
}

impl NumberFormat {
    /// `1,234.56`
    pub const DOT_DECIMAL: NumberFormat = NumberFormat { decimal: '.', grouping: Some(',') };
    /// `1.234,56`
    pub const COMMA_DECIMAL: NumberFormat = NumberFormat { decimal: ',', grouping: Some('.') };
    /// `1'234.56`
    pub const SWISS: NumberFormat = NumberFormat { decimal: '.', grouping: Some('\'') };
    /// `1234.56`, no grouping allowed (machine exports, JSON)
    pub const PLAIN: NumberFormat = NumberFormat { decimal: '.', grouping: None };
}

fn is_decoration(c: char) -> bool {
    c.is_whitespace() || c.is_alphabetic() || CURRENCY_SYMBOLS.contains(&c)
}

/// Parse a signed amount such as `-$1,234.56`, `CHF 1'234.50`, `(12.00)` or `50.00-`.
///
/// Currency codes and symbols around the number are ignored; anything else
/// that is not a digit or separator is an error.
pub fn parse_amount(raw: &str, format: NumberFormat) -> Result<Decimal, String> {
    let mut s = raw.trim().replace('\u{2212}', "-");
    let mut negative = false;

    if s.starts_with('(') && s.ends_with(')') && s.len() >= 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }

    let mut core = s.trim_matches(is_decoration);
    if let Some(rest) = core.strip_prefix('-') {
        negative = !negative;
        core = rest.trim_matches(is_decoration);
    } else if let Some(rest) = core.strip_prefix('+') {
        core = rest.trim_matches(is_decoration);
    }
    if let Some(rest) = core.strip_suffix('-') {
        negative = !negative;
        core = rest.trim_matches(is_decoration);
    }

    if core.is_empty() || !core.chars().any(|c| c.is_ascii_digit()) {
        return Err("no digits".to_string());
    }

    let (int_part, frac_part) = match core.rfind(format.decimal) {
        Some(idx) => (&core[..idx], Some(&core[idx + format.decimal.len_utf8()..])),
        None => (core, None),
    };

    let int_digits = match format.grouping {
        Some(sep) if int_part.contains(sep) => {
            let groups: Vec<&str> = int_part.split(sep).collect();
            let well_formed = !groups[0].is_empty()
                && groups[0].len() <= 3
                && groups[1..].iter().all(|g| g.len() == 3);
            if !well_formed {
                return Err(format!("misplaced grouping separator {sep:?}"));
            }
            groups.concat()
        }
        _ => int_part.to_string(),
    };

    let frac_digits = frac_part.unwrap_or("");
    let valid = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if !valid(&int_digits) || !valid(frac_digits) {
        return Err(format!("unexpected characters in {core:?}"));
    }

    let normalized = match frac_part {
        Some(frac) => format!("{}.{}", if int_digits.is_empty() { "0" } else { &int_digits }, frac),
        None => int_digits,
    };
    let value = Decimal::from_str(&normalized).map_err(|e| e.to_string())?;
    Ok(if negative { -value } else { value })
}

/// How an institution writes its dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// A full chrono pattern such as `%d-%m-%Y`.
    Pattern(&'static str),
    /// Day and month only (`%b %d`, `%m/%d`); the year comes from the
    /// statement's reference date, rolling back one year for rows that
    /// would otherwise land after it (December rows on a January statement).
    MonthDay(&'static str),
    /// ISO 8601 date-time; only the calendar date is kept.
    IsoDateTime,
}

pub fn parse_date(raw: &str, format: DateFormat, reference: Option<NaiveDate>) -> Result<NaiveDate, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty date".to_string());
    }
    match format {
        DateFormat::Pattern(pattern) => {
            NaiveDate::parse_from_str(s, pattern).map_err(|e| format!("expected {pattern}: {e}"))
        }
        DateFormat::IsoDateTime => {
            let date_part = s.split(['T', ' ']).next().unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|e| format!("expected ISO 8601: {e}"))
        }
        DateFormat::MonthDay(pattern) => {
            let reference = reference.ok_or_else(|| "year unknown: statement has no reference date".to_string())?;
            let with_year = |year: i32| NaiveDate::parse_from_str(&format!("{s} {year}"), &format!("{pattern} %Y"));
            match with_year(reference.year()) {
                Ok(date) if date <= reference => Ok(date),
                _ => with_year(reference.year() - 1).map_err(|e| format!("expected {pattern}: {e}")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_amount_dot_decimal() {
        let f = NumberFormat::DOT_DECIMAL;
        assert_eq!(parse_amount("1,234.56", f).unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("-$5,000.00", f).unwrap(), dec("-5000.00"));
        assert_eq!(parse_amount("- $14.05", f).unwrap(), dec("-14.05"));
        assert_eq!(parse_amount("$-14.05", f).unwrap(), dec("-14.05"));
        assert_eq!(parse_amount("+1200.00", f).unwrap(), dec("1200.00"));
        assert_eq!(parse_amount("(12.00)", f).unwrap(), dec("-12.00"));
        assert_eq!(parse_amount("USD 7", f).unwrap(), dec("7"));
        assert_eq!(parse_amount(".5", f).unwrap(), dec("0.5"));
    }

    #[test]
    fn test_parse_amount_other_locales() {
        assert_eq!(parse_amount("1.234,56", NumberFormat::COMMA_DECIMAL).unwrap(), dec("1234.56"));
        assert_eq!(parse_amount("-1,75", NumberFormat::COMMA_DECIMAL).unwrap(), dec("-1.75"));
        assert_eq!(parse_amount("CHF 1'234.50", NumberFormat::SWISS).unwrap(), dec("1234.50"));
        assert_eq!(parse_amount("50.00-", NumberFormat::SWISS).unwrap(), dec("-50.00"));
        assert_eq!(parse_amount("\u{2212}3.20", NumberFormat::PLAIN).unwrap(), dec("-3.20"));
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        let f = NumberFormat::DOT_DECIMAL;
        assert!(parse_amount("", f).is_err());
        assert!(parse_amount("n/a", f).is_err());
        assert!(parse_amount("12e5", f).is_err());
        assert!(parse_amount("1-2", f).is_err());
        // comma-decimal value read with the wrong locale
        assert!(parse_amount("12,50", f).is_err());
        assert!(parse_amount("1,000", NumberFormat::PLAIN).is_err());
    }

    #[test]
    fn test_parse_date_pattern() {
        let d = parse_date("28-09-2023", DateFormat::Pattern("%d-%m-%Y"), None).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2023, 9, 28).unwrap());
        assert!(parse_date("13/45/2024", DateFormat::Pattern("%m/%d/%Y"), None).is_err());
    }

    #[test]
    fn test_parse_date_iso_datetime() {
        let d = parse_date("2024-01-05T12:34:56", DateFormat::IsoDateTime, None).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
        let d = parse_date("2024-01-05T12:34:56Z", DateFormat::IsoDateTime, None).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());
    }

    #[test]
    fn test_parse_date_month_day_rolls_back_year() {
        let reference = NaiveDate::from_ymd_opt(2024, 1, 14);
        let jan = parse_date("Jan 03", DateFormat::MonthDay("%b %d"), reference).unwrap();
        assert_eq!(jan, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        let dec = parse_date("Dec 20", DateFormat::MonthDay("%b %d"), reference).unwrap();
        assert_eq!(dec, NaiveDate::from_ymd_opt(2023, 12, 20).unwrap());
        let slash = parse_date("04/22", DateFormat::MonthDay("%m/%d"), NaiveDate::from_ymd_opt(2026, 5, 1)).unwrap();
        assert_eq!(slash, NaiveDate::from_ymd_opt(2026, 4, 22).unwrap());
        assert!(parse_date("Jan 03", DateFormat::MonthDay("%b %d"), None).is_err());
    }
}
