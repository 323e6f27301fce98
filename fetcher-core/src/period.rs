//! Period selection: `latest` or an explicit inclusive date range.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FetchError;

/// Default look-back for `latest`; the brokerage portals export three months.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 93;

/// Inclusive calendar range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FetchError> {
        if start > end {
            return Err(FetchError::Configuration(format!(
                "period start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn overlaps(&self, other: &Period) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// What the caller asked for, before an adapter resolves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeriodSelector {
    #[default]
    Latest,
    Range(Period),
}

impl PeriodSelector {
    /// Resolve against `today`; `lookback_days` only applies to `Latest`.
    pub fn resolve(&self, today: NaiveDate, lookback_days: i64) -> Period {
        match self {
            PeriodSelector::Latest => Period {
                start: today - Duration::days(lookback_days.max(0)),
                end: today,
            },
            PeriodSelector::Range(p) => *p,
        }
    }
}

impl FromStr for PeriodSelector {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(PeriodSelector::Latest);
        }
        let (start, end) = s.split_once("..").ok_or_else(|| {
            FetchError::Configuration(format!(
                "period must be 'latest' or 'YYYY-MM-DD..YYYY-MM-DD', got {s:?}"
            ))
        })?;
        let parse = |d: &str| {
            NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d")
                .map_err(|e| FetchError::Configuration(format!("invalid period date {d:?}: {e}")))
        };
        Ok(PeriodSelector::Range(Period::new(parse(start)?, parse(end)?)?))
    }
}

impl fmt::Display for PeriodSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodSelector::Latest => f.write_str("latest"),
            PeriodSelector::Range(p) => p.fmt(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_latest_resolves_with_lookback() {
        let p = PeriodSelector::Latest.resolve(d(2024, 3, 31), DEFAULT_LOOKBACK_DAYS);
        assert_eq!(p.end, d(2024, 3, 31));
        assert_eq!(p.start, d(2023, 12, 29));
    }

    #[test]
    fn test_parse_range() {
        let sel: PeriodSelector = "2024-01-01..2024-01-31".parse().unwrap();
        let p = sel.resolve(d(2030, 1, 1), 10);
        assert_eq!(p, Period::new(d(2024, 1, 1), d(2024, 1, 31)).unwrap());
        assert_eq!(p.days(), 31);
        assert!(p.contains(d(2024, 1, 15)));
        assert!(!p.contains(d(2024, 2, 1)));
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let april = Period::new(d(2026, 4, 1), d(2026, 4, 30)).unwrap();
        let cycle = Period::new(d(2026, 4, 10), d(2026, 5, 9)).unwrap();
        assert!(april.overlaps(&cycle) && cycle.overlaps(&april));
        assert!(april.overlaps(&Period::new(d(2026, 4, 30), d(2026, 5, 30)).unwrap()));
        assert!(!april.overlaps(&Period::new(d(2023, 1, 1), d(2023, 1, 31)).unwrap()));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("yesterday".parse::<PeriodSelector>().is_err());
        assert!("2024-02-01..2024-01-01".parse::<PeriodSelector>().is_err());
        assert_eq!("LATEST".parse::<PeriodSelector>().unwrap(), PeriodSelector::Latest);
    }
}
