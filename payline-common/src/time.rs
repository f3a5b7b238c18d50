//! Timestamp and settlement-period utilities

use crate::{Error, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Settlement period (calendar month), written as `yyyy-MM`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    pub year: i32,
    pub month: u32,
}

impl Period {
    /// Parse `yyyy-MM` (a single-digit month is accepted)
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || Error::InvalidInput(format!("Invalid settlement period '{}' (expected yyyy-MM)", text));

        let (year, month) = text.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;

        Ok(Self { year, month })
    }

    /// First day of the period
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// First day of the following period (exclusive upper bound)
    pub fn next_first_day(&self) -> NaiveDate {
        let (year, month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MAX)
    }

    /// True when an ISO `yyyy-MM-dd` date string falls inside the period
    pub fn contains_iso(&self, iso_date: &str) -> bool {
        match NaiveDate::parse_from_str(iso_date, "%Y-%m-%d") {
            Ok(date) => date.year() == self.year && date.month() == self.month,
            Err(_) => false,
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_returns_valid_timestamp() {
        let timestamp = now();
        assert!(timestamp.timestamp() > 946_684_800); // 2000-01-01 00:00:00 UTC
    }

    #[test]
    fn test_period_parse_and_display() {
        let period = Period::parse("2024-3").unwrap();
        assert_eq!(period.to_string(), "2024-03");
        assert_eq!(Period::parse("2024-03").unwrap(), period);
    }

    #[test]
    fn test_period_rejects_bad_month() {
        assert!(Period::parse("2024-13").is_err());
        assert!(Period::parse("24-03").is_err());
        assert!(Period::parse("march").is_err());
    }

    #[test]
    fn test_period_bounds_wrap_year() {
        let period = Period::parse("2023-12").unwrap();
        assert_eq!(period.first_day().to_string(), "2023-12-01");
        assert_eq!(period.next_first_day().to_string(), "2024-01-01");
    }

    #[test]
    fn test_period_contains() {
        let period = Period::parse("2024-02").unwrap();
        assert!(period.contains_iso("2024-02-29"));
        assert!(!period.contains_iso("2024-03-01"));
        assert!(!period.contains_iso("not a date"));
    }
}
