//! Field normalization: dates, amounts, booleans and enum tokens

use chrono::NaiveDate;
use payline_common::config::TokenConfig;
use payline_common::db::models::{ContactEventType, FeedType, FundType, ProjectStatus, TaskStatus};
use regex::Regex;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::resolver::normalize_token;

/// Unparseable or impossible date
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized date '{input}'")]
pub struct DateFormatError {
    pub input: String,
}

#[derive(Debug, Clone, Copy)]
enum DateOrder {
    /// year, month, day
    Ymd,
    /// two-digit year, month, day
    ShortYmd,
    /// month, day, year
    Mdy,
}

fn date_shapes() -> &'static [(Regex, DateOrder)] {
    static SHAPES: OnceLock<Vec<(Regex, DateOrder)>> = OnceLock::new();
    SHAPES.get_or_init(|| {
        [
            (r"^(\d{4})-(\d{1,2})-(\d{1,2})$", DateOrder::Ymd),
            (r"^(\d{4})/(\d{1,2})/(\d{1,2})$", DateOrder::Ymd),
            (r"^(\d{4})\.\s*(\d{1,2})\.\s*(\d{1,2})\.?$", DateOrder::Ymd),
            (r"^(\d{1,2})/(\d{1,2})/(\d{4})$", DateOrder::Mdy),
            (r"^(\d{2})/(\d{1,2})/(\d{1,2})$", DateOrder::ShortYmd),
        ]
        .into_iter()
        .filter_map(|(pattern, order)| Regex::new(pattern).ok().map(|re| (re, order)))
        .collect()
    })
}

/// Parse one of the accepted date shapes into ISO `yyyy-MM-dd`
///
/// Accepted: `yyyy-M-d`, `yyyy/M/d`, `yyyy.M.d` (trailing dot allowed),
/// `M/d/yyyy` and `yy/M/d` (read as 20yy). The calendar date must exist.
pub fn parse_date(input: &str) -> Result<String, DateFormatError> {
    let text = input.trim();
    let fail = || DateFormatError {
        input: text.to_string(),
    };

    for (re, order) in date_shapes() {
        let Some(caps) = re.captures(text) else {
            continue;
        };
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
        let (a, b, c) = (part(1).ok_or_else(fail)?, part(2).ok_or_else(fail)?, part(3).ok_or_else(fail)?);
        let (year, month, day) = match order {
            DateOrder::Ymd => (a as i32, b, c),
            DateOrder::ShortYmd => (2000 + a as i32, b, c),
            DateOrder::Mdy => (c as i32, a, b),
        };
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(fail)?;
        return Ok(date.format("%Y-%m-%d").to_string());
    }

    Err(fail())
}

/// Parse a money or percent cell: keep digits, `.` and `-`; failure is 0
pub fn parse_amount(input: &str) -> Decimal {
    let cleaned: String = input
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

/// Configurable boolean token tables
#[derive(Debug, Clone)]
pub struct BoolTokens {
    truthy: HashSet<String>,
    falsy: HashSet<String>,
}

impl BoolTokens {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            truthy: config.true_values.iter().map(|t| normalize_token(t)).collect(),
            falsy: config.false_values.iter().map(|t| normalize_token(t)).collect(),
        }
    }

    /// `Some` only for tokens listed in either table
    pub fn classify(&self, input: &str) -> Option<bool> {
        let key = normalize_token(input);
        if self.truthy.contains(&key) {
            Some(true)
        } else if self.falsy.contains(&key) {
            Some(false)
        } else {
            None
        }
    }

    /// Unknown and empty tokens are false
    pub fn parse(&self, input: &str) -> bool {
        self.classify(input).unwrap_or(false)
    }
}

impl Default for BoolTokens {
    fn default() -> Self {
        Self::new(&TokenConfig::default())
    }
}

/// Token table for one enum: exact token first, then substring, then fallback
#[derive(Debug)]
pub struct EnumTable<T: Copy + 'static> {
    entries: &'static [(&'static str, T)],
    fallback: T,
}

impl<T: Copy + 'static> EnumTable<T> {
    pub const fn new(entries: &'static [(&'static str, T)], fallback: T) -> Self {
        Self { entries, fallback }
    }

    /// Matched variant, or `None` when only the fallback applies
    pub fn lookup(&self, input: &str) -> Option<T> {
        let key = normalize_token(input);
        if key.is_empty() {
            return None;
        }
        if let Some((_, v)) = self.entries.iter().find(|(token, _)| *token == key) {
            return Some(*v);
        }
        self.entries
            .iter()
            .find(|(token, _)| key.contains(token))
            .map(|(_, v)| *v)
    }

    pub fn resolve(&self, input: &str) -> T {
        self.lookup(input).unwrap_or(self.fallback)
    }

    pub fn fallback(&self) -> T {
        self.fallback
    }
}

pub static PROJECT_STATUS: EnumTable<ProjectStatus> = EnumTable::new(
    &[
        ("pending", ProjectStatus::Pending),
        ("대기", ProjectStatus::Pending),
        ("예정", ProjectStatus::Pending),
        ("active", ProjectStatus::Active),
        ("ongoing", ProjectStatus::Active),
        ("진행", ProjectStatus::Active),
        ("completed", ProjectStatus::Completed),
        ("complete", ProjectStatus::Completed),
        ("done", ProjectStatus::Completed),
        ("완료", ProjectStatus::Completed),
        ("준공", ProjectStatus::Completed),
        ("cancelled", ProjectStatus::Cancelled),
        ("canceled", ProjectStatus::Cancelled),
        ("취소", ProjectStatus::Cancelled),
        ("환불", ProjectStatus::Cancelled),
    ],
    ProjectStatus::Active,
);

pub static CONTACT_EVENT: EnumTable<ContactEventType> = EnumTable::new(
    &[
        ("consult", ContactEventType::Consult),
        ("상담", ContactEventType::Consult),
        ("visit", ContactEventType::Visit),
        ("방문", ContactEventType::Visit),
        ("실측", ContactEventType::Visit),
        ("contract", ContactEventType::Contract),
        ("계약", ContactEventType::Contract),
        ("other", ContactEventType::Other),
        ("기타", ContactEventType::Other),
    ],
    ContactEventType::Other,
);

pub static FEED_TYPE: EnumTable<FeedType> = EnumTable::new(
    &[
        ("post", FeedType::Post),
        ("게시", FeedType::Post),
        ("포스팅", FeedType::Post),
        ("review", FeedType::Review),
        ("후기", FeedType::Review),
        ("리뷰", FeedType::Review),
        ("video", FeedType::Video),
        ("영상", FeedType::Video),
        ("릴스", FeedType::Video),
        ("other", FeedType::Other),
        ("기타", FeedType::Other),
    ],
    FeedType::Other,
);

pub static TASK_STATUS: EnumTable<TaskStatus> = EnumTable::new(
    &[
        ("todo", TaskStatus::Todo),
        ("할일", TaskStatus::Todo),
        ("대기", TaskStatus::Todo),
        ("in_progress", TaskStatus::InProgress),
        ("inprogress", TaskStatus::InProgress),
        ("진행", TaskStatus::InProgress),
        ("done", TaskStatus::Done),
        ("완료", TaskStatus::Done),
    ],
    TaskStatus::Todo,
);

pub static FUND_TYPE: EnumTable<FundType> = EnumTable::new(
    &[
        ("income", FundType::Income),
        ("입금", FundType::Income),
        ("수입", FundType::Income),
        ("expense", FundType::Expense),
        ("출금", FundType::Expense),
        ("지출", FundType::Expense),
    ],
    FundType::Expense,
);

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_five_date_shapes() {
        assert_eq!(parse_date("2024-3-5").unwrap(), "2024-03-05");
        assert_eq!(parse_date("2024/03/05").unwrap(), "2024-03-05");
        assert_eq!(parse_date("2024. 3. 5.").unwrap(), "2024-03-05");
        assert_eq!(parse_date("2024.03.05").unwrap(), "2024-03-05");
        assert_eq!(parse_date("3/5/2024").unwrap(), "2024-03-05");
        assert_eq!(parse_date("24/3/5").unwrap(), "2024-03-05");
    }

    #[test]
    fn test_impossible_calendar_date_is_rejected() {
        assert!(parse_date("2023-02-30").is_err());
        assert!(parse_date("2024-13-01").is_err());
        assert_eq!(parse_date("2024-02-29").unwrap(), "2024-02-29");
    }

    #[test]
    fn test_unknown_date_shape_is_rejected() {
        let err = parse_date("3월 5일").unwrap_err();
        assert_eq!(err.input, "3월 5일");
        assert!(parse_date("").is_err());
        assert!(parse_date("20240305").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,100,000원"), dec!(1100000));
        assert_eq!(parse_amount(" 50% "), dec!(50));
        assert_eq!(parse_amount("-12,500.5"), dec!(-12500.5));
        assert_eq!(parse_amount(""), Decimal::ZERO);
        assert_eq!(parse_amount("없음"), Decimal::ZERO);
        assert_eq!(parse_amount("1.2.3"), Decimal::ZERO);
    }

    #[test]
    fn test_boolean_tokens() {
        let tokens = BoolTokens::default();
        assert!(tokens.parse("Y"));
        assert!(tokens.parse("지급 완료"));
        assert!(!tokens.parse("미지급"));
        assert!(!tokens.parse(""));
        assert_eq!(tokens.classify("maybe"), None);
        assert!(!tokens.parse("maybe"));
    }

    #[test]
    fn test_enum_tables() {
        assert_eq!(PROJECT_STATUS.resolve("진행중"), ProjectStatus::Active);
        assert_eq!(PROJECT_STATUS.resolve("계약 취소"), ProjectStatus::Cancelled);
        assert_eq!(PROJECT_STATUS.resolve("Completed"), ProjectStatus::Completed);
        assert_eq!(PROJECT_STATUS.lookup("???"), None);
        assert_eq!(PROJECT_STATUS.resolve("???"), ProjectStatus::Active);
        assert_eq!(CONTACT_EVENT.resolve("실측 방문"), ContactEventType::Visit);
        assert_eq!(TASK_STATUS.resolve("In Progress"), TaskStatus::InProgress);
        assert_eq!(FUND_TYPE.resolve("입금"), FundType::Income);
        assert_eq!(FEED_TYPE.resolve(""), FeedType::Other);
    }
}
