//! C4: Date-Phrase Parser.
//!
//! Accepts relative ("최근 3개월", "지난 1년") and absolute
//! ("2024-01-01 ~ 2024-06-30") expressions. Unrecognized input yields a
//! default 90-day window plus a parser warning attached to the run.

use chrono::{Duration as ChronoDuration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::DateRange;

const DEFAULT_WINDOW_DAYS: i64 = 90;

static ABSOLUTE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})-(\d{2})-(\d{2})\s*(?:~|-|부터)\s*(\d{4})-(\d{2})-(\d{2})").unwrap()
});

static RELATIVE_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:최근|지난)\s*(\d+)\s*(일|주|개월|달|년)").unwrap());

/// Outcome of parsing one phrase: a resolved range, and whether the input
/// was recognized (for attaching a parser warning when it wasn't).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDateRange {
    pub range: DateRange,
    pub recognized: bool,
}

/// Parses a date phrase against `today`. `today` is passed in rather than
/// read from the clock so callers can test deterministically and so a run's
/// notion of "today" stays fixed across retries.
pub fn parse(phrase: &str, today: NaiveDate) -> ParsedDateRange {
    if let Some(range) = parse_absolute(phrase) {
        return ParsedDateRange {
            range,
            recognized: true,
        };
    }
    if let Some(range) = parse_relative(phrase, today) {
        return ParsedDateRange {
            range,
            recognized: true,
        };
    }
    ParsedDateRange {
        range: default_window(today),
        recognized: false,
    }
}

fn parse_absolute(phrase: &str) -> Option<DateRange> {
    let caps = ABSOLUTE_RANGE.captures(phrase)?;
    let begin = NaiveDate::from_ymd_opt(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    )?;
    let end = NaiveDate::from_ymd_opt(
        caps[4].parse().ok()?,
        caps[5].parse().ok()?,
        caps[6].parse().ok()?,
    )?;
    if begin > end {
        return None;
    }
    Some(DateRange {
        begin: format_ymd(begin),
        end: format_ymd(end),
    })
}

fn parse_relative(phrase: &str, today: NaiveDate) -> Option<DateRange> {
    let caps = RELATIVE_RANGE.captures(phrase)?;
    let n: i64 = caps[1].parse().ok()?;
    let unit = &caps[2];

    let days = match unit {
        "일" => n,
        "주" => n * 7,
        "개월" | "달" => n * 30,
        "년" => n * 365,
        _ => return None,
    };

    let begin = today - ChronoDuration::days(days);
    Some(DateRange {
        begin: format_ymd(begin),
        end: format_ymd(today),
    })
}

fn default_window(today: NaiveDate) -> DateRange {
    let begin = today - ChronoDuration::days(DEFAULT_WINDOW_DAYS);
    DateRange {
        begin: format_ymd(begin),
        end: format_ymd(today),
    }
}

fn format_ymd(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 10, 15).unwrap()
    }

    #[test]
    fn recent_three_months() {
        let parsed = parse("최근 3개월", today());
        assert!(parsed.recognized);
        assert_eq!(parsed.range.end, "20241015");
        assert_eq!(parsed.range.begin, "20240717");
    }

    #[test]
    fn last_one_year() {
        let parsed = parse("지난 1년", today());
        assert!(parsed.recognized);
        assert_eq!(parsed.range.end, "20241015");
    }

    #[test]
    fn absolute_range() {
        let parsed = parse("2024-01-01 ~ 2024-06-30", today());
        assert_eq!(
            parsed.range,
            DateRange {
                begin: "20240101".to_string(),
                end: "20240630".to_string(),
            }
        );
        assert!(parsed.recognized);
    }

    #[test]
    fn unrecognized_falls_back_to_default_window() {
        let parsed = parse("합병 공시", today());
        assert!(!parsed.recognized);
        assert_eq!(parsed.range.end, "20241015");
        assert_eq!(parsed.range.begin, "20240717");
    }
}
