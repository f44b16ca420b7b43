//! Roam daily-note titles ("January 18th, 2026") and request date handling.

use time::{Date, Month, OffsetDateTime};

const TZ_OFFSET_MINUTES_MIN: i32 = -14 * 60;
const TZ_OFFSET_MINUTES_MAX: i32 = 14 * 60;
pub const MAX_RANGE_DAYS: i64 = 366;

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

pub fn normalize_tz_offset_minutes(v: Option<i32>) -> i32 {
    v.unwrap_or(0)
        .clamp(TZ_OFFSET_MINUTES_MIN, TZ_OFFSET_MINUTES_MAX)
}

fn tz_offset_from_minutes(minutes: i32) -> time::UtcOffset {
    time::UtcOffset::from_whole_seconds(minutes.saturating_mul(60))
        .unwrap_or(time::UtcOffset::UTC)
}

/// Today's date as seen by a client at `tz_offset_minutes` from UTC.
pub fn today(tz_offset_minutes: Option<i32>) -> Date {
    let offset = tz_offset_from_minutes(normalize_tz_offset_minutes(tz_offset_minutes));
    OffsetDateTime::now_utc().to_offset(offset).date()
}

fn ordinal_suffix(day: u8) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

pub fn roam_page_title(date: Date) -> String {
    let day = date.day();
    format!(
        "{} {day}{}, {}",
        date.month(),
        ordinal_suffix(day),
        date.year()
    )
}

/// Accepts `YYYY-MM-DD` or a daily-note title such as `January 18th, 2026`.
pub fn parse_date(input: &str) -> Option<Date> {
    let input = input.trim();
    parse_iso_date(input).or_else(|| parse_roam_title(input))
}

fn parse_iso_date(input: &str) -> Option<Date> {
    let parts: Vec<&str> = input.split('-').collect();
    if parts.len() != 3 {
        return None;
    }
    let y: i32 = parts[0].parse().ok()?;
    let m: u8 = parts[1].parse().ok()?;
    let d: u8 = parts[2].parse().ok()?;
    Date::from_calendar_date(y, Month::try_from(m).ok()?, d).ok()
}

fn parse_roam_title(input: &str) -> Option<Date> {
    let mut words = input.split_whitespace();
    let month_name = words.next()?;
    let day_word = words.next()?.trim_end_matches(',');
    let year: i32 = words.next()?.parse().ok()?;
    if words.next().is_some() {
        return None;
    }

    let month = MONTHS
        .into_iter()
        .find(|m| m.to_string().eq_ignore_ascii_case(month_name))?;
    let digits = day_word.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    let day: u8 = digits.parse().ok()?;
    if &day_word[digits.len()..] != ordinal_suffix(day) {
        return None;
    }
    Date::from_calendar_date(year, month, day).ok()
}

/// Every date from `start` to `end` inclusive.
pub fn days_inclusive(start: Date, end: Date) -> Vec<Date> {
    let mut days = Vec::new();
    let mut day = start;
    while day <= end {
        days.push(day);
        match day.next_day() {
            Some(next) => day = next,
            None => break,
        }
    }
    days
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: Month, d: u8) -> Date {
        Date::from_calendar_date(y, m, d).unwrap()
    }

    #[test]
    fn page_titles_use_ordinal_suffixes() {
        assert_eq!(roam_page_title(date(2026, Month::January, 18)), "January 18th, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 1)), "March 1st, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 2)), "March 2nd, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 3)), "March 3rd, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 11)), "March 11th, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 12)), "March 12th, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 13)), "March 13th, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 21)), "March 21st, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 22)), "March 22nd, 2026");
        assert_eq!(roam_page_title(date(2026, Month::March, 31)), "March 31st, 2026");
    }

    #[test]
    fn parse_date_accepts_both_forms() {
        let d = date(2026, Month::January, 18);
        assert_eq!(parse_date("2026-01-18"), Some(d));
        assert_eq!(parse_date("January 18th, 2026"), Some(d));
        assert_eq!(parse_date(" january 18th, 2026 "), Some(d));
        assert_eq!(parse_date(&roam_page_title(d)), Some(d));
    }

    #[test]
    fn parse_date_rejects_garbage() {
        assert_eq!(parse_date("2026-13-01"), None);
        assert_eq!(parse_date("January 18st, 2026"), None);
        assert_eq!(parse_date("Smarch 1st, 2026"), None);
        assert_eq!(parse_date("February 30th, 2026"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn days_inclusive_spans_month_end() {
        let days = days_inclusive(date(2026, Month::January, 30), date(2026, Month::February, 2));
        assert_eq!(days.len(), 4);
        assert_eq!(days[3], date(2026, Month::February, 2));
        assert!(days_inclusive(date(2026, Month::February, 2), date(2026, Month::January, 30))
            .is_empty());
    }

    #[test]
    fn tz_offset_is_clamped() {
        assert_eq!(normalize_tz_offset_minutes(None), 0);
        assert_eq!(normalize_tz_offset_minutes(Some(480)), 480);
        assert_eq!(normalize_tz_offset_minutes(Some(100_000)), 14 * 60);
    }
}
