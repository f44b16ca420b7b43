//! Time-entry arithmetic shared by the `add` and `stats` commands.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

const MINUTES_PER_DAY: u32 = 24 * 60;
const LAST_MINUTE: u32 = MINUTES_PER_DAY - 1;

/// One block to append: `day_offset` is 0 for the entry's own day, 1 for the day after.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Piece {
    pub day_offset: u32,
    pub start: String,
    pub end: String,
    pub minutes: u32,
}

impl Piece {
    pub fn block_string(&self, content: &str) -> String {
        format!(
            "{} - {} (**{}**) - {}",
            self.start,
            self.end,
            duration_label(self.minutes),
            content.trim()
        )
    }
}

pub fn parse_hhmm(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("invalid time '{s}', expected HH:MM"))
}

fn minute_of_day(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

fn hhmm(minute_of_day: u32) -> String {
    format!("{:02}:{:02}", minute_of_day / 60 % 24, minute_of_day % 60)
}

/// Minutes from `start` to `end`, wrapping past midnight.
pub fn minutes_between(start: NaiveTime, end: NaiveTime) -> u32 {
    let (s, e) = (minute_of_day(start), minute_of_day(end));
    if e >= s {
        e - s
    } else {
        e + MINUTES_PER_DAY - s
    }
}

/// `1h30'` or `39'`, the label embedded in timeline blocks.
pub fn duration_label(minutes: u32) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    if h > 0 {
        format!("{h}h{m}'")
    } else {
        format!("{m}'")
    }
}

/// An entry whose end is before its start crosses midnight: it becomes
/// `start-23:59` on its own day plus `00:00-end` on the next.
pub fn split_entry(start: NaiveTime, end: NaiveTime) -> Vec<Piece> {
    let (s, e) = (minute_of_day(start), minute_of_day(end));
    if e >= s {
        return vec![Piece {
            day_offset: 0,
            start: hhmm(s),
            end: hhmm(e),
            minutes: e - s,
        }];
    }
    vec![
        Piece {
            day_offset: 0,
            start: hhmm(s),
            end: hhmm(LAST_MINUTE),
            minutes: LAST_MINUTE - s,
        },
        Piece {
            day_offset: 1,
            start: hhmm(0),
            end: hhmm(e),
            minutes: e,
        },
    ]
}

/// Pieces of an entry paired with the page date each belongs to, counted from `anchor`.
pub fn dated_pieces(
    anchor: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> anyhow::Result<Vec<(NaiveDate, Piece)>> {
    split_entry(start, end)
        .into_iter()
        .map(|piece| {
            let date = anchor
                .checked_add_days(chrono::Days::new(u64::from(piece.day_offset)))
                .ok_or_else(|| anyhow::anyhow!("date out of range after {anchor}"))?;
            Ok((date, piece))
        })
        .collect()
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Daily-note title, e.g. `January 18th, 2026`.
pub fn page_title(date: NaiveDate) -> String {
    let day = date.day();
    format!(
        "{} {day}{}, {}",
        date.format("%B"),
        ordinal_suffix(day),
        date.year()
    )
}

pub fn timeline_uid(date: NaiveDate) -> String {
    format!("timeline-{}", date.format("%Y-%m-%d"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Range {
    Day,
    Week,
    Month,
}

/// Inclusive range ending `today`: the day itself, the week from Monday, or the month from the 1st.
pub fn date_range(range: Range, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = match range {
        Range::Day => today,
        Range::Week => {
            let back = u64::from(today.weekday().num_days_from_monday());
            today
                .checked_sub_days(chrono::Days::new(back))
                .unwrap_or(today)
        }
        Range::Month => today.with_day(1).unwrap_or(today),
    };
    (start, today)
}

/// `8h05m` or `45m`, used in stats output.
pub fn format_compact(minutes: u64) -> String {
    let (h, m) = (minutes / 60, minutes % 60);
    if h > 0 {
        format!("{h}h{m:02}m")
    } else {
        format!("{m}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> NaiveTime {
        parse_hhmm(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn same_day_entry_is_one_piece() {
        let pieces = split_entry(t("09:08"), t("09:47"));
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].minutes, 39);
        assert_eq!(
            pieces[0].block_string("reading #Life"),
            "09:08 - 09:47 (**39'**) - reading #Life"
        );
    }

    #[test]
    fn midnight_crossing_entry_is_split() {
        let pieces = split_entry(t("23:00"), t("01:30"));
        assert_eq!(
            pieces,
            vec![
                Piece {
                    day_offset: 0,
                    start: "23:00".into(),
                    end: "23:59".into(),
                    minutes: 59,
                },
                Piece {
                    day_offset: 1,
                    start: "00:00".into(),
                    end: "01:30".into(),
                    minutes: 90,
                },
            ]
        );
        assert_eq!(pieces[1].block_string("sleep"), "00:00 - 01:30 (**1h30'**) - sleep");
    }

    #[test]
    fn pieces_are_dated_from_the_anchor_day() {
        // Yesterday's last entry ended 23:30 and the new one runs until 08:00 today.
        let pieces = dated_pieces(d(2026, 1, 17), t("23:30"), t("08:00")).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0, d(2026, 1, 17));
        assert_eq!(pieces[0].1.end, "23:59");
        assert_eq!(pieces[1].0, d(2026, 1, 18));
        assert_eq!(pieces[1].1.minutes, 480);

        let pieces = dated_pieces(d(2026, 1, 31), t("22:00"), t("01:00")).unwrap();
        assert_eq!(pieces[1].0, d(2026, 2, 1));
    }

    #[test]
    fn durations_wrap_past_midnight() {
        assert_eq!(minutes_between(t("22:15"), t("00:45")), 150);
        assert_eq!(minutes_between(t("10:00"), t("10:00")), 0);
        assert_eq!(duration_label(150), "2h30'");
        assert_eq!(duration_label(60), "1h0'");
        assert_eq!(duration_label(5), "5'");
    }

    #[test]
    fn bad_times_are_rejected() {
        assert!(parse_hhmm("25:00").is_err());
        assert!(parse_hhmm("9am").is_err());
    }

    #[test]
    fn page_titles_and_uids() {
        assert_eq!(page_title(d(2026, 1, 18)), "January 18th, 2026");
        assert_eq!(page_title(d(2026, 2, 1)), "February 1st, 2026");
        assert_eq!(page_title(d(2026, 2, 22)), "February 22nd, 2026");
        assert_eq!(page_title(d(2026, 2, 13)), "February 13th, 2026");
        assert_eq!(timeline_uid(d(2026, 3, 5)), "timeline-2026-03-05");
    }

    #[test]
    fn ranges_start_on_monday_and_the_first() {
        // 2026-01-18 is a Sunday.
        let sunday = d(2026, 1, 18);
        assert_eq!(date_range(Range::Day, sunday), (sunday, sunday));
        assert_eq!(date_range(Range::Week, sunday), (d(2026, 1, 12), sunday));
        assert_eq!(date_range(Range::Week, d(2026, 1, 12)).0, d(2026, 1, 12));
        assert_eq!(date_range(Range::Month, sunday), (d(2026, 1, 1), sunday));
    }

    #[test]
    fn compact_format_pads_minutes() {
        assert_eq!(format_compact(480), "8h00m");
        assert_eq!(format_compact(485), "8h05m");
        assert_eq!(format_compact(45), "45m");
        assert_eq!(format_compact(0), "0m");
    }
}
