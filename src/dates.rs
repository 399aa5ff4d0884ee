use chrono::{
    DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::models::{Event, RankedEvent};

const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses the timestamp shapes found in event rows.
///
/// Values without an offset are read as UTC; a bare date is midnight UTC.
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let value = input.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

/// UTC calendar day of a timestamp as `YYYY-MM-DD`.
pub fn calendar_day(timestamp: &str) -> Option<String> {
    parse_timestamp(timestamp).map(|dt| dt.format("%Y-%m-%d").to_string())
}

/// Calendar day of a timestamp as seen in `tz`, as `YYYY-MM-DD`.
pub fn local_day(timestamp: &str, tz: Tz) -> Option<String> {
    parse_timestamp(timestamp).map(|dt| dt.with_timezone(&tz).format("%Y-%m-%d").to_string())
}

/// Calendar-day upcoming check against today's UTC date.
pub fn is_upcoming(event: &Event) -> bool {
    is_upcoming_on(event, Utc::now().date_naive())
}

/// True when the event falls on `today` or later. Events without a usable
/// date are kept.
pub fn is_upcoming_on(event: &Event, today: NaiveDate) -> bool {
    let Some(event_day) = event.start_or_date().and_then(calendar_day) else {
        return true;
    };
    // zero-padded YYYY-MM-DD sorts chronologically
    event_day >= today.format("%Y-%m-%d").to_string()
}

/// Optional start/end calendar dates narrowing a result list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    /// Builds a range from form values; blank or malformed dates leave that side open.
    pub fn parse(start: &str, end: &str) -> Self {
        let parse = |value: &str| NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok();
        Self {
            start: parse(start),
            end: parse(end),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Whether the event starts inside the range, with day bounds taken in `tz`.
    pub fn contains(&self, event: &Event, tz: Tz) -> bool {
        let Some(start) = event.start_or_date().and_then(parse_timestamp) else {
            return true;
        };

        if let Some(lower) = self
            .start
            .and_then(|day| local_to_utc(day.and_time(NaiveTime::MIN), tz))
        {
            if start < lower {
                return false;
            }
        }

        if let Some(upper) = self
            .end
            .and_then(|day| day.and_hms_milli_opt(23, 59, 59, 999))
            .and_then(|naive| local_to_utc(naive, tz))
        {
            if start > upper {
                return false;
            }
        }

        true
    }

    pub fn apply(&self, events: Vec<RankedEvent>, tz: Tz) -> Vec<RankedEvent> {
        if self.is_unbounded() {
            return events;
        }
        events
            .into_iter()
            .filter(|ranked| self.contains(&ranked.event, tz))
            .collect()
    }
}

pub(crate) fn local_to_utc(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(dt, _) => Some(dt.with_timezone(&Utc)),
        LocalResult::None => None,
    }
}

/// `Wed, Oct 8, 2025, 7:00 PM`
pub fn format_event_date(timestamp: Option<&str>, tz: Tz) -> String {
    format_in(timestamp, tz, "%a, %b %-d, %Y, %-I:%M %p")
}

/// `October 8, 2025`
pub fn format_date_only(timestamp: Option<&str>, tz: Tz) -> String {
    format_in(timestamp, tz, "%B %-d, %Y")
}

/// `7:00 PM`
pub fn format_time_only(timestamp: Option<&str>, tz: Tz) -> String {
    format_in(timestamp, tz, "%-I:%M %p")
}

fn format_in(timestamp: Option<&str>, tz: Tz, fmt: &str) -> String {
    timestamp
        .and_then(parse_timestamp)
        .map(|dt| dt.with_timezone(&tz).format(fmt).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn event_at(start: Option<&str>) -> Event {
        Event {
            id: "ev".to_string(),
            start_datetime: start.map(str::to_string),
            ..Event::default()
        }
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid test date")
    }

    #[test]
    fn parses_common_shapes() {
        let expected = day("2025-10-08").and_hms_opt(19, 0, 0).expect("time").and_utc();
        assert_eq!(parse_timestamp("2025-10-08T19:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-10-08T19:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-10-08 19:00:00+00"), Some(expected));
        assert_eq!(parse_timestamp("2025-10-08T19:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-10-08T19:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2025-10-08T14:00:00-05:00"),
            Some(expected)
        );
        assert_eq!(
            parse_timestamp("2025-10-08"),
            Some(day("2025-10-08").and_time(NaiveTime::MIN).and_utc())
        );
        assert_eq!(parse_timestamp("next tuesday"), None);
        assert_eq!(parse_timestamp(""), None);
    }

    #[test]
    fn calendar_day_uses_utc() {
        assert_eq!(
            calendar_day("2025-10-08T22:30:00-05:00").as_deref(),
            Some("2025-10-09")
        );
        assert_eq!(calendar_day("garbage"), None);
    }

    #[test]
    fn local_day_follows_the_timezone() {
        let late_show = "2030-10-18T02:00:00+00:00";
        assert_eq!(calendar_day(late_show).as_deref(), Some("2030-10-18"));
        assert_eq!(
            local_day(late_show, chrono_tz::America::Chicago).as_deref(),
            Some("2030-10-17")
        );
        assert_eq!(local_day("", chrono_tz::UTC), None);
    }

    #[test]
    fn missing_or_bad_dates_are_upcoming() {
        let today = day("2030-06-15");
        assert!(is_upcoming_on(&event_at(None), today));
        assert!(is_upcoming_on(&event_at(Some("TBA")), today));
    }

    #[test]
    fn today_counts_as_upcoming() {
        let today = day("2030-06-15");
        assert!(is_upcoming_on(&event_at(Some("2030-06-15T01:00:00Z")), today));
        assert!(is_upcoming_on(&event_at(Some("2030-06-15T23:59:00Z")), today));
        assert!(!is_upcoming_on(&event_at(Some("2030-06-14T23:59:59Z")), today));
    }

    #[test]
    fn legacy_date_column_is_consulted() {
        let today = day("2030-06-15");
        let event = Event {
            date: Some("2030-06-01".to_string()),
            ..Event::default()
        };
        assert!(!is_upcoming_on(&event, today));
    }

    #[test]
    fn live_clock_keeps_tomorrow() {
        let tomorrow = (Utc::now() + Duration::days(1)).to_rfc3339();
        assert!(is_upcoming(&event_at(Some(&tomorrow))));
        let last_week = (Utc::now() - Duration::days(7)).to_rfc3339();
        assert!(!is_upcoming(&event_at(Some(&last_week))));
    }

    #[test]
    fn range_bounds_are_whole_days() {
        let range = DateRange::parse("2030-06-10", "2030-06-12");
        let tz = chrono_tz::UTC;
        assert!(range.contains(&event_at(Some("2030-06-10T00:00:00Z")), tz));
        assert!(range.contains(&event_at(Some("2030-06-12T23:59:59Z")), tz));
        assert!(!range.contains(&event_at(Some("2030-06-09T23:59:59Z")), tz));
        assert!(!range.contains(&event_at(Some("2030-06-13T00:00:00Z")), tz));
        assert!(range.contains(&event_at(None), tz));
    }

    #[test]
    fn range_respects_timezone() {
        let range = DateRange::parse("", "2030-06-12");
        let chicago = chrono_tz::America::Chicago;
        // 02:00 UTC on the 13th is still the evening of the 12th in Chicago
        assert!(range.contains(&event_at(Some("2030-06-13T02:00:00Z")), chicago));
        assert!(!range.contains(&event_at(Some("2030-06-13T02:00:00Z")), chrono_tz::UTC));
    }

    #[test]
    fn blank_range_is_unbounded() {
        assert!(DateRange::parse("", "not a date").is_unbounded());
    }

    #[test]
    fn formats_for_display() {
        let ts = Some("2025-10-08T19:00:00Z");
        assert_eq!(
            format_event_date(ts, chrono_tz::UTC),
            "Wed, Oct 8, 2025, 7:00 PM"
        );
        assert_eq!(format_date_only(ts, chrono_tz::UTC), "October 8, 2025");
        assert_eq!(
            format_time_only(ts, chrono_tz::America::Chicago),
            "2:00 PM"
        );
        assert_eq!(format_time_only(None, chrono_tz::UTC), "");
    }
}
