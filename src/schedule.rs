//! Resolve human scheduling strings (`delayUntil`) into absolute instants
//!
//! Notations are tried in a fixed order and the first match wins:
//!
//! 1. natural language: `tomorrow 9am`, `next friday`, `2 hours ago`, `noon`
//! 2. offsets: `in 2h`, `now+30m`, `now-1d`, `+90m`, `-1h`, `1h30m`
//! 3. epoch: 10+ digits are seconds, 13+ digits are milliseconds
//! 4. absolute layouts: RFC 3339, RFC 2822, `2025-06-01 14:30`, `06/01/2025`, ...
//!
//! Naive date/times are read in the given time zone and every result is
//! normalized to UTC.

use crate::error::{Error, Result};
use chrono::{
    DateTime, Datelike, Duration, Local, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
    Utc, Weekday,
};

/// Resolve `input` relative to `now`, reading naive times in the local zone
///
/// # Errors
///
/// Returns [`Error::InvalidScheduleFormat`] when no notation matches, or when
/// `input` is empty (callers omit the field instead)
pub fn resolve(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    resolve_in(input, now, &Local)
}

/// Like [`resolve`] with an explicit zone for naive date/times
///
/// # Errors
///
/// Returns [`Error::InvalidScheduleFormat`] when no notation matches
pub fn resolve_in<Tz: TimeZone>(input: &str, now: DateTime<Utc>, tz: &Tz) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidScheduleFormat(input.to_string()));
    }

    natural(trimmed, now, tz)
        .or_else(|| offset(trimmed, now))
        .or_else(|| epoch(trimmed))
        .or_else(|| layout(trimmed, tz))
        .ok_or_else(|| Error::InvalidScheduleFormat(input.to_string()))
}

/// True when `gate` has been reached
#[must_use]
pub fn is_due(gate: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    gate <= now
}

/// Parse a duration such as `90m`, `1h30m`, `1.5h`, `2 days 3 hours`
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let mut rest = input.trim();
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::zero();
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().ok()?;

        let tail = tail.trim_start();
        let unit_len = tail
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let millis = unit_millis(&unit.to_ascii_lowercase())?;

        #[allow(clippy::cast_possible_truncation)]
        let part = Duration::milliseconds((value * millis).round() as i64);
        total = total.checked_add(&part)?;

        rest = tail.trim_start().trim_start_matches(',').trim_start();
        rest = rest.strip_prefix("and ").unwrap_or(rest).trim_start();
    }
    Some(total)
}

fn unit_millis(unit: &str) -> Option<f64> {
    let ms = match unit {
        "ms" | "msec" | "msecs" | "millisecond" | "milliseconds" => 1.0,
        "s" | "sec" | "secs" | "second" | "seconds" => 1_000.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60_000.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3_600_000.0,
        "d" | "day" | "days" => 86_400_000.0,
        "w" | "wk" | "wks" | "week" | "weeks" => 604_800_000.0,
        _ => return None,
    };
    Some(ms)
}

fn offset(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let lower = input.to_ascii_lowercase();

    if let Some(rest) = lower.strip_prefix("in ") {
        return now.checked_add_signed(parse_duration(rest)?);
    }

    let signed = lower
        .strip_prefix("now")
        .map(str::trim_start)
        .unwrap_or(&lower);
    if let Some(rest) = signed.strip_prefix('+') {
        return now.checked_add_signed(parse_duration(rest)?);
    }
    if let Some(rest) = signed.strip_prefix('-') {
        return now.checked_sub_signed(parse_duration(rest)?);
    }

    // bare durations mean "from now"; a lone number is not a duration
    if lower.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    now.checked_add_signed(parse_duration(&lower)?)
}

fn epoch(input: &str) -> Option<DateTime<Utc>> {
    if !input.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let value: i64 = input.parse().ok()?;
    match input.len() {
        13.. => DateTime::from_timestamp_millis(value),
        10.. => DateTime::from_timestamp(value, 0),
        _ => None,
    }
}

const ZONED_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S %z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%d %H:%M %z",
];

const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d %b %Y %H:%M",
    "%b %d %Y %H:%M",
    "%b %d, %Y %H:%M",
];

const DATE_LAYOUTS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d %b %Y", "%b %d %Y", "%b %d, %Y",
];

fn layout<Tz: TimeZone>(input: &str, tz: &Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ZONED_LAYOUTS {
        if let Ok(dt) = DateTime::parse_from_str(input, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in DATETIME_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, fmt) {
            return in_zone(naive, tz);
        }
    }
    for fmt in DATE_LAYOUTS {
        if let Ok(date) = NaiveDate::parse_from_str(input, fmt) {
            return in_zone(date.and_time(NaiveTime::MIN), tz);
        }
    }
    None
}

fn in_zone<Tz: TimeZone>(naive: NaiveDateTime, tz: &Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn natural<Tz: TimeZone>(input: &str, now: DateTime<Utc>, tz: &Tz) -> Option<DateTime<Utc>> {
    let lower = input.to_ascii_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    match words.as_slice() {
        ["now"] | ["today"] => return Some(now),
        [head @ .., "ago"] => return now.checked_sub_signed(parse_duration(&head.join(" "))?),
        _ => {}
    }

    let local_now = now.with_timezone(tz);
    let today = local_now.date_naive();
    let clock = local_now.time();

    let (date, rest) = day_phrase(&words, today)?;
    let rest: &[&str] = match rest {
        ["at", tail @ ..] => tail,
        other => other,
    };

    let time = if rest.is_empty() {
        match date {
            DayPhrase::Date(_) => clock,
            DayPhrase::TimeOnly => return None,
        }
    } else {
        parse_clock(&rest.join(" "))?
    };

    let date = match date {
        DayPhrase::Date(d) => d,
        DayPhrase::TimeOnly => today,
    };
    in_zone(date.and_time(time), tz)
}

enum DayPhrase {
    Date(NaiveDate),
    TimeOnly,
}

fn day_phrase<'a>(words: &'a [&'a str], today: NaiveDate) -> Option<(DayPhrase, &'a [&'a str])> {
    let shifted = |days: i64| today.checked_add_signed(Duration::days(days));
    match words {
        ["tomorrow", rest @ ..] => Some((DayPhrase::Date(shifted(1)?), rest)),
        ["yesterday", rest @ ..] => Some((DayPhrase::Date(shifted(-1)?), rest)),
        ["today", rest @ ..] => Some((DayPhrase::Date(today), rest)),
        ["tonight"] => Some((DayPhrase::TimeOnly, &["8pm"][..])),
        ["noon" | "midday"] => Some((DayPhrase::TimeOnly, words)),
        ["midnight"] => Some((DayPhrase::Date(shifted(1)?), &["00:00"][..])),
        ["next", "week", rest @ ..] => Some((DayPhrase::Date(shifted(7)?), rest)),
        ["next", "month", rest @ ..] => Some((
            DayPhrase::Date(today.checked_add_months(Months::new(1))?),
            rest,
        )),
        ["next", day, rest @ ..] => Some((DayPhrase::Date(next_weekday(today, weekday(day)?)), rest)),
        [day, rest @ ..] if weekday(day).is_some() => {
            Some((DayPhrase::Date(next_weekday(today, weekday(day)?)), rest))
        }
        ["at", ..] => Some((DayPhrase::TimeOnly, words)),
        [_, ..] if parse_clock(&words.join(" ")).is_some() => Some((DayPhrase::TimeOnly, words)),
        _ => None,
    }
}

fn weekday(word: &str) -> Option<Weekday> {
    let day = match word {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// Next occurrence of `day` strictly after `today`
fn next_weekday(today: NaiveDate, day: Weekday) -> NaiveDate {
    let current = i64::from(today.weekday().num_days_from_monday());
    let wanted = i64::from(day.num_days_from_monday());
    let mut delta = (wanted - current).rem_euclid(7);
    if delta == 0 {
        delta = 7;
    }
    today + Duration::days(delta)
}

/// `3pm`, `3:30 pm`, `15:30`, `15:30:00`, `noon`, `midnight`
fn parse_clock(input: &str) -> Option<NaiveTime> {
    let compact: String = input.split_whitespace().collect();
    match compact.as_str() {
        "noon" | "midday" => return NaiveTime::from_hms_opt(12, 0, 0),
        "midnight" => return Some(NaiveTime::MIN),
        _ => {}
    }

    let (body, meridiem) = if let Some(b) = compact.strip_suffix("am") {
        (b, Some(false))
    } else if let Some(b) = compact.strip_suffix("pm") {
        (b, Some(true))
    } else {
        (compact.as_str(), None)
    };

    let mut parts = body.split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next().map_or(Some(0), |m| m.parse().ok())?;
    let second: u32 = parts.next().map_or(Some(0), |s| s.parse().ok())?;
    if parts.next().is_some() {
        return None;
    }

    let hour = match meridiem {
        Some(pm) => {
            if !(1..=12).contains(&hour) {
                return None;
            }
            match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, true) => h + 12,
                (h, false) => h,
            }
        }
        // a bare number is not a clock time
        None if !body.contains(':') => return None,
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, second)
}
