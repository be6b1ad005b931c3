//! Quick-add parsing
//!
//! Turns a single typed line like "email parents tomorrow 4pm !high
//! #school @30m" into structured reminder fields: metadata tokens for
//! priority, category, and a duration estimate, plus a natural-language
//! "when" subset for the due date and time.
//!
//! Parsing is manual token scanning; the supported grammar is small
//! enough that a regex dependency is not worth carrying.

use crate::config::DEFAULT_CATEGORY;
use crate::model::Priority;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

/// Metadata tokens extracted from quick-add text.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickAddMetadata {
    /// Input text with recognized tokens stripped.
    pub text: String,
    pub priority: Priority,
    pub category: String,
    pub estimate_ms: Option<u64>,
}

/// Extract `!priority`, `#category`, and `@<n>[m|h]` tokens.
/// Unrecognized tokens stay in the text. If stripping would leave the
/// text empty, the trimmed input is kept as-is.
pub fn extract_metadata(raw: &str) -> QuickAddMetadata {
    let mut priority = Priority::Medium;
    let mut category = DEFAULT_CATEGORY.to_string();
    let mut estimate_ms = None;
    let mut kept: Vec<&str> = Vec::new();

    for token in raw.split_whitespace() {
        if let Some(rest) = token.strip_prefix('!') {
            match rest.to_ascii_lowercase().as_str() {
                "high" => {
                    priority = Priority::High;
                    continue;
                }
                "medium" => {
                    priority = Priority::Medium;
                    continue;
                }
                "low" => {
                    priority = Priority::Low;
                    continue;
                }
                _ => {}
            }
        }
        if let Some(rest) = token.strip_prefix('#') {
            if !rest.is_empty()
                && rest
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            {
                category = rest.to_ascii_lowercase();
                continue;
            }
        }
        if let Some(rest) = token.strip_prefix('@') {
            if let Some(ms) = parse_estimate(rest) {
                estimate_ms = Some(ms);
                continue;
            }
        }
        kept.push(token);
    }

    let mut text = kept.join(" ");
    if text.is_empty() {
        text = raw.trim().to_string();
    }
    QuickAddMetadata {
        text,
        priority,
        category,
        estimate_ms,
    }
}

fn parse_estimate(token: &str) -> Option<u64> {
    let (digits, unit) = match token.strip_suffix('h') {
        Some(d) => (d, 60u64),
        None => (token.strip_suffix('m').unwrap_or(token), 1u64),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    Some(value * unit * 60_000)
}

/// Parsed "when": a date (defaulting to today) and an optional time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickWhen {
    pub date: NaiveDate,
    pub time: Option<NaiveTime>,
}

impl QuickWhen {
    /// A due timestamp is produced only when a time was recognized.
    pub fn due(&self) -> Option<DateTime<Utc>> {
        self.time.map(|t| self.date.and_time(t).and_utc())
    }
}

/// Parse the natural-language date/time subset out of quick-add text.
///
/// Dates: `tomorrow`, `next <weekday>`, `this <weekday>`, a bare weekday
/// (meaning the next one), `in N days`, `D/M[/Y]`, and `<month> D` with
/// an optional ordinal suffix. Times: `H:MM`, `H.MM`, `Ham`/`Hpm`, or a
/// bare hour right after `at`. The date defaults to today.
pub fn parse_quick_when(text: &str, now: DateTime<Utc>) -> QuickWhen {
    let today = now.date_naive();
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| c == ',' || c == '.'))
        .collect();

    let mut when = QuickWhen {
        date: today,
        time: None,
    };

    let mut i = 0;
    while i < tokens.len() {
        let token = tokens[i];
        let next = tokens.get(i + 1).copied();

        if when.time.is_none() {
            if let Some(time) = parse_time_token(token, false) {
                when.time = Some(time);
                i += 1;
                continue;
            }
            if token == "at" {
                if let Some(time) = next.and_then(|t| parse_time_token(t, true)) {
                    when.time = Some(time);
                    i += 2;
                    continue;
                }
            }
            // "4 pm" with the meridiem as its own token.
            if let Some(n) = next {
                if n == "am" || n == "pm" {
                    if let Some(time) = parse_time_token(&format!("{token}{n}"), false) {
                        when.time = Some(time);
                        i += 2;
                        continue;
                    }
                }
            }
        }

        match token {
            "tomorrow" => {
                when.date = today + Duration::days(1);
            }
            "next" => {
                if let Some(day) = next.and_then(weekday_index) {
                    when.date = next_day_of_week(today, day, true);
                    i += 2;
                    continue;
                }
            }
            "this" => {
                if let Some(day) = next.and_then(weekday_index) {
                    when.date = next_day_of_week(today, day, false);
                    i += 2;
                    continue;
                }
            }
            "in" => {
                if let (Some(n), Some(unit)) = (next, tokens.get(i + 2)) {
                    if (*unit == "day" || *unit == "days") && n.bytes().all(|b| b.is_ascii_digit())
                    {
                        if let Ok(days) = n.parse::<i64>() {
                            when.date = today + Duration::days(days);
                            i += 3;
                            continue;
                        }
                    }
                }
            }
            _ => {
                if let Some(day) = weekday_index(token) {
                    when.date = next_day_of_week(today, day, true);
                } else if let Some(date) = parse_slash_date(token, today) {
                    when.date = date;
                } else if let Some(month) = month_index(token) {
                    if let Some(date) = next.and_then(|d| parse_month_day(month, d, today)) {
                        when.date = date;
                        i += 2;
                        continue;
                    }
                }
            }
        }
        i += 1;
    }

    when
}

/// `H:MM`, `H.MM`, optionally suffixed `am`/`pm`; a bare hour only when
/// explicitly allowed (after "at") or carrying a meridiem.
fn parse_time_token(token: &str, allow_bare_hour: bool) -> Option<NaiveTime> {
    let (body, meridiem) = if let Some(b) = token.strip_suffix("am") {
        (b, Some("am"))
    } else if let Some(b) = token.strip_suffix("pm") {
        (b, Some("pm"))
    } else {
        (token, None)
    };
    if body.is_empty() {
        return None;
    }

    let (hour_str, minute_str) = match body.split_once([':', '.']) {
        Some((h, m)) => (h, Some(m)),
        None => (body, None),
    };
    if !hour_str.bytes().all(|b| b.is_ascii_digit()) || hour_str.len() > 2 {
        return None;
    }
    let mut hour: u32 = hour_str.parse().ok()?;
    let minute: u32 = match minute_str {
        Some(m) if m.len() == 2 && m.bytes().all(|b| b.is_ascii_digit()) => m.parse().ok()?,
        Some(_) => return None,
        None => {
            if meridiem.is_none() && !allow_bare_hour {
                return None;
            }
            0
        }
    };

    match meridiem {
        Some("pm") if hour < 12 => hour += 12,
        Some("am") if hour == 12 => hour = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// 0 = Sunday through 6 = Saturday, matching the convention the weekday
/// offset arithmetic below expects.
fn weekday_index(token: &str) -> Option<u32> {
    Some(match token {
        "sunday" | "sun" => 0,
        "monday" | "mon" => 1,
        "tuesday" | "tue" | "tues" => 2,
        "wednesday" | "wed" => 3,
        "thursday" | "thu" | "thur" | "thurs" => 4,
        "friday" | "fri" => 5,
        "saturday" | "sat" => 6,
        _ => return None,
    })
}

/// The coming occurrence of `day`. With `strict`, a match on today rolls
/// a full week forward ("next monday" said on a Monday).
fn next_day_of_week(today: NaiveDate, day: u32, strict: bool) -> NaiveDate {
    let current = today.weekday().num_days_from_sunday();
    let mut ahead = (day + 7 - current) % 7;
    if ahead == 0 && strict {
        ahead = 7;
    }
    today + Duration::days(i64::from(ahead))
}

/// `D/M` or `D/M/Y` (day first), current year when omitted.
fn parse_slash_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split('/').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    if !parts
        .iter()
        .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }
    let day: u32 = parts[0].parse().ok()?;
    let month: u32 = parts[1].parse().ok()?;
    let year: i32 = match parts.get(2) {
        Some(y) => {
            let raw: i32 = y.parse().ok()?;
            if raw < 100 {
                2000 + raw
            } else {
                raw
            }
        }
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_index(token: &str) -> Option<u32> {
    Some(match token {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sep" | "sept" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    })
}

/// Day-of-month token with an optional ordinal suffix ("3rd", "21st").
fn parse_month_day(month: u32, token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let digits = token
        .trim_end_matches("st")
        .trim_end_matches("nd")
        .trim_end_matches("rd")
        .trim_end_matches("th");
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day: u32 = digits.parse().ok()?;
    NaiveDate::from_ymd_opt(today.year(), month, day)
}
