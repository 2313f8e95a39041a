//! Minimal iCalendar (RFC 5545) reader covering what venue feeds emit:
//! folded lines, escaped text, `DTSTART` with `TZID`, UTC or floating values,
//! and `VALUE=DATE` all-day entries.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::models::{IntoCivilTime, CIVIL_TZ};

#[derive(Clone, Debug, PartialEq)]
pub enum IcsTime {
    Date(NaiveDate),
    Floating(NaiveDateTime),
    Utc(NaiveDateTime),
    Zoned(NaiveDateTime, Tz),
}

impl IcsTime {
    /// Timed values map to their civil instant; all-day values land at `all_day_time`.
    pub fn to_civil(&self, all_day_time: NaiveTime) -> Option<DateTime<Tz>> {
        match self {
            IcsTime::Date(date) => date.and_time(all_day_time).into_civil().ok(),
            IcsTime::Floating(naive) => naive.into_civil().ok(),
            IcsTime::Utc(naive) => Some(Utc.from_utc_datetime(naive).with_timezone(&CIVIL_TZ)),
            IcsTime::Zoned(naive, tz) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|dt| dt.with_timezone(&CIVIL_TZ)),
        }
    }

    fn naive(&self) -> NaiveDateTime {
        match self {
            IcsTime::Date(date) => date.and_time(NaiveTime::default()),
            IcsTime::Floating(naive) | IcsTime::Utc(naive) | IcsTime::Zoned(naive, _) => *naive,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VEvent {
    pub summary: String,
    pub start: Option<IcsTime>,
    pub end: Option<IcsTime>,
    pub url: String,
    pub description: String,
    pub location: String,
}

/// Joins continuation lines (those starting with a space or tab).
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim_end_matches('\r');
        if let Some(rest) = raw.strip_prefix([' ', '\t']) {
            if let Some(last) = lines.last_mut() {
                last.push_str(rest);
                continue;
            }
        }
        lines.push(raw.to_string());
    }
    lines
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Splits `NAME;PARAM=x:VALUE` into name, params and value.
fn split_property(line: &str) -> Option<(&str, Vec<(&str, &str)>, &str)> {
    let (head, value) = line.split_once(':')?;
    let mut parts = head.split(';');
    let name = parts.next()?;
    let params = parts.filter_map(|param| param.split_once('=')).collect();
    Some((name, params, value))
}

pub fn parse_time(params: &[(&str, &str)], value: &str) -> Option<IcsTime> {
    let value = value.trim();
    let is_date = params
        .iter()
        .any(|(key, val)| key.eq_ignore_ascii_case("VALUE") && val.eq_ignore_ascii_case("DATE"));
    if is_date || (value.len() == 8 && value.chars().all(|c| c.is_ascii_digit())) {
        return NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(IcsTime::Date);
    }

    let (stamp, utc) = match value.strip_suffix('Z') {
        Some(stripped) => (stripped, true),
        None => (value, false),
    };
    let naive = NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S")
        .or_else(|_| NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M"))
        .ok()?;
    if utc {
        return Some(IcsTime::Utc(naive));
    }
    let tzid = params
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("TZID"))
        .and_then(|(_, val)| val.trim_matches('"').parse::<Tz>().ok());
    Some(match tzid {
        Some(tz) => IcsTime::Zoned(naive, tz),
        None => IcsTime::Floating(naive),
    })
}

/// Reads every complete `VEVENT` block; a truncated trailing block is ignored.
pub fn parse_events(text: &str) -> Vec<VEvent> {
    let mut events = Vec::new();
    let mut current: Option<VEvent> = None;

    for line in unfold(text) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            current = Some(VEvent::default());
            continue;
        }
        if line.eq_ignore_ascii_case("END:VEVENT") {
            if let Some(event) = current.take() {
                events.push(event);
            }
            continue;
        }
        let Some(event) = current.as_mut() else {
            continue;
        };
        let Some((name, params, value)) = split_property(&line) else {
            continue;
        };
        match name.to_ascii_uppercase().as_str() {
            "SUMMARY" => event.summary = unescape(value).trim().to_string(),
            "DTSTART" => event.start = parse_time(&params, value),
            "DTEND" => event.end = parse_time(&params, value),
            "URL" => event.url = value.trim().to_string(),
            "DESCRIPTION" => event.description = unescape(value),
            "LOCATION" => event.location = unescape(value).trim().to_string(),
            _ => {}
        }
    }

    events
}

/// Repairs feeds that write a same-day `DTEND` earlier than `DTSTART` for
/// events running past midnight: the end moves to the following day. Blocks
/// whose end precedes the start on an earlier day are dropped.
pub fn repair_cross_midnight(text: &str) -> String {
    let mut output: Vec<String> = Vec::new();
    let mut block: Option<Vec<String>> = None;

    for line in unfold(text) {
        if line.eq_ignore_ascii_case("BEGIN:VEVENT") {
            block = Some(vec![line]);
            continue;
        }
        if let Some(lines) = block.as_mut() {
            let finished = line.eq_ignore_ascii_case("END:VEVENT");
            lines.push(line);
            if finished {
                if let Some(fixed) = block.take().and_then(fix_block) {
                    output.extend(fixed);
                }
            }
            continue;
        }
        output.push(line);
    }

    output.join("\n")
}

fn fix_block(mut lines: Vec<String>) -> Option<Vec<String>> {
    let mut start = None;
    let mut end = None;
    let mut end_idx = None;

    for (idx, line) in lines.iter().enumerate() {
        let Some((name, params, value)) = split_property(line) else {
            continue;
        };
        if name.eq_ignore_ascii_case("DTSTART") {
            start = parse_time(&params, value);
        } else if name.eq_ignore_ascii_case("DTEND") {
            end = parse_time(&params, value);
            end_idx = Some(idx);
        }
    }

    let (Some(start), Some(end), Some(end_idx)) = (start, end, end_idx) else {
        return Some(lines);
    };
    let (start_naive, end_naive) = (start.naive(), end.naive());
    if end_naive >= start_naive {
        return Some(lines);
    }
    if end_naive.date() != start_naive.date() {
        return None;
    }

    let bumped = end_naive + Duration::days(1);
    let prefix = lines[end_idx].split_once(':')?.0.to_string();
    let formatted = match end {
        IcsTime::Date(_) => bumped.format("%Y%m%d").to_string(),
        IcsTime::Utc(_) => bumped.format("%Y%m%dT%H%M%SZ").to_string(),
        _ => bumped.format("%Y%m%dT%H%M%S").to_string(),
    };
    lines[end_idx] = format!("{prefix}:{formatted}");
    Some(lines)
}
