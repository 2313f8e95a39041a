use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use chrono_tz::Tz;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use reqwest::blocking::Client;
use scraper::{ElementRef, Selector};
use serde::de::DeserializeOwned;

use crate::models::{now_civil, IntoCivilTime, CIVIL_TZ};

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);
const USER_AGENT: &str = "BoringHannover/0.3 (+https://github.com/boringhannover/boringhannover)";

static NUMERIC_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\.\s*(\d{1,2})\.(\d{2,4})?").expect("valid numeric date regex")
});
static NAMED_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\.?\s+([a-zäöü]+)\.?(?:\s+(\d{4}))?")
        .expect("valid named date regex")
});
static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})[:.](\d{2})\b").expect("valid time regex"));
static ORIGINAL_VERSION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(OV|OmU|OmeU|OmdU|OmenglU|original\s*version)\b")
        .expect("valid original version regex")
});

const MONTHS: [(&str, u32); 24] = [
    ("januar", 1),
    ("februar", 2),
    ("märz", 3),
    ("april", 4),
    ("mai", 5),
    ("juni", 6),
    ("juli", 7),
    ("august", 8),
    ("september", 9),
    ("oktober", 10),
    ("november", 11),
    ("dezember", 12),
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("maerz", 3),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("october", 10),
    ("december", 12),
    ("jan", 1),
    ("feb", 2),
    ("dez", 12),
];

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn first_text(element: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    element.select(selector).next().and_then(|node| {
        let cleaned = inner_text(node);
        if cleaned.is_empty() {
            None
        } else {
            Some(cleaned)
        }
    })
}

pub fn inner_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn first_attr(element: &ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    element
        .select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub fn absolute_url(base: &str, href: Option<String>) -> Option<String> {
    let href = href?;
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href);
    }
    let base_url = reqwest::Url::parse(base).ok()?;
    base_url.join(&href).ok().map(|u| u.to_string())
}

fn client() -> Result<&'static Client> {
    static CLIENT: OnceCell<Client> = OnceCell::new();
    CLIENT.get_or_try_init(|| {
        Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("unable to build http client")
    })
}

pub fn fetch_html(url: &str) -> Result<String> {
    let response = client()?
        .get(url)
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .text()
        .with_context(|| format!("unable to read response body for {url}"))
}

pub fn fetch_json<T: DeserializeOwned>(url: &str, query: &[(&str, String)]) -> Result<T> {
    let response = client()?
        .get(url)
        .query(query)
        .send()
        .with_context(|| format!("request failed for {url}"))?;
    let response = response
        .error_for_status()
        .with_context(|| format!("non-success status for {url}"))?;
    response
        .json()
        .with_context(|| format!("unable to decode json from {url}"))
}

/// True when the text carries an original-language marker (OV, OmU, OmeU, OmdU).
pub fn is_original_version(text: &str) -> bool {
    ORIGINAL_VERSION_RE.is_match(text)
}

/// Finds the first "HH:MM" / "HH.MM" in free text.
pub fn find_first_time(text: &str) -> Option<NaiveTime> {
    let caps = TIME_RE.captures(text)?;
    let hour = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub(crate) fn month_from_name(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    MONTHS
        .iter()
        .find(|(candidate, _)| *candidate == lowered)
        .map(|(_, month)| *month)
        .or_else(|| {
            // "Nov", "Okt", "Sept" and friends
            if lowered.len() < 3 {
                return None;
            }
            MONTHS
                .iter()
                .find(|(candidate, _)| candidate.len() > 3 && candidate.starts_with(&lowered))
                .map(|(_, month)| *month)
        })
}

/// Parses German listing dates: "Mo, 24.11.", "24.11.2025", "24.11.25",
/// "Montag, 24. November 2025". A missing year is resolved to the next
/// occurrence relative to `today`.
pub fn parse_german_date_from(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(caps) = NUMERIC_DATE_RE.captures(text) {
        let day = caps.get(1)?.as_str().parse().ok()?;
        let month = caps.get(2)?.as_str().parse().ok()?;
        let year = caps.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
        return compose_date(day, month, year, today);
    }

    for caps in NAMED_DATE_RE.captures_iter(text) {
        let Some(month) = caps.get(2).and_then(|m| month_from_name(m.as_str())) else {
            continue;
        };
        let day = caps.get(1)?.as_str().parse().ok()?;
        let year = caps.get(3).and_then(|y| y.as_str().parse::<i32>().ok());
        return compose_date(day, month, year, today);
    }

    None
}

pub fn parse_german_date(text: &str) -> Option<NaiveDate> {
    parse_german_date_from(text, now_civil().date_naive())
}

fn compose_date(day: u32, month: u32, year: Option<i32>, today: NaiveDate) -> Option<NaiveDate> {
    match year {
        Some(year) if year < 100 => NaiveDate::from_ymd_opt(2000 + year, month, day),
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            // Listings never reach back more than a couple of months.
            if date < today - chrono::Duration::days(60) {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(date)
            }
        }
    }
}

/// Combines a civil date and wall-clock time, skipping non-existent local times.
pub fn to_civil(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    NaiveDateTime::new(date, time).into_civil().ok()
}

/// Parses ISO 8601 timestamps as emitted by CMS APIs ("2026-01-23T20:00:00+01:00",
/// "2025-10-15T17:00:00.000Z", "2026-01-23T20:00:00"). Offset-less values are Berlin time.
pub fn parse_iso_civil(value: &str) -> Option<DateTime<Tz>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&CIVIL_TZ));
    }
    // Prismic writes "+0000" offsets without a colon.
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.with_timezone(&CIVIL_TZ));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return naive.into_civil().ok();
        }
    }
    None
}

/// Offset-less "HH:MM" suitable for event metadata.
pub fn clock_time<Z: TimeZone>(date: &DateTime<Z>) -> String
where
    Z::Offset: std::fmt::Display,
{
    date.format("%H:%M").to_string()
}

/// Truncates to at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn parses_numeric_german_dates() {
        let today = day(2025, 11, 20);
        assert_eq!(parse_german_date_from("Mo, 24.11.", today), Some(day(2025, 11, 24)));
        assert_eq!(parse_german_date_from("24.11.2026", today), Some(day(2026, 11, 24)));
        assert_eq!(parse_german_date_from("Fr, 21.11.25", today), Some(day(2025, 11, 21)));
    }

    #[test]
    fn rolls_yearless_dates_into_next_year() {
        let today = day(2025, 12, 28);
        assert_eq!(parse_german_date_from("Sa, 03.01.", today), Some(day(2026, 1, 3)));
        assert_eq!(parse_german_date_from("So, 14.12.", today), Some(day(2025, 12, 14)));
    }

    #[test]
    fn parses_named_months() {
        let today = day(2025, 11, 20);
        assert_eq!(
            parse_german_date_from("Montag, 24. November 2025", today),
            Some(day(2025, 11, 24))
        );
        assert_eq!(parse_german_date_from("3. März", today), Some(day(2026, 3, 3)));
        assert_eq!(parse_german_date_from("12 Dez", today), Some(day(2025, 12, 12)));
        assert_eq!(parse_german_date_from("kein Datum", today), None);
    }

    #[test]
    fn parses_iso_timestamps_into_berlin() {
        let with_offset = parse_iso_civil("2026-01-23T20:00:00+01:00").expect("offset");
        assert_eq!(with_offset.hour(), 20);

        let utc = parse_iso_civil("2025-10-15T17:00:00.000Z").expect("utc millis");
        assert_eq!(utc.hour(), 19);

        let compact = parse_iso_civil("2026-01-23T19:00:00+0000").expect("compact offset");
        assert_eq!(compact.hour(), 20);

        let naive = parse_iso_civil("2026-01-23T20:00:00").expect("naive");
        assert_eq!(naive.hour(), 20);
        assert_eq!(naive.timezone(), CIVIL_TZ);

        assert!(parse_iso_civil("not a date").is_none());
    }

    #[test]
    fn finds_times_in_free_text() {
        assert_eq!(
            find_first_time("Einlass: 18:30 Uhr"),
            NaiveTime::from_hms_opt(18, 30, 0)
        );
        assert_eq!(find_first_time("Beginn 20.00"), NaiveTime::from_hms_opt(20, 0, 0));
        assert_eq!(find_first_time("ohne Zeit"), None);
    }

    #[test]
    fn detects_original_version_markers() {
        assert!(is_original_version("Anora (OmU)"));
        assert!(is_original_version("OmU-Nachtstudio"));
        assert!(is_original_version("Dune OV"));
        assert!(!is_original_version("Deutsche Fassung"));
        assert!(!is_original_version("Overlord"));
    }

    #[test]
    fn resolves_relative_urls() {
        assert_eq!(
            absolute_url("https://www.apollokino.de/?mp=x", Some("/film/1".into())),
            Some("https://www.apollokino.de/film/1".to_string())
        );
        assert_eq!(
            absolute_url("https://a.de/", Some("https://b.de/x".into())),
            Some("https://b.de/x".to_string())
        );
        assert_eq!(absolute_url("https://a.de/", None), None);
    }
}
