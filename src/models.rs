use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Every event timestamp is normalized into this zone before it is stored.
pub const CIVIL_TZ: Tz = chrono_tz::Europe::Berlin;

pub const MAX_TITLE_LENGTH: usize = 200;
pub const MAX_VENUE_LENGTH: usize = 100;
pub const MAX_URL_LENGTH: usize = 500;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event title cannot be empty")]
    EmptyTitle,
    #[error("title too long ({len} chars > {max}), possible scraper error")]
    TitleTooLong { len: usize, max: usize },
    #[error("venue name too long ({len} chars > {max})")]
    VenueTooLong { len: usize, max: usize },
    #[error("url too long ({len} chars > {max})")]
    UrlTooLong { len: usize, max: usize },
    #[error("invalid url scheme: {0}")]
    InvalidUrlScheme(String),
    #[error("timestamp does not exist in Europe/Berlin: {0}")]
    InvalidTimestamp(String),
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Culture,
    Radar,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Culture => "culture",
            Category::Radar => "radar",
        }
    }
}

/// A single source-specific metadata value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl MetaValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Int(i64::from(value))
    }
}

impl From<bool> for MetaValue {
    fn from(value: bool) -> Self {
        MetaValue::Bool(value)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(value: Vec<String>) -> Self {
        MetaValue::List(value)
    }
}

/// Open, ordered key/value bag (duration, genre, synopsis, ...).
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetaValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetaValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.get(key)
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_text)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetaValue)> {
        self.0.iter()
    }
}

/// Converts a source timestamp into the civil zone.
///
/// Naive values are taken to already be Berlin wall-clock time; zoned values
/// are converted to the same instant in Berlin. A wall-clock time skipped by
/// the spring-forward change is read with the winter offset, so it lands the
/// same distance past the gap.
pub trait IntoCivilTime {
    fn into_civil(self) -> Result<DateTime<Tz>, ValidationError>;
}

impl IntoCivilTime for NaiveDateTime {
    fn into_civil(self) -> Result<DateTime<Tz>, ValidationError> {
        match CIVIL_TZ.from_local_datetime(&self) {
            LocalResult::Single(dt) => Ok(dt),
            LocalResult::Ambiguous(earliest, _) => Ok(earliest),
            LocalResult::None => CIVIL_TZ
                .from_local_datetime(&(self + Duration::hours(1)))
                .earliest()
                .ok_or_else(|| ValidationError::InvalidTimestamp(self.to_string())),
        }
    }
}

impl<Z: TimeZone> IntoCivilTime for DateTime<Z> {
    fn into_civil(self) -> Result<DateTime<Tz>, ValidationError> {
        Ok(self.with_timezone(&CIVIL_TZ))
    }
}

/// One showing or occurrence. Only obtainable through [`Event::new`], so every
/// value in circulation has passed validation.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Event {
    title: String,
    #[serde(serialize_with = "serialize_civil")]
    date: DateTime<Tz>,
    venue: String,
    url: String,
    category: Category,
    metadata: Metadata,
}

fn serialize_civil<S: Serializer>(date: &DateTime<Tz>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&date.to_rfc3339())
}

impl Event {
    pub fn new(
        title: impl Into<String>,
        date: impl IntoCivilTime,
        venue: impl Into<String>,
        url: impl Into<String>,
        category: Category,
        metadata: Metadata,
    ) -> Result<Self, ValidationError> {
        let date = date.into_civil()?;
        let title = title.into();
        let venue = venue.into();
        let url = url.into();

        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let len = title.chars().count();
        if len > MAX_TITLE_LENGTH {
            return Err(ValidationError::TitleTooLong {
                len,
                max: MAX_TITLE_LENGTH,
            });
        }

        let len = venue.chars().count();
        if len > MAX_VENUE_LENGTH {
            return Err(ValidationError::VenueTooLong {
                len,
                max: MAX_VENUE_LENGTH,
            });
        }

        if !url.is_empty() {
            let len = url.chars().count();
            if len > MAX_URL_LENGTH {
                return Err(ValidationError::UrlTooLong {
                    len,
                    max: MAX_URL_LENGTH,
                });
            }
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::InvalidUrlScheme(
                    url.chars().take(50).collect(),
                ));
            }
        }

        Ok(Self {
            title,
            date,
            venue,
            url,
            category,
            metadata,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn date(&self) -> &DateTime<Tz> {
        &self.date
    }

    pub fn venue(&self) -> &str {
        &self.venue
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_movie(&self) -> bool {
        self.category == Category::Movie
    }

    /// Inclusive window check against the wall clock.
    pub fn is_within_next_days(&self, days: i64) -> bool {
        self.is_within_days_of(days, &now_civil())
    }

    /// `true` iff `now <= date <= now + days`; always `false` for negative `days`.
    pub fn is_within_days_of(&self, days: i64, now: &DateTime<Tz>) -> bool {
        if days < 0 {
            return false;
        }
        let cutoff = *now + Duration::days(days);
        *now <= self.date && self.date <= cutoff
    }

    pub fn is_this_week(&self) -> bool {
        self.is_within_next_days(7)
    }

    /// "Mon 24.11."
    pub fn format_date_short(&self) -> String {
        self.date.format("%a %d.%m.").to_string()
    }

    /// "12. Dec", or "15. Mar 2026" when the event is not in `now`'s year.
    pub fn format_date_long(&self, now: &DateTime<Tz>) -> String {
        if self.date.year() != now.year() {
            self.date.format("%d. %b %Y").to_string()
        } else {
            self.date.format("%d. %b").to_string()
        }
    }

    /// "Fri 19:30"
    pub fn format_time(&self) -> String {
        self.date.format("%a %H:%M").to_string()
    }

    /// Stable hash: venue|date|title
    pub fn stable_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.venue.as_bytes());
        hasher.update(b"|");
        hasher.update(self.date.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(self.title.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

pub fn now_civil() -> DateTime<Tz> {
    Utc::now().with_timezone(&CIVIL_TZ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Offset, Timelike};

    fn naive(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, min, 0))
            .expect("valid naive datetime")
    }

    fn movie_at(date: DateTime<Tz>) -> Event {
        Event::new(
            "Test Movie",
            date,
            "Test Venue",
            "https://example.com",
            Category::Movie,
            Metadata::new(),
        )
        .expect("valid event")
    }

    #[test]
    fn builds_event_with_metadata() {
        let event = Event::new(
            "Inception",
            naive(2025, 12, 22, 19, 30),
            "Astor Grand Cinema",
            "https://example.com/event/inception",
            Category::Movie,
            Metadata::new()
                .with("duration", 148_i64)
                .with("language", "OV")
                .with("tags", vec!["thriller".to_string()]),
        )
        .expect("valid event");

        assert_eq!(event.title(), "Inception");
        assert_eq!(event.metadata().get("duration"), Some(&MetaValue::Int(148)));
        assert_eq!(event.metadata().text("language"), Some("OV"));
        assert!(event.is_movie());
    }

    #[test]
    fn naive_timestamps_are_taken_as_berlin_wall_clock() {
        let event = movie_at(naive(2025, 12, 12, 19, 30).into_civil().expect("civil"));
        assert_eq!(event.date().timezone(), CIVIL_TZ);
        assert_eq!(event.date().hour(), 19);
        assert_eq!(event.date().minute(), 30);
    }

    #[test]
    fn zoned_timestamps_are_converted_to_the_same_instant() {
        let utc = Utc.with_ymd_and_hms(2025, 7, 1, 18, 0, 0).single().expect("utc");
        let event = Event::new("Gig", utc, "Venue", "", Category::Radar, Metadata::new())
            .expect("valid event");
        assert_eq!(event.date().hour(), 20, "CEST is UTC+2 in July");
        assert_eq!(event.date().with_timezone(&Utc), utc);
    }

    #[test]
    fn spring_forward_gap_times_move_past_the_gap() {
        // 2025-03-30 02:30 does not exist on Berlin clocks.
        let event = Event::new(
            "Gap",
            naive(2025, 3, 30, 2, 30),
            "Venue",
            "",
            Category::Radar,
            Metadata::new(),
        )
        .expect("gap time is kept");
        assert_eq!(event.date().hour(), 3);
        assert_eq!(event.date().minute(), 30);
        assert_eq!(event.date().offset().fix().local_minus_utc(), 2 * 3600);
        assert_eq!(event.date().with_timezone(&Utc).hour(), 1);
    }

    #[test]
    fn rejects_blank_and_oversized_fields() {
        let date = naive(2025, 12, 1, 20, 0);
        let build = |title: &str, venue: &str, url: &str| {
            Event::new(title, date, venue, url, Category::Radar, Metadata::new())
        };

        assert_eq!(build("", "V", ""), Err(ValidationError::EmptyTitle));
        assert_eq!(build("   \t", "V", ""), Err(ValidationError::EmptyTitle));
        assert!(matches!(
            build(&"x".repeat(201), "V", ""),
            Err(ValidationError::TitleTooLong { len: 201, .. })
        ));
        assert!(build(&"x".repeat(200), "V", "").is_ok());
        assert!(matches!(
            build("T", &"v".repeat(101), ""),
            Err(ValidationError::VenueTooLong { .. })
        ));
        let long_url = format!("https://{}", "a".repeat(495));
        assert!(matches!(
            build("T", "V", &long_url),
            Err(ValidationError::UrlTooLong { .. })
        ));
        assert!(matches!(
            build("T", "V", "javascript:alert(1)"),
            Err(ValidationError::InvalidUrlScheme(_))
        ));
        assert!(build("T", "V", "http://example.com").is_ok());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let title = "ä".repeat(200);
        let event = Event::new(
            title,
            naive(2025, 12, 1, 20, 0),
            "Glocksee",
            "",
            Category::Radar,
            Metadata::new(),
        );
        assert!(event.is_ok());
    }

    #[test]
    fn lookahead_window_is_inclusive() {
        let now = naive(2025, 11, 10, 12, 0).into_civil().expect("civil");

        assert!(movie_at(now).is_within_days_of(0, &now));
        assert!(movie_at(now + Duration::days(3)).is_within_days_of(3, &now));
        assert!(!movie_at(now + Duration::days(3) + Duration::seconds(1))
            .is_within_days_of(3, &now));
        assert!(!movie_at(now - Duration::seconds(1)).is_within_days_of(3, &now));
        assert!(!movie_at(now).is_within_days_of(-1, &now));
    }

    #[test]
    fn is_this_week_uses_the_wall_clock() {
        let now = now_civil();
        assert!(movie_at(now + Duration::days(1)).is_this_week());
        assert!(!movie_at(now + Duration::days(30)).is_this_week());
    }

    #[test]
    fn formats_dates() {
        let event = movie_at(naive(2024, 11, 24, 19, 30).into_civil().expect("civil"));
        assert_eq!(event.format_date_short(), "Sun 24.11.");
        assert_eq!(event.format_time(), "Sun 19:30");

        let same_year = naive(2024, 1, 1, 0, 0).into_civil().expect("civil");
        let next_year = naive(2025, 1, 1, 0, 0).into_civil().expect("civil");
        assert_eq!(event.format_date_long(&same_year), "24. Nov");
        assert_eq!(event.format_date_long(&next_year), "24. Nov 2024");
    }

    #[test]
    fn serializes_with_rfc3339_date_and_flat_metadata() {
        let event = Event::new(
            "Inception",
            naive(2025, 12, 22, 19, 30),
            "Astor",
            "https://example.com",
            Category::Movie,
            Metadata::new().with("duration", 148_i64),
        )
        .expect("valid event");

        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["date"], "2025-12-22T19:30:00+01:00");
        assert_eq!(value["category"], "movie");
        assert_eq!(value["metadata"]["duration"], 148);
    }

    #[test]
    fn stable_id_depends_on_identity_fields() {
        let date = naive(2025, 12, 22, 19, 30).into_civil().expect("civil");
        let a = movie_at(date);
        let b = movie_at(date);
        let c = movie_at(date + Duration::hours(1));
        assert_eq!(a.stable_id(), b.stable_id());
        assert_ne!(a.stable_id(), c.stable_id());
    }
}
