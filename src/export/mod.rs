//! On-disk formats written after every run. All writers take a sanitized
//! copy of the buckets, so nothing scraped reaches disk unfiltered.

pub mod csv;
pub mod json;
pub mod markdown;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{info, warn};

use crate::aggregator::EventBuckets;
use crate::models::{Event, MetaValue, Metadata, MAX_TITLE_LENGTH, MAX_VENUE_LENGTH};
use crate::sanitize::{sanitize_text, sanitize_url, MAX_DESCRIPTION_LENGTH};
use crate::utils;

pub const EVENTS_JSON: &str = "events.json";
pub const WEB_EVENTS_JSON: &str = "web_events.json";
pub const MOVIES_CSV: &str = "movies.csv";
pub const MOVIES_GROUPED_CSV: &str = "movies_grouped.csv";
pub const CONCERTS_CSV: &str = "concerts.csv";
pub const WEEKLY_DIGEST_MD: &str = "weekly_digest.md";
pub const LATEST_MESSAGE_TXT: &str = "latest_message.txt";
pub const ARCHIVE_DIR: &str = "archive";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("unable to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to serialize events: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes every format into `dir` and returns the paths written.
pub fn export_all(
    buckets: &EventBuckets,
    now: &DateTime<Tz>,
    dir: &Path,
) -> Result<Vec<PathBuf>, ExportError> {
    let clean = sanitize_buckets(buckets);
    let events_json = json::events_json(&clean)?;

    let files = [
        (dir.join(EVENTS_JSON), events_json.clone()),
        (dir.join(WEB_EVENTS_JSON), json::web_events_json(&clean, now)?),
        (dir.join(MOVIES_CSV), csv::movies_csv(&clean.movies_this_week)),
        (
            dir.join(MOVIES_GROUPED_CSV),
            csv::movies_grouped_csv(&clean.movies_this_week),
        ),
        (dir.join(CONCERTS_CSV), csv::concerts_csv(&clean.big_events_radar)),
        (dir.join(WEEKLY_DIGEST_MD), markdown::weekly_digest(&clean, now)),
        (dir.join(LATEST_MESSAGE_TXT), markdown::message(&clean, now)),
        (
            dir.join(ARCHIVE_DIR).join(format!("{}.json", week_label(now))),
            events_json,
        ),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (path, contents) in files {
        write_file(&path, &contents)?;
        written.push(path);
    }
    info!(dir = ?dir, files = written.len(), "exports written");
    Ok(written)
}

/// ISO week label such as "2025-W48".
pub fn week_label(now: &DateTime<Tz>) -> String {
    let week = now.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

pub fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };
    utils::ensure_parent(path).map_err(io_err)?;
    fs::write(path, contents).map_err(io_err)
}

pub fn sanitize_buckets(buckets: &EventBuckets) -> EventBuckets {
    EventBuckets {
        movies_this_week: buckets.movies_this_week.iter().filter_map(sanitize_event).collect(),
        big_events_radar: buckets.big_events_radar.iter().filter_map(sanitize_event).collect(),
    }
}

/// Rebuilds the event from cleaned fields. An event whose title is nothing
/// but markup is dropped.
pub fn sanitize_event(event: &Event) -> Option<Event> {
    let mut metadata = Metadata::new();
    for (key, value) in event.metadata().iter() {
        metadata.insert(key, sanitize_value(key, value));
    }

    Event::new(
        sanitize_text(event.title(), MAX_TITLE_LENGTH),
        *event.date(),
        sanitize_text(event.venue(), MAX_VENUE_LENGTH),
        sanitize_url(event.url()).unwrap_or_default(),
        event.category(),
        metadata,
    )
    .map_err(|err| warn!(title = %event.title(), error = %err, "dropping event from export"))
    .ok()
}

/// All showings of one film at one venue, in date order.
#[derive(Debug)]
pub struct FilmGroup<'a> {
    pub title: &'a str,
    pub venue: &'a str,
    pub showings: Vec<&'a Event>,
}

/// Groups showings by (title, venue), ordered by each film's first showing.
pub fn group_films(movies: &[Event]) -> Vec<FilmGroup<'_>> {
    let mut groups: Vec<FilmGroup<'_>> = Vec::new();
    for event in movies {
        match groups
            .iter_mut()
            .find(|group| group.title == event.title() && group.venue == event.venue())
        {
            Some(group) => group.showings.push(event),
            None => groups.push(FilmGroup {
                title: event.title(),
                venue: event.venue(),
                showings: vec![event],
            }),
        }
    }
    groups
}

fn sanitize_value(key: &str, value: &MetaValue) -> MetaValue {
    let is_url = key.ends_with("url");
    let clean = |text: &str| {
        if is_url {
            sanitize_url(text).unwrap_or_default()
        } else {
            sanitize_text(text, MAX_DESCRIPTION_LENGTH)
        }
    };
    match value {
        MetaValue::Text(text) => MetaValue::Text(clean(text)),
        MetaValue::List(items) => MetaValue::List(items.iter().map(|item| clean(item)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, IntoCivilTime};
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Tz> {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
            .into_civil()
            .expect("civil time")
    }

    #[test]
    fn sanitizes_fields_and_metadata() {
        let event = Event::new(
            "<b>Anora</b> &amp; friends",
            at(2025, 11, 24, 22),
            "Apollo",
            "https://example.com/anora",
            Category::Movie,
            Metadata::new()
                .with("synopsis", "<script>x()</script>A story")
                .with("poster_url", "javascript:alert(1)")
                .with("original_version", true),
        )
        .expect("valid event");

        let clean = sanitize_event(&event).expect("still valid");
        assert_eq!(clean.title(), "Anora & friends");
        assert_eq!(clean.metadata().text("synopsis"), Some("A story"));
        assert_eq!(clean.metadata().text("poster_url"), Some(""));
        assert_eq!(clean.metadata().get("original_version"), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn drops_events_that_are_only_markup() {
        let event = Event::new(
            "<script>alert(1)</script>",
            at(2025, 11, 24, 22),
            "Apollo",
            "",
            Category::Radar,
            Metadata::new(),
        )
        .expect("valid before sanitizing");
        assert!(sanitize_event(&event).is_none());
    }

    #[test]
    fn groups_films_in_first_showing_order() {
        let showing = |title: &str, day: u32| {
            Event::new(title, at(2025, 11, day, 20), "Apollo", "", Category::Movie, Metadata::new())
                .expect("valid showing")
        };
        let movies = vec![showing("Anora", 24), showing("Conclave", 25), showing("Anora", 26)];
        let groups = group_films(&movies);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].title, "Anora");
        assert_eq!(groups[0].showings.len(), 2);
        assert_eq!(groups[1].title, "Conclave");
    }

    #[test]
    fn week_label_uses_iso_weeks() {
        assert_eq!(week_label(&at(2025, 11, 24, 12)), "2025-W48");
        assert_eq!(week_label(&at(2027, 1, 1, 12)), "2026-W53");
    }
}
