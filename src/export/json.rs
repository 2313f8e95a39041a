use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use serde::Serialize;

use super::{group_films, ExportError};
use crate::aggregator::EventBuckets;
use crate::models::{Category, Event, Metadata};

/// `events.json`: both buckets verbatim.
pub fn events_json(buckets: &EventBuckets) -> Result<String, ExportError> {
    Ok(serde_json::to_string_pretty(buckets)?)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebEvents<'a> {
    meta: WebMeta,
    movies: Vec<WebFilm<'a>>,
    radar: Vec<WebRadarEvent<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebMeta {
    updated_at: String,
    week: u32,
    year: i32,
    counts: WebCounts,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebCounts {
    films: usize,
    showings: usize,
    radar: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebFilm<'a> {
    id: String,
    title: &'a str,
    venue: &'a str,
    url: &'a str,
    metadata: &'a Metadata,
    showtimes: Vec<WebShowtime<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebShowtime<'a> {
    id: String,
    date: String,
    day: String,
    time: String,
    url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebRadarEvent<'a> {
    id: String,
    title: &'a str,
    date: String,
    date_label: String,
    time: String,
    venue: &'a str,
    url: &'a str,
    category: Category,
    metadata: &'a Metadata,
}

/// `web_events.json` for the static site: films grouped with their
/// showtimes, radar events flat. Every entry carries a stable id.
pub fn web_events_json(buckets: &EventBuckets, now: &DateTime<Tz>) -> Result<String, ExportError> {
    let films = group_films(&buckets.movies_this_week);

    let movies: Vec<WebFilm<'_>> = films
        .iter()
        .filter_map(|group| {
            let first = group.showings.first()?;
            Some(WebFilm {
                id: first.stable_id(),
                title: group.title,
                venue: group.venue,
                url: first.url(),
                metadata: first.metadata(),
                showtimes: group.showings.iter().copied().map(showtime).collect(),
            })
        })
        .collect();

    let radar = buckets
        .big_events_radar
        .iter()
        .map(|event| WebRadarEvent {
            id: event.stable_id(),
            title: event.title(),
            date: event.date().to_rfc3339(),
            date_label: event.format_date_long(now),
            time: event.date().format("%H:%M").to_string(),
            venue: event.venue(),
            url: event.url(),
            category: event.category(),
            metadata: event.metadata(),
        })
        .collect();

    let week = now.iso_week();
    let document = WebEvents {
        meta: WebMeta {
            updated_at: now.to_rfc3339(),
            week: week.week(),
            year: week.year(),
            counts: WebCounts {
                films: movies.len(),
                showings: buckets.movies_this_week.len(),
                radar: buckets.big_events_radar.len(),
            },
        },
        movies,
        radar,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

fn showtime(event: &Event) -> WebShowtime<'_> {
    WebShowtime {
        id: event.stable_id(),
        date: event.date().to_rfc3339(),
        day: event.format_date_short(),
        time: event.date().format("%H:%M").to_string(),
        url: event.url(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntoCivilTime;
    use chrono::NaiveDate;
    use serde_json::Value;

    fn at(d: u32, h: u32) -> DateTime<Tz> {
        NaiveDate::from_ymd_opt(2025, 11, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid timestamp")
            .into_civil()
            .expect("civil time")
    }

    fn buckets() -> EventBuckets {
        let movie = |day| {
            Event::new(
                "Anora",
                at(day, 22),
                "Apollokino Hannover",
                "https://www.apollokino.de/film/anora",
                Category::Movie,
                Metadata::new().with("original_version", true),
            )
            .expect("valid movie")
        };
        EventBuckets {
            movies_this_week: vec![movie(24), movie(26)],
            big_events_radar: vec![Event::new(
                "Turbostaat",
                at(28, 20),
                "Broncos",
                "https://www.stadtkind-kalender.de/event/turbostaat",
                Category::Radar,
                Metadata::new().with("genre", "Punk / Hardcore"),
            )
            .expect("valid radar event")],
        }
    }

    #[test]
    fn events_json_has_both_buckets() {
        let value: Value = serde_json::from_str(&events_json(&buckets()).expect("serialize"))
            .expect("valid json");
        assert_eq!(value["movies_this_week"].as_array().map(Vec::len), Some(2));
        let radar = &value["big_events_radar"][0];
        assert_eq!(radar["title"], "Turbostaat");
        assert_eq!(radar["date"], "2025-11-28T20:00:00+01:00");
        assert_eq!(radar["category"], "radar");
        assert_eq!(radar["metadata"]["genre"], "Punk / Hardcore");
    }

    #[test]
    fn web_events_groups_showtimes() {
        let raw = web_events_json(&buckets(), &at(24, 9)).expect("serialize");
        let value: Value = serde_json::from_str(&raw).expect("valid json");

        assert_eq!(value["meta"]["week"], 48);
        assert_eq!(value["meta"]["updatedAt"], "2025-11-24T09:00:00+01:00");
        assert_eq!(value["meta"]["counts"]["films"], 1);
        assert_eq!(value["meta"]["counts"]["showings"], 2);

        let film = &value["movies"][0];
        assert_eq!(film["title"], "Anora");
        assert_eq!(film["showtimes"].as_array().map(Vec::len), Some(2));
        assert_eq!(film["showtimes"][1]["day"], "Wed 26.11.");
        assert_eq!(film["showtimes"][0]["time"], "22:00");

        let radar = &value["radar"][0];
        assert_eq!(radar["dateLabel"], "28. Nov");
        assert_eq!(radar["id"].as_str().map(str::len), Some(64));
    }

    #[test]
    fn empty_buckets_still_serialize() {
        let raw = web_events_json(&EventBuckets::default(), &at(24, 9)).expect("serialize");
        let value: Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value["movies"], Value::Array(Vec::new()));
        assert_eq!(value["radar"], Value::Array(Vec::new()));
    }
}
