use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{now_civil, Category, Event, Metadata};

const KEY: &str = "erhardt_cafe";
const NAME: &str = "Erhardt Café";
const URL: &str = "https://www.erhardt.cafe/events";
const BASE_URL: &str = "https://www.erhardt.cafe";
const DYNAMIC_MODEL_URL: &str = "https://www.erhardt.cafe/_api/v2/dynamicmodel";
const EVENTS_API_URL: &str = "https://www.erhardt.cafe/_api/wix-events-web/v1/events";
const WIX_EVENTS_APP_ID: &str = "140603ad-af8d-84a5-2c80-a0f60cb47351";
const ADDRESS: &str = "Limmerstraße 46, 30451 Hannover";
const MAX_EVENTS: usize = 50;
const MAX_DESCRIPTION: usize = 200;

#[derive(Debug, Deserialize)]
struct DynamicModel {
    #[serde(default)]
    apps: HashMap<String, WixApp>,
}

#[derive(Debug, Deserialize)]
struct WixApp {
    instance: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    #[serde(default)]
    events: Vec<Value>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WixEvent {
    title: Option<String>,
    scheduling: Option<Scheduling>,
    location: Option<Location>,
    slug: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Scheduling {
    config: Option<SchedulingConfig>,
    #[serde(rename = "startTimeFormatted")]
    start_time_formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SchedulingConfig {
    #[serde(rename = "startDate")]
    start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Location {
    address: Option<String>,
}

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(ErhardtCafe))
}

/// Game nights, karaoke and the occasional gig, served by the Wix Events
/// API behind the café's site.
pub struct ErhardtCafe;

impl Source for ErhardtCafe {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Concert
    }

    fn source_url(&self) -> &'static str {
        URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = URL, "fetching wix events");
        let model: DynamicModel = base::fetch_json(DYNAMIC_MODEL_URL, &[])?;
        let instance = instance_token(&model).context("wix instance token not found")?;

        let query = [
            ("instance", instance.to_string()),
            ("limit", MAX_EVENTS.to_string()),
            ("offset", "0".to_string()),
        ];
        let page: EventsPage = base::fetch_json(EVENTS_API_URL, &query)?;
        debug!(
            source = KEY,
            returned = page.events.len(),
            total = page.total.unwrap_or_default(),
            "events api responded"
        );

        let events = parse_events(page.events, &now_civil());
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

fn instance_token(model: &DynamicModel) -> Option<&str> {
    model
        .apps
        .get(WIX_EVENTS_APP_ID)
        .and_then(|app| app.instance.as_deref())
        .filter(|token| !token.is_empty())
}

fn parse_events(raw: Vec<Value>, now: &DateTime<Tz>) -> Vec<Event> {
    let mut events: Vec<Event> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<WixEvent>(value) {
            Ok(event) => parse_event(event, now),
            Err(err) => {
                debug!(source = KEY, error = %err, "skipping undecodable event");
                None
            }
        })
        .collect();
    events.sort_by(|a, b| a.date().cmp(b.date()));
    events.truncate(MAX_EVENTS);
    events
}

fn parse_event(event: WixEvent, now: &DateTime<Tz>) -> Option<Event> {
    let title = event.title.filter(|title| !title.trim().is_empty())?;
    let scheduling = event.scheduling?;
    let start = scheduling
        .config
        .and_then(|config| config.start_date)
        .as_deref()
        .and_then(base::parse_iso_civil)?;
    if start < *now {
        return None;
    }

    let url = match event.slug.as_deref().filter(|slug| !slug.is_empty()) {
        Some(slug) => format!("{BASE_URL}/event-details/{slug}"),
        None => URL.to_string(),
    };
    let address = event
        .location
        .and_then(|location| location.address)
        .unwrap_or_else(|| ADDRESS.to_string());
    let description = event
        .description
        .map(|text| base::truncate_chars(&text, MAX_DESCRIPTION))
        .unwrap_or_default();

    let metadata = Metadata::new()
        .with("time", scheduling.start_time_formatted.unwrap_or_default())
        .with("event_type", infer_event_type(&title))
        .with("address", address)
        .with("description", description);

    Event::new(title, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid event"))
        .ok()
}

fn infer_event_type(title: &str) -> &'static str {
    let lowered = title.to_lowercase();
    if lowered.contains("schach") || lowered.contains("kniffel") {
        "games"
    } else if lowered.contains("quiz") {
        "quiz"
    } else if lowered.contains("karaoke") {
        "karaoke"
    } else if lowered.contains("live") || lowered.contains("konzert") {
        "concert"
    } else if lowered.contains("connect") || lowered.contains("social") {
        "social"
    } else {
        "event"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntoCivilTime;
    use chrono::{NaiveDate, Timelike};

    fn now() -> DateTime<Tz> {
        NaiveDate::from_ymd_opt(2025, 10, 1)
            .and_then(|d| d.and_hms_opt(9, 0, 0))
            .expect("valid timestamp")
            .into_civil()
            .expect("civil time")
    }

    #[test]
    fn reads_instance_token() {
        let model: DynamicModel = serde_json::from_str(
            r#"{"apps": {"140603ad-af8d-84a5-2c80-a0f60cb47351": {"instance": "tok.123"}, "other": {}}}"#,
        )
        .expect("valid model json");
        assert_eq!(instance_token(&model), Some("tok.123"));

        let missing: DynamicModel = serde_json::from_str(r#"{"apps": {}}"#).expect("empty model");
        assert_eq!(instance_token(&missing), None);
    }

    #[test]
    fn parses_and_sorts_events() {
        let raw: Vec<Value> = serde_json::from_str(
            r#"[
              {
                "title": "Karaoke Abend",
                "slug": "karaoke-abend",
                "scheduling": {"config": {"startDate": "2025-10-22T18:00:00.000Z"}, "startTimeFormatted": "20:00"},
                "location": {"address": "Limmerstraße 46, Hannover"},
                "description": "Sing along!"
              },
              {
                "title": "Schachabend",
                "scheduling": {"config": {"startDate": "2025-10-15T17:00:00.000Z"}, "startTimeFormatted": "19:00"}
              },
              {
                "title": "Old Quiz",
                "scheduling": {"config": {"startDate": "2025-09-01T17:00:00Z"}}
              },
              {"title": "No schedule"},
              {"title": 42}
            ]"#,
        )
        .expect("valid events json");

        let events = parse_events(raw, &now());
        let titles: Vec<_> = events.iter().map(Event::title).collect();
        assert_eq!(titles, vec!["Schachabend", "Karaoke Abend"]);

        let chess = &events[0];
        assert_eq!(chess.date().hour(), 19, "UTC start converted to CEST");
        assert_eq!(chess.url(), URL);
        assert_eq!(chess.metadata().text("event_type"), Some("games"));
        assert_eq!(chess.metadata().text("address"), Some(ADDRESS));

        let karaoke = &events[1];
        assert_eq!(karaoke.url(), "https://www.erhardt.cafe/event-details/karaoke-abend");
        assert_eq!(karaoke.metadata().text("event_type"), Some("karaoke"));
        assert_eq!(karaoke.metadata().text("time"), Some("20:00"));
    }

    #[test]
    fn infers_event_types_from_titles() {
        assert_eq!(infer_event_type("Kniffelabend"), "games");
        assert_eq!(infer_event_type("Tablequiz"), "quiz");
        assert_eq!(infer_event_type("Live: The Band"), "concert");
        assert_eq!(infer_event_type("Erhardt Connect"), "social");
        assert_eq!(infer_event_type("Flohmarkt"), "event");
    }
}
