use anyhow::Result;
use chrono::NaiveTime;
use tracing::{debug, info};

use super::ics::{self, VEvent};
use super::{base, RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{Category, Event, Metadata};

const KEY: &str = "kulturpalast_linden";
const NAME: &str = "Kulturpalast Linden";
const ICAL_URL: &str = "https://kulturpalast-hannover.de/events/?ical=1";
const EVENTS_URL: &str = "https://kulturpalast-hannover.de/events/";
const ADDRESS: &str = "Deisterstraße 24, 30449 Hannover";
const MAX_EVENTS: usize = 60;
const MAX_DESCRIPTION: usize = 200;

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Kulturpalast))
}

pub struct Kulturpalast;

impl Source for Kulturpalast {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Concert
    }

    fn source_url(&self) -> &'static str {
        EVENTS_URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = ICAL_URL, "fetching calendar feed");
        let feed = base::fetch_html(ICAL_URL)?;
        let events = parse_calendar(&feed);
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

/// The feed sometimes ends late-night events "before" they start; those are
/// repaired before parsing.
pub(crate) fn parse_calendar(feed: &str) -> Vec<Event> {
    let repaired = ics::repair_cross_midnight(feed);
    let Some(all_day_time) = NaiveTime::from_hms_opt(20, 0, 0) else {
        return Vec::new();
    };

    let mut events: Vec<Event> = ics::parse_events(&repaired)
        .into_iter()
        .filter_map(|vevent| to_event(vevent, all_day_time))
        .collect();
    events.sort_by(|a, b| a.date().cmp(b.date()));
    events.truncate(MAX_EVENTS);
    events
}

fn to_event(vevent: VEvent, all_day_time: NaiveTime) -> Option<Event> {
    if vevent.summary.is_empty() {
        return None;
    }
    let start = vevent.start.as_ref()?.to_civil(all_day_time)?;
    let url = if vevent.url.is_empty() {
        EVENTS_URL.to_string()
    } else {
        vevent.url
    };

    let metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("description", first_line(&vevent.description))
        .with("event_type", "event")
        .with("address", ADDRESS);

    Event::new(vevent.summary, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid calendar entry"))
        .ok()
}

fn first_line(description: &str) -> String {
    description
        .lines()
        .map(|line| base::clean_text(line).trim_end_matches('\\').to_string())
        .find(|line| !line.is_empty())
        .map(|line| base::truncate_chars(&line, MAX_DESCRIPTION))
        .unwrap_or_default()
}
