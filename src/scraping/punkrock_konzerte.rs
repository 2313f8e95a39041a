use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveTime, Timelike};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{now_civil, Category, Event, Metadata};

const KEY: &str = "punkrock_konzerte";
const NAME: &str = "Punkrock-Konzerte";
const URL: &str = "https://www.ce.punkrock-konzerte.de/gigs-termine-hannover/";
const GENRE: &str = "Punk / Hardcore";

static ROW_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.row[itemscope][itemtype='http://schema.org/Event']")
        .expect("punkrock row selector")
});
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.b").expect("punkrock title selector"));
static VENUE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[itemprop='location'] [itemprop='name']").expect("punkrock venue selector")
});
static CITY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("[itemprop='location'] [itemprop='address']").expect("punkrock city selector")
});
static INFO_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.info").expect("punkrock info selector"));
static META_URL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[itemprop='url']").expect("punkrock url selector"));
static START_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("meta[itemprop='startDate']").expect("punkrock start selector"));
static DATE_BOX_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.dateBox").expect("punkrock date box selector"));
static DOTTED_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{2}\.\d{2}\.\d{4})\b").expect("punkrock date regex"));

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(PunkrockKonzerte))
}

/// Hannover gig listings from punkrock-konzerte.de. Each row names the club
/// it happens in, so events carry the club as venue rather than the site.
pub struct PunkrockKonzerte;

impl Source for PunkrockKonzerte {
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
        info!(source = KEY, url = URL, "fetching gig listings");
        let html = base::fetch_html(URL)?;
        let events = parse_document(&html, &now_civil());
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

pub(crate) fn parse_document(html: &str, now: &DateTime<Tz>) -> Vec<Event> {
    let document = Html::parse_document(html);
    document
        .select(&ROW_SELECTOR)
        .filter_map(|row| parse_row(row, now))
        .collect()
}

fn default_time() -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(20, 0, 0)
}

fn parse_row(row: ElementRef<'_>, now: &DateTime<Tz>) -> Option<Event> {
    let title = base::first_text(&row, &TITLE_SELECTOR)?;
    let Some(start) = start_time(row) else {
        debug!(source = KEY, title = %title, "skipping row without date");
        return None;
    };
    if start < *now {
        return None;
    }

    let venue = base::first_text(&row, &VENUE_SELECTOR).unwrap_or_else(|| NAME.to_string());
    let city = base::first_text(&row, &CITY_SELECTOR).unwrap_or_default();
    let url = base::first_attr(&row, &INFO_LINK_SELECTOR, "href")
        .or_else(|| base::first_attr(&row, &META_URL_SELECTOR, "content"))
        .and_then(|href| base::absolute_url(URL, Some(href)))
        .unwrap_or_else(|| URL.to_string());

    let metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("event_type", "concert")
        .with("genre", GENRE)
        .with("genre_source", "source_implicit")
        .with("address", city);

    Event::new(title, start, venue, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid row"))
        .ok()
}

/// `startDate` microdata first, then the visible "dd.mm.yyyy" box. Rows
/// without a real start time are placed at 20:00.
fn start_time(row: ElementRef<'_>) -> Option<DateTime<Tz>> {
    if let Some(value) = base::first_attr(&row, &START_SELECTOR, "content") {
        if let Some(start) = parse_start_attr(&value) {
            return Some(start);
        }
    }

    let text = base::first_text(&row, &DATE_BOX_SELECTOR)?;
    let caps = DOTTED_DATE_RE.captures(&text)?;
    let date = NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%d.%m.%Y").ok()?;
    base::to_civil(date, default_time()?)
}

fn parse_start_attr(value: &str) -> Option<DateTime<Tz>> {
    if value.contains('T') {
        let parsed = base::parse_iso_civil(value)?;
        if parsed.hour() == 0 && parsed.minute() == 0 {
            return base::to_civil(parsed.date_naive(), default_time()?);
        }
        return Some(parsed);
    }
    let date = NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()?;
    base::to_civil(date, default_time()?)
}
