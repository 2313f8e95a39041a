use anyhow::Result;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::genre::normalize_genre;
use crate::models::{Category, Event, Metadata};

const KEY: &str = "broncos";
const URL: &str = "https://www.stadtkind-kalender.de/ort/broncos";
const BASE_URL: &str = "https://www.stadtkind-kalender.de";
const NAME: &str = "Broncos";
const ADDRESS: &str = "Schwarzer Bär 7, 30449 Hannover";
const MAX_EVENTS: usize = 40;

static EVENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("article.event").expect("broncos event selector"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a.event__link").expect("broncos link selector"));
static TIME_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time.event__start-time").expect("broncos time selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h3.event__title").expect("broncos title selector"));
static TAGLINE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.event__tagline").expect("broncos tagline selector"));

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Broncos))
}

/// Broncos in Linden, listed through the Stadtkind event calendar which
/// publishes ISO start times per card.
pub struct Broncos;

impl Source for Broncos {
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
        info!(source = KEY, url = URL, "fetching venue page");
        let html = base::fetch_html(URL)?;
        let events = self.parse_document(&html);
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

impl Broncos {
    pub(crate) fn parse_document(&self, html: &str) -> Vec<Event> {
        let document = Html::parse_document(html);
        document
            .select(&EVENT_SELECTOR)
            .filter_map(parse_card)
            .take(MAX_EVENTS)
            .collect()
    }
}

fn parse_card(card: ElementRef<'_>) -> Option<Event> {
    let href = base::first_attr(&card, &LINK_SELECTOR, "href")?;
    let url = base::absolute_url(BASE_URL, Some(href))?;
    let start = base::first_attr(&card, &TIME_SELECTOR, "datetime")
        .and_then(|value| base::parse_iso_civil(&value))?;
    let title = base::first_text(&card, &TITLE_SELECTOR)?;

    let tagline = base::first_text(&card, &TAGLINE_SELECTOR).unwrap_or_default();
    let genre = normalize_genre(&tagline)
        .map(str::to_string)
        .unwrap_or_else(|| tagline.clone());
    let genre_source = if tagline.is_empty() { "" } else { "stadtkind_tagline" };

    let metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("genre", genre)
        .with("genre_source", genre_source)
        .with("event_type", "concert")
        .with("address", ADDRESS);

    Event::new(title, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid card"))
        .ok()
}
