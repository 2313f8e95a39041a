use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{Category, Event, Metadata};

const KEY: &str = "faust_hannover";
const NAME: &str = "Faust";
const BASE_URL: &str = "https://www.kulturzentrum-faust.de";
const LISTING_URL: &str = "https://www.kulturzentrum-faust.de/veranstaltungen.html";
const ADDRESS: &str = "Zur Bettfedernfabrik 3, 30451 Hannover";
const MAX_EVENTS: usize = 40;
const PAGE_PAUSE: Duration = Duration::from_millis(300);

/// Listing pages: `rub` parameter, event type, English-only filter.
const CATEGORIES: [(u32, &str, bool); 3] = [(2, "concert", false), (1, "party", false), (4, "theater", true)];

const ENGLISH_KEYWORDS: [&str; 7] = [
    "english",
    "englisch",
    " en ",
    "(en)",
    "[en]",
    "in english",
    "auf englisch",
];

const SUB_VENUES: [&str; 6] = [
    "60er-Jahre Halle",
    "Mephisto",
    "Warenannahme",
    "Kunsthalle",
    "Café",
    "Gretchen",
];

static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a[href]").expect("faust link selector"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("faust image selector"));
static EVENT_HREF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/veranstaltungen/\w+/\d{6}-[\w-]+\.html").expect("faust href regex")
});
static SLUG_DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{2})(\d{2})(\d{2})-").expect("faust slug date regex"));
static DATE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z]{2},\s*\d{1,2}\.\d{1,2}\.\d{2}").expect("faust date line regex")
});
static BEGIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Beginn[:\s]*(\d{1,2})[:.](\d{2})").expect("faust begin regex")
});
static UHR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[:.](\d{2})\s*Uhr").expect("faust uhr regex"));

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Faust))
}

/// Kulturzentrum Faust. Concerts and parties are taken as listed, stage
/// shows only when they are announced in English.
pub struct Faust;

impl Source for Faust {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Concert
    }

    fn source_url(&self) -> &'static str {
        LISTING_URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, "fetching category pages");
        let mut seen = HashSet::new();
        let mut events = Vec::new();

        for (idx, (rub, event_type, english_only)) in CATEGORIES.iter().enumerate() {
            if idx > 0 {
                thread::sleep(PAGE_PAUSE);
            }
            let url = format!("{LISTING_URL}?rub={rub}");
            match base::fetch_html(&url) {
                Ok(html) => {
                    let page = parse_listing(&html, event_type, *english_only, &mut seen);
                    debug!(source = KEY, rub, event_type, count = page.len(), "parsed category");
                    events.extend(page);
                }
                Err(err) => warn!(source = KEY, rub, error = %err, "category page failed"),
            }
        }

        let events = finalize(events);
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

fn finalize(mut events: Vec<Event>) -> Vec<Event> {
    events.sort_by(|a, b| a.date().cmp(b.date()));
    events.truncate(MAX_EVENTS);
    events
}

/// Parses one category page. `seen` carries hrefs across pages so an event
/// listed under several categories is kept once.
pub(crate) fn parse_listing(
    html: &str,
    event_type: &str,
    english_only: bool,
    seen: &mut HashSet<String>,
) -> Vec<Event> {
    let document = Html::parse_document(html);
    let mut events = Vec::new();

    for link in document.select(&LINK_SELECTOR) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if !EVENT_HREF_RE.is_match(href) || !seen.insert(href.to_string()) {
            continue;
        }
        if let Some(event) = parse_link(link, href, event_type, english_only) {
            events.push(event);
        }
    }

    events
}

struct Details {
    title: String,
    time: Option<NaiveTime>,
    location: String,
    price: String,
}

fn parse_link(link: ElementRef<'_>, href: &str, event_type: &str, english_only: bool) -> Option<Event> {
    let date = date_from_slug(href)?;
    let lines: Vec<String> = link
        .text()
        .map(base::clean_text)
        .filter(|line| !line.is_empty())
        .collect();
    let details = read_details(&lines);
    if details.title.is_empty() {
        return None;
    }

    if english_only && !is_english(&details.title, &lines.join(" ")) {
        debug!(source = KEY, title = %details.title, "skipping non-English stage event");
        return None;
    }

    let time = details
        .time
        .or_else(|| NaiveTime::from_hms_opt(20, 0, 0))?;
    let start = base::to_civil(date, time)?;
    let url = base::absolute_url(BASE_URL, Some(href.to_string()))?;
    let image_url = link
        .select(&IMAGE_SELECTOR)
        .next()
        .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
        .and_then(|src| base::absolute_url(BASE_URL, Some(src.to_string())))
        .unwrap_or_default();

    let metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("location", details.location)
        .with("price", details.price)
        .with("event_type", event_type)
        .with("image_url", image_url)
        .with("address", ADDRESS);

    Event::new(details.title, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid event"))
        .ok()
}

/// "/veranstaltungen/november/211125-le-fly.html" is 21.11.2025.
fn date_from_slug(href: &str) -> Option<NaiveDate> {
    let caps = SLUG_DATE_RE.captures(href)?;
    let day = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

fn read_details(lines: &[String]) -> Details {
    let mut details = Details {
        title: String::new(),
        time: None,
        location: String::new(),
        price: String::new(),
    };

    for line in lines {
        if DATE_LINE_RE.is_match(line) {
            continue;
        }
        if let Some(caps) = BEGIN_RE.captures(line) {
            details.time = hour_minute(caps.get(1), caps.get(2));
            continue;
        }
        if line.contains("Einlass") || line.contains("Beginn") {
            if let Some(caps) = UHR_RE.captures(line) {
                details.time = hour_minute(caps.get(1), caps.get(2));
            }
            continue;
        }
        if line.contains("VVK") || line.contains("AK") || line.contains('€') {
            details.price = line.clone();
            continue;
        }
        if SUB_VENUES.iter().any(|venue| line.contains(venue)) {
            details.location = line.clone();
            continue;
        }
        if details.title.is_empty() && line.chars().count() > 3 {
            details.title = line.clone();
        }
    }

    details
}

fn hour_minute(hour: Option<regex::Match<'_>>, minute: Option<regex::Match<'_>>) -> Option<NaiveTime> {
    let hour = hour?.as_str().parse().ok()?;
    let minute = minute?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn is_english(title: &str, text: &str) -> bool {
    let combined = format!("{title} {text}").to_lowercase();
    ENGLISH_KEYWORDS.iter().any(|keyword| combined.contains(keyword))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const CONCERT_PAGE: &str = r#"
    <div class="events">
      <a href="/veranstaltungen/november/211125-le-fly.html">
        <img src="/media/le-fly.jpg">
        <span>Fr, 21.11.25</span>
        <h3>Le Fly</h3>
        <p>60er-Jahre Halle</p>
        <p>VVK 25€ / AK 32€</p>
        <p>Einlass: 18:30 Uhr / Beginn: 19:30 Uhr</p>
      </a>
      <a href="/veranstaltungen/november/211125-le-fly.html">Le Fly (again)</a>
      <a href="/veranstaltungen/dezember/051225-dj-night.html">
        <span>Fr, 05.12.25</span>
        <h3>DJ Night</h3>
      </a>
      <a href="/kontakt.html">Kontakt</a>
    </div>
    "#;

    const STAGE_PAGE: &str = r#"
    <a href="/veranstaltungen/dezember/101225-impro.html"><h3>Impro Theater</h3><p>auf Deutsch</p></a>
    <a href="/veranstaltungen/dezember/111225-comedy.html"><h3>Stand-up Comedy</h3><p>Show in English</p></a>
    "#;

    #[test]
    fn parses_listing_links() {
        let mut seen = HashSet::new();
        let events = parse_listing(CONCERT_PAGE, "concert", false, &mut seen);
        assert_eq!(events.len(), 2);

        let le_fly = &events[0];
        assert_eq!(le_fly.title(), "Le Fly");
        assert_eq!(
            le_fly.url(),
            "https://www.kulturzentrum-faust.de/veranstaltungen/november/211125-le-fly.html"
        );
        assert_eq!(le_fly.date().year(), 2025);
        assert_eq!(le_fly.date().day(), 21);
        assert_eq!(le_fly.date().hour(), 19);
        assert_eq!(le_fly.date().minute(), 30);
        assert_eq!(le_fly.metadata().text("location"), Some("60er-Jahre Halle"));
        assert_eq!(le_fly.metadata().text("price"), Some("VVK 25€ / AK 32€"));
        assert_eq!(
            le_fly.metadata().text("image_url"),
            Some("https://www.kulturzentrum-faust.de/media/le-fly.jpg")
        );

        let dj = &events[1];
        assert_eq!(dj.date().hour(), 20, "default start time");
    }

    #[test]
    fn deduplicates_across_pages() {
        let mut seen = HashSet::new();
        let first = parse_listing(CONCERT_PAGE, "concert", false, &mut seen);
        let second = parse_listing(CONCERT_PAGE, "party", false, &mut seen);
        assert_eq!(first.len(), 2);
        assert!(second.is_empty());
    }

    #[test]
    fn stage_page_keeps_english_events_only() {
        let mut seen = HashSet::new();
        let events = parse_listing(STAGE_PAGE, "theater", true, &mut seen);
        let titles: Vec<_> = events.iter().map(Event::title).collect();
        assert_eq!(titles, vec!["Stand-up Comedy"]);
        assert_eq!(events[0].metadata().text("event_type"), Some("theater"));
    }

    #[test]
    fn finalize_sorts_and_caps() {
        let mut seen = HashSet::new();
        let mut events = parse_listing(STAGE_PAGE, "theater", false, &mut seen);
        events.extend(parse_listing(CONCERT_PAGE, "concert", false, &mut seen));
        let sorted = finalize(events);
        let days: Vec<u32> = sorted.iter().map(|e| e.date().day()).collect();
        assert_eq!(days, vec![21, 5, 10, 11]);
    }
}
