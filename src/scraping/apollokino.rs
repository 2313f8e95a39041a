use anyhow::Result;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{now_civil, Category, Event, Metadata};

const KEY: &str = "apollokino";
const URL: &str = "https://www.apollokino.de/?mp=OmU-Nachtstudio";
const NAME: &str = "Apollokino Hannover";

/// Shows listed on the OmU page that are not films.
const BLACKLIST: [&str; 2] = ["desimo", "spezial club"];

static BLOCK_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div.datumzeile, table.filmtabelle").expect("apollokino block selector")
});
static DAY_TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table.tagestabelle").expect("apollokino day table"));
static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("apollokino row"));
static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("apollokino cell"));
static LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("a").expect("apollokino link"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h2.filmtitel").expect("apollokino title"));
static SYNOPSIS_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.filminhalt").expect("apollokino synopsis"));
static NOTE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.filmanmerkung").expect("apollokino note"));
static IMAGE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("img").expect("apollokino image"));
static FORM_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("form").expect("apollokino form"));
static TIME_TITLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<time>\d{1,2}:\d{2}):?\s*(?P<title>.+)$").expect("apollokino time regex")
});

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Apollokino))
}

pub struct Apollokino;

impl Source for Apollokino {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Cinema
    }

    fn source_url(&self) -> &'static str {
        URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = URL, "fetching program page");
        let html = base::fetch_html(URL)?;
        let events = self.parse_document(&html, now_civil().date_naive());
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

impl Apollokino {
    /// The page alternates `div.datumzeile` date lines with `table.filmtabelle`
    /// blocks; each table belongs to the closest preceding date line.
    pub(crate) fn parse_document(&self, html: &str, today: NaiveDate) -> Vec<Event> {
        let document = Html::parse_document(html);
        let mut events = Vec::new();
        let mut current_date: Option<NaiveDate> = None;

        for block in document.select(&BLOCK_SELECTOR) {
            if block.value().name() == "div" {
                let text = base::inner_text(block);
                current_date = base::parse_german_date_from(&text, today);
                if current_date.is_none() {
                    debug!(source = KEY, text = %text, "could not parse date line");
                }
                continue;
            }

            let Some(date) = current_date else {
                continue;
            };
            for day_table in block.select(&DAY_TABLE_SELECTOR) {
                for row in day_table.select(&ROW_SELECTOR) {
                    let Some(cell) = row.select(&CELL_SELECTOR).next() else {
                        continue;
                    };
                    if let Some(event) = parse_showing(cell, date) {
                        events.push(event);
                    }
                }
            }
        }

        events
    }
}

fn parse_showing(cell: ElementRef<'_>, date: NaiveDate) -> Option<Event> {
    let link = cell.select(&LINK_SELECTOR).next();
    let (heading, detail_href) = match link {
        Some(link) => (
            base::first_text(&link, &TITLE_SELECTOR).unwrap_or_else(|| base::inner_text(link)),
            link.value().attr("href").map(str::to_string),
        ),
        None => (base::first_text(&cell, &TITLE_SELECTOR)?, None),
    };

    let Some(caps) = TIME_TITLE_RE.captures(&heading) else {
        debug!(source = KEY, heading = %heading, "skipping row without time/title");
        return None;
    };
    let time = base::find_first_time(caps.name("time")?.as_str())?;
    let title = caps.name("title")?.as_str().trim().to_string();

    let note = base::first_text(&cell, &NOTE_SELECTOR).unwrap_or_default();
    let note_lower = note.to_lowercase();
    if !note_lower.contains("omu-nachtstudio") {
        debug!(source = KEY, title = %title, note = %note, "skipping non-OmU showing");
        return None;
    }
    let title_lower = title.to_lowercase();
    if BLACKLIST
        .iter()
        .any(|entry| note_lower.contains(entry) || title_lower.contains(entry))
    {
        debug!(source = KEY, title = %title, "skipping blacklisted show");
        return None;
    }

    let synopsis = base::first_text(&cell, &SYNOPSIS_SELECTOR).unwrap_or_default();
    let poster_url =
        base::absolute_url(URL, base::first_attr(&cell, &IMAGE_SELECTOR, "src")).unwrap_or_default();
    let ticket_url = base::absolute_url(URL, base::first_attr(&cell, &FORM_SELECTOR, "action"));
    let detail_url = base::absolute_url(URL, detail_href.filter(|href| !href.is_empty()));
    let url = detail_url
        .or(ticket_url)
        .unwrap_or_else(|| URL.to_string());

    let start = base::to_civil(date, time)?;
    let metadata = Metadata::new()
        .with("synopsis", synopsis)
        .with("original_version", base::is_original_version(&note))
        .with("poster_url", poster_url)
        .with("time", base::clock_time(&start));

    match Event::new(title, start, NAME, url, Category::Movie, metadata) {
        Ok(event) => Some(event),
        Err(err) => {
            debug!(source = KEY, error = %err, "skipping invalid showing");
            None
        }
    }
}
