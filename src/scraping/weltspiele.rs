use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{now_civil, Category, Event, Metadata};

const KEY: &str = "weltspiele";
const NAME: &str = "Weltspiele";
const BASE_URL: &str = "https://weltspiele.club";
const PROGRAM_URL: &str = "https://weltspiele.club/programm/";
const ADDRESS: &str = "Weidendamm 8, 30167 Hannover";
const MAX_EVENTS: usize = 30;
const MAX_LINEUP: usize = 200;
const PAGE_PAUSE: Duration = Duration::from_millis(300);

static MONTH_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.program-month").expect("weltspiele month selector"));
static MONTH_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".program-month-title").expect("weltspiele month title"));
static EVENT_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.program-event").expect("weltspiele event selector"));
static DAY_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".program-event-header .in-brackets").expect("weltspiele day selector")
});
static TAG_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".program-event-tag").expect("weltspiele tag selector"));
static TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.underline").expect("weltspiele title selector"));
static LINEUP_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".program-event-place .underline-rich-text-box")
        .expect("weltspiele lineup selector")
});
static SHOW_DATE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".show-date").expect("weltspiele show date"));
static EVENT_TITLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1.event-title").expect("weltspiele event title"));
static DAY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})").expect("weltspiele day regex"));
static SHOW_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}):(\d{2})").expect("weltspiele time regex"));
static SHOW_DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2})\s+([A-Za-zÄÖÜäöü]+)").expect("weltspiele day month regex")
});

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Weltspiele))
}

/// One row of the program overview. Day and month only; the year and the
/// start time come from the event page.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProgramEntry {
    title: String,
    day: u32,
    month: u32,
    url: String,
    tag: Option<String>,
    lineup: Option<String>,
}

/// What an event detail page adds to its program entry.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct EventPage {
    show_date: Option<String>,
    title: Option<String>,
}

/// Weltspiele club on the Weidendamm.
pub struct Weltspiele;

impl Source for Weltspiele {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Concert
    }

    fn source_url(&self) -> &'static str {
        PROGRAM_URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = PROGRAM_URL, "fetching program page");
        let html = base::fetch_html(PROGRAM_URL)?;
        let today = now_civil().date_naive();
        let entries = parse_program(&html);

        let mut events = Vec::new();
        for (idx, entry) in entries.iter().enumerate() {
            if events.len() >= MAX_EVENTS {
                break;
            }
            if idx > 0 {
                thread::sleep(PAGE_PAUSE);
            }
            let page = match base::fetch_html(&entry.url) {
                Ok(html) => Some(parse_event_page(&html)),
                Err(err) => {
                    debug!(source = KEY, url = %entry.url, error = %err, "event page unavailable");
                    None
                }
            };
            if let Some(event) = build_event(entry, page.as_ref(), today) {
                events.push(event);
            }
        }

        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

pub(crate) fn parse_program(html: &str) -> Vec<ProgramEntry> {
    let document = Html::parse_document(html);
    let mut entries = Vec::new();
    for block in document.select(&MONTH_SELECTOR) {
        let month = base::first_text(&block, &MONTH_TITLE_SELECTOR)
            .and_then(|title| title.split_whitespace().next().and_then(base::month_from_name));
        let Some(month) = month else {
            continue;
        };
        entries.extend(
            block
                .select(&EVENT_SELECTOR)
                .filter_map(|item| parse_program_event(item, month)),
        );
    }
    entries
}

fn parse_program_event(item: ElementRef<'_>, month: u32) -> Option<ProgramEntry> {
    // Each list item is wrapped in the link to its event page.
    let href = item
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "a")
        .and_then(|link| link.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())?;
    let url = base::absolute_url(BASE_URL, Some(href.to_string()))?;

    let day_text = base::first_text(&item, &DAY_SELECTOR)?;
    let day = DAY_RE.captures(&day_text)?.get(1)?.as_str().parse().ok()?;

    let title = item
        .select(&TITLE_SELECTOR)
        .filter(|el| !el.value().classes().any(|class| class == "underline-rich-text-box"))
        .map(base::inner_text)
        .find(|text| !text.is_empty())?;

    let lineup = base::clean_text(
        &item
            .select(&LINEUP_SELECTOR)
            .map(base::inner_text)
            .collect::<Vec<_>>()
            .join(" "),
    );

    Some(ProgramEntry {
        title,
        day,
        month,
        url,
        tag: base::first_text(&item, &TAG_SELECTOR),
        lineup: (!lineup.is_empty()).then_some(lineup),
    })
}

pub(crate) fn parse_event_page(html: &str) -> EventPage {
    let document = Html::parse_document(html);
    let root = document.root_element();
    EventPage {
        show_date: base::first_text(&root, &SHOW_DATE_SELECTOR),
        title: base::first_text(&root, &EVENT_TITLE_SELECTOR),
    }
}

/// Day and month in the coming year window: dates more than a day in the
/// past roll over to next year.
fn compose_date(day: u32, month: u32, today: NaiveDate) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date < today - chrono::Duration::days(1) {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(date)
    }
}

/// Parses "Sat 27 January 22:00-10:00" (English or German month names).
pub(crate) fn parse_show_date(text: &str, today: NaiveDate) -> Option<NaiveDateTime> {
    let time_caps = SHOW_TIME_RE.captures(text)?;
    let time = NaiveTime::from_hms_opt(
        time_caps.get(1)?.as_str().parse().ok()?,
        time_caps.get(2)?.as_str().parse().ok()?,
        0,
    )?;

    let date_caps = SHOW_DAY_MONTH_RE.captures(text)?;
    let day = date_caps.get(1)?.as_str().parse().ok()?;
    let month = base::month_from_name(date_caps.get(2)?.as_str())?;
    let date = compose_date(day, month, today)?;
    Some(NaiveDateTime::new(date, time))
}

/// Program entry plus detail page into an event. Without a usable page the
/// event links to the program and starts at 22:00.
pub(crate) fn build_event(
    entry: &ProgramEntry,
    page: Option<&EventPage>,
    today: NaiveDate,
) -> Option<Event> {
    let from_page = page
        .and_then(|page| page.show_date.as_deref())
        .and_then(|text| parse_show_date(text, today));
    let start = match from_page {
        Some(start) => start,
        None => compose_date(entry.day, entry.month, today)?.and_hms_opt(22, 0, 0)?,
    };

    let title = page
        .and_then(|page| page.title.clone())
        .unwrap_or_else(|| entry.title.clone());
    let url = if page.is_some() {
        entry.url.clone()
    } else {
        PROGRAM_URL.to_string()
    };

    let metadata = Metadata::new()
        .with("time", start.format("%H:%M").to_string())
        .with(
            "subtitle",
            entry
                .lineup
                .as_deref()
                .map(|lineup| base::truncate_chars(lineup, MAX_LINEUP))
                .unwrap_or_default(),
        )
        .with("event_type", entry.tag.clone().unwrap_or_else(|| "club".to_string()))
        .with("address", ADDRESS);

    Event::new(title, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid program entry"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const PROGRAM_HTML: &str = r#"
    <div class="program-month">
      <div class="program-month-title">January</div>
      <a href="/event/techno-nacht/">
        <li class="program-event">
          <div class="program-event-header"><span class="in-brackets">(Sa 27)</span>
            <span class="program-event-tag">Club</span></div>
          <div class="program-event-place">
            <div class="underline">Techno Nacht</div>
            <div class="underline underline-rich-text-box">DJ Alpha <br> b2b DJ Beta</div>
          </div>
        </li>
      </a>
      <a href="https://weltspiele.club/event/no-day/">
        <li class="program-event">
          <div class="program-event-place"><div class="underline">No Day</div></div>
        </li>
      </a>
      <li class="program-event">
        <div class="program-event-header"><span class="in-brackets">(Fr 30)</span></div>
        <div class="program-event-place"><div class="underline">Unlinked</div></div>
      </li>
    </div>
    <div class="program-month">
      <div class="program-month-title">Dezember</div>
      <a href="/event/weihnachtsrave/">
        <li class="program-event">
          <div class="program-event-header"><span class="in-brackets">(Fr 5)</span></div>
          <div class="program-event-place"><div class="underline">Weihnachtsrave</div></div>
        </li>
      </a>
    </div>
    <div class="program-month">
      <div class="program-month-title">Sommerpause</div>
      <a href="/event/ignored/"><li class="program-event">
        <div class="program-event-header"><span class="in-brackets">(1)</span></div>
        <div class="program-event-place"><div class="underline">Ignored</div></div>
      </li></a>
    </div>
    "#;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).expect("valid date")
    }

    #[test]
    fn parses_program_entries() {
        let entries = parse_program(PROGRAM_HTML);
        let titles: Vec<_> = entries.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, vec!["Techno Nacht", "Weihnachtsrave"]);

        let techno = &entries[0];
        assert_eq!((techno.day, techno.month), (27, 1));
        assert_eq!(techno.url, "https://weltspiele.club/event/techno-nacht/");
        assert_eq!(techno.tag.as_deref(), Some("Club"));
        assert_eq!(techno.lineup.as_deref(), Some("DJ Alpha b2b DJ Beta"));
        assert_eq!(entries[1].month, 12);
    }

    #[test]
    fn parses_show_dates() {
        let english = parse_show_date("Sat 27 January 22:00-10:00", today()).expect("english");
        assert_eq!((english.month(), english.day(), english.hour()), (1, 27, 22));

        let german = parse_show_date("Sa 15 Februar 21:00", today()).expect("german");
        assert_eq!((german.month(), german.day(), german.hour()), (2, 15, 21));

        assert_eq!(parse_show_date("", today()), None);
        assert_eq!(parse_show_date("No date here", today()), None);
        assert_eq!(parse_show_date("27 January", today()), None, "time is required");
    }

    #[test]
    fn past_dates_roll_over_to_next_year() {
        assert_eq!(compose_date(5, 12, today()), NaiveDate::from_ymd_opt(2026, 12, 5));
        assert_eq!(compose_date(9, 1, today()), NaiveDate::from_ymd_opt(2026, 1, 9));
        assert_eq!(compose_date(8, 1, today()), NaiveDate::from_ymd_opt(2027, 1, 8));
        assert_eq!(compose_date(31, 2, today()), None);
    }

    #[test]
    fn detail_page_supplies_time_and_title() {
        let entries = parse_program(PROGRAM_HTML);
        let page = parse_event_page(
            r#"<p class="show-date">Sat 27 January 23:30-08:00</p>
               <h1 class="event-title">Techno Nacht w/ DJ Alpha</h1>"#,
        );
        let event = build_event(&entries[0], Some(&page), today()).expect("event");

        assert_eq!(event.title(), "Techno Nacht w/ DJ Alpha");
        assert_eq!(event.date().hour(), 23);
        assert_eq!(event.date().minute(), 30);
        assert_eq!(event.url(), "https://weltspiele.club/event/techno-nacht/");
        assert_eq!(event.category(), Category::Radar);
        assert_eq!(event.metadata().text("time"), Some("23:30"));
        assert_eq!(event.metadata().text("event_type"), Some("Club"));
        assert_eq!(event.metadata().text("subtitle"), Some("DJ Alpha b2b DJ Beta"));
        assert!(event.metadata().text("address").is_some_and(|a| a.contains("Hannover")));
    }

    #[test]
    fn missing_page_falls_back_to_program_defaults() {
        let entries = parse_program(PROGRAM_HTML);
        let event = build_event(&entries[1], None, today()).expect("event");

        assert_eq!(event.title(), "Weihnachtsrave");
        assert_eq!(event.url(), PROGRAM_URL);
        assert_eq!(event.date().year(), 2026);
        assert_eq!(event.date().hour(), 22);
        assert_eq!(event.metadata().text("event_type"), Some("club"));
        assert_eq!(event.metadata().text("subtitle"), Some(""));
    }

    #[test]
    fn page_without_show_date_keeps_program_date() {
        let entries = parse_program(PROGRAM_HTML);
        let page = EventPage::default();
        let event = build_event(&entries[0], Some(&page), today()).expect("event");
        assert_eq!(event.title(), "Techno Nacht");
        assert_eq!((event.date().day(), event.date().hour()), (27, 22));
        assert_eq!(event.url(), "https://weltspiele.club/event/techno-nacht/");
    }
}
