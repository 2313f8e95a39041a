use anyhow::{anyhow, Result};
use chrono::DateTime;
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{now_civil, Category, Event, Metadata};

const KEY: &str = "glocksee";
const NAME: &str = "Glocksee";
const API_URL: &str = "https://cafe-glocksee.cdn.prismic.io/api/v2";
const BASE_URL: &str = "https://cafe-glocksee.de";
const ADDRESS: &str = "Glockseestraße 35, 30169 Hannover";
const PAGE_SIZE: u32 = 20;
const MAX_EVENTS: usize = 30;
const MAX_DESCRIPTION: usize = 300;

#[derive(Debug, Deserialize)]
struct ApiInfo {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master_ref: bool,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<Value>,
    next_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrismicDocument {
    uid: Option<String>,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    #[serde(default)]
    title: Vec<RichText>,
    datetime: Option<String>,
    event_type: Option<String>,
    #[serde(default)]
    text: Vec<RichText>,
    teaser_image: Option<Image>,
    #[serde(default)]
    bands: Vec<Band>,
}

#[derive(Debug, Deserialize)]
struct RichText {
    #[serde(rename = "type")]
    kind: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Band {
    name: Option<String>,
    role: Option<String>,
}

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Glocksee))
}

/// Café Glocksee publishes its program through a Prismic repository.
pub struct Glocksee;

impl Source for Glocksee {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Concert
    }

    fn source_url(&self) -> &'static str {
        BASE_URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = API_URL, "fetching prismic documents");
        let info: ApiInfo = base::fetch_json(API_URL, &[])?;
        let reference = master_ref(&info).ok_or_else(|| anyhow!("prismic api exposes no master ref"))?;

        let now = now_civil();
        let search_url = format!("{API_URL}/documents/search");
        let mut events = Vec::new();
        let mut page = 1u32;

        loop {
            let query = [
                ("ref", reference.to_string()),
                ("q", r#"[[at(document.type, "event")]]"#.to_string()),
                ("orderings", "[my.event.datetime]".to_string()),
                ("page", page.to_string()),
                ("pageSize", PAGE_SIZE.to_string()),
            ];
            let result: Result<SearchPage> = base::fetch_json(&search_url, &query);
            let search = match result {
                Ok(search) => search,
                Err(err) if page > 1 => {
                    warn!(source = KEY, page, error = %err, "stopping pagination");
                    break;
                }
                Err(err) => return Err(err),
            };
            if search.results.is_empty() {
                break;
            }

            events.extend(parse_documents(search.results, &now));
            if events.len() >= MAX_EVENTS || search.next_page.is_none() {
                break;
            }
            page += 1;
        }

        events.sort_by(|a, b| a.date().cmp(b.date()));
        events.truncate(MAX_EVENTS);
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

fn master_ref(info: &ApiInfo) -> Option<&str> {
    info.refs
        .iter()
        .find(|r| r.is_master_ref)
        .map(|r| r.reference.as_str())
}

/// Converts raw search results; documents that do not decode are skipped on their own.
fn parse_documents(results: Vec<Value>, now: &DateTime<Tz>) -> Vec<Event> {
    results
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<PrismicDocument>(raw) {
            Ok(doc) => parse_document(doc, now),
            Err(err) => {
                debug!(source = KEY, error = %err, "skipping undecodable document");
                None
            }
        })
        .collect()
}

fn parse_document(doc: PrismicDocument, now: &DateTime<Tz>) -> Option<Event> {
    let data = doc.data;
    let title = data
        .title
        .first()
        .and_then(|part| part.text.as_deref())
        .map(str::trim)
        .filter(|text| !text.is_empty())?
        .to_string();
    let start = data.datetime.as_deref().and_then(base::parse_iso_civil)?;
    if start < *now {
        return None;
    }

    let url = match doc.uid.as_deref().filter(|uid| !uid.is_empty()) {
        Some(uid) => format!("{BASE_URL}#/event/{uid}"),
        None => BASE_URL.to_string(),
    };

    let description = data
        .text
        .iter()
        .take(2)
        .filter(|part| part.kind.as_deref() == Some("paragraph"))
        .filter_map(|part| part.text.as_deref().map(str::trim))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let support = data
        .bands
        .iter()
        .filter_map(|band| {
            let name = band.name.as_deref()?.trim();
            let role = band.role.as_deref()?.trim();
            (!name.is_empty() && !role.is_empty()).then(|| format!("{name} ({role})"))
        })
        .collect::<Vec<_>>()
        .join(", ");

    let metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("event_type", data.event_type.unwrap_or_else(|| "Konzert".to_string()))
        .with("description", base::truncate_chars(&description, MAX_DESCRIPTION))
        .with(
            "image_url",
            data.teaser_image.and_then(|image| image.url).unwrap_or_default(),
        )
        .with("support", support)
        .with("address", ADDRESS);

    Event::new(title, start, NAME, url, Category::Radar, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid document"))
        .ok()
}
