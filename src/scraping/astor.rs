use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::base;
use super::{RegistryError, Source, SourceRegistry, SourceType};
use crate::models::{Category, Event, Metadata};

const KEY: &str = "astor";
const NAME: &str = "Astor Grand Cinema";
const SITE_URL: &str = "https://hannover.premiumkino.de";
const API_URL: &str = "https://backend.premiumkino.de/v1/de/hannover/program";

/// Program feed of the premiumkino backend: movies and performances are
/// separate lists joined on `movieId`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Program {
    genres: Vec<Genre>,
    movies: Vec<Movie>,
    performances: Vec<Performance>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    id: Value,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Movie {
    id: Value,
    name: Option<String>,
    minutes: Option<i64>,
    rating: Option<i64>,
    year: Option<i64>,
    country: Option<String>,
    slug: Option<String>,
    #[serde(default)]
    genre_ids: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Performance {
    movie_id: Value,
    begin: Option<String>,
    language: Option<String>,
}

pub fn register(registry: &mut SourceRegistry) -> Result<(), RegistryError> {
    registry.register(KEY, || Box::new(Astor))
}

/// Astor Grand Cinema. Only performances in the original language are kept;
/// German dubs make up most of the program.
pub struct Astor;

impl Source for Astor {
    fn source_name(&self) -> &'static str {
        NAME
    }

    fn source_type(&self) -> SourceType {
        SourceType::Cinema
    }

    fn source_url(&self) -> &'static str {
        SITE_URL
    }

    fn fetch(&self) -> Result<Vec<Event>> {
        info!(source = KEY, url = API_URL, "fetching program feed");
        let program: Program = base::fetch_json(API_URL, &[])?;
        let events = parse_program(program);
        info!(source = KEY, count = events.len(), "parsed events");
        Ok(events)
    }
}

/// The spoken language of a label such as "Sprache: Englisch, Untertitel: Deutsch".
fn spoken_language(label: &str) -> &str {
    const MARKER: &str = "sprache:";
    let rest = label
        .char_indices()
        .find(|(idx, _)| {
            label
                .get(*idx..idx + MARKER.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(MARKER))
        })
        .map(|(idx, _)| &label[idx + MARKER.len()..])
        .unwrap_or(label);
    rest.split([',', ';', '|']).next().unwrap_or_default().trim()
}

fn is_german_dub(label: &str) -> bool {
    spoken_language(label).to_lowercase().starts_with("deutsch")
}

fn parse_program(program: Program) -> Vec<Event> {
    let genres: HashMap<String, &str> = program
        .genres
        .iter()
        .map(|genre| (genre.id.to_string(), genre.name.as_str()))
        .collect();
    let movies: HashMap<String, &Movie> = program
        .movies
        .iter()
        .map(|movie| (movie.id.to_string(), movie))
        .collect();

    let mut events: Vec<Event> = program
        .performances
        .iter()
        .filter_map(|performance| {
            let movie = movies.get(&performance.movie_id.to_string())?;
            build_event(movie, performance, &genres)
        })
        .collect();
    events.sort_by(|a, b| a.date().cmp(b.date()));
    events
}

fn build_event(
    movie: &Movie,
    performance: &Performance,
    genres: &HashMap<String, &str>,
) -> Option<Event> {
    let title = movie.name.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    let language = performance.language.as_deref().unwrap_or_default().trim();
    if language.is_empty() || is_german_dub(language) {
        debug!(source = KEY, title, language, "skipping dubbed or unlabelled performance");
        return None;
    }
    let start = performance.begin.as_deref().and_then(base::parse_iso_civil)?;

    let genre_names: Vec<String> = movie
        .genre_ids
        .iter()
        .filter_map(|id| genres.get(&id.to_string()))
        .map(|name| name.to_string())
        .collect();

    let mut metadata = Metadata::new()
        .with("time", base::clock_time(&start))
        .with("language", language)
        .with("original_version", true);
    if let Some(minutes) = movie.minutes {
        metadata.insert("duration", minutes);
    }
    if let Some(rating) = movie.rating {
        metadata.insert("rating", rating);
    }
    if let Some(year) = movie.year {
        metadata.insert("year", year);
    }
    if let Some(country) = movie.country.as_deref().filter(|c| !c.is_empty()) {
        metadata.insert("country", country);
    }
    if !genre_names.is_empty() {
        metadata.insert("genres", genre_names);
    }

    let url = match movie.slug.as_deref().filter(|slug| !slug.is_empty()) {
        Some(slug) => format!("{SITE_URL}/film/{slug}"),
        None => SITE_URL.to_string(),
    };

    Event::new(title, start, NAME, url, Category::Movie, metadata)
        .map_err(|err| debug!(source = KEY, error = %err, "skipping invalid performance"))
        .ok()
}
