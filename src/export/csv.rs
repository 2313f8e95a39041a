//! Spreadsheet-friendly exports. Fields are quoted per RFC 4180 when they
//! contain a comma, quote or line break.

use super::group_films;
use crate::models::{Event, MetaValue};

const MOVIE_HEADERS: [&str; 7] = ["date", "day", "time", "title", "venue", "original_version", "url"];
const GROUPED_HEADERS: [&str; 5] = ["title", "venue", "showings", "showtimes", "url"];
const CONCERT_HEADERS: [&str; 9] = [
    "date", "day", "time", "title", "venue", "genre", "event_type", "address", "url",
];

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

fn push_row<S: AsRef<str>>(out: &mut String, row: &[S]) {
    for (idx, cell) in row.iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        let cell = cell.as_ref();
        if needs_quotes(cell) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push_str("\r\n");
}

fn meta_text(event: &Event, key: &str) -> String {
    match event.metadata().get(key) {
        Some(MetaValue::Text(text)) => text.clone(),
        Some(MetaValue::Bool(flag)) => flag.to_string(),
        Some(MetaValue::Int(number)) => number.to_string(),
        Some(MetaValue::List(items)) => items.join("; "),
        None => String::new(),
    }
}

fn date_cells(event: &Event) -> [String; 3] {
    [
        event.date().format("%Y-%m-%d").to_string(),
        event.date().format("%a").to_string(),
        event.date().format("%H:%M").to_string(),
    ]
}

/// One row per showing.
pub fn movies_csv(movies: &[Event]) -> String {
    let mut out = String::new();
    push_row(&mut out, &MOVIE_HEADERS);
    for event in movies {
        let [date, day, time] = date_cells(event);
        push_row(
            &mut out,
            &[
                date,
                day,
                time,
                event.title().to_string(),
                event.venue().to_string(),
                meta_text(event, "original_version"),
                event.url().to_string(),
            ],
        );
    }
    out
}

/// One row per film with its showtimes joined.
pub fn movies_grouped_csv(movies: &[Event]) -> String {
    let mut out = String::new();
    push_row(&mut out, &GROUPED_HEADERS);
    for group in group_films(movies) {
        let showtimes = group
            .showings
            .iter()
            .map(|event| format!("{} {}", event.format_date_short(), event.date().format("%H:%M")))
            .collect::<Vec<_>>()
            .join("; ");
        let url = group
            .showings
            .first()
            .map(|event| event.url().to_string())
            .unwrap_or_default();
        push_row(
            &mut out,
            &[
                group.title.to_string(),
                group.venue.to_string(),
                group.showings.len().to_string(),
                showtimes,
                url,
            ],
        );
    }
    out
}

pub fn concerts_csv(radar: &[Event]) -> String {
    let mut out = String::new();
    push_row(&mut out, &CONCERT_HEADERS);
    for event in radar {
        let [date, day, time] = date_cells(event);
        push_row(
            &mut out,
            &[
                date,
                day,
                time,
                event.title().to_string(),
                event.venue().to_string(),
                meta_text(event, "genre"),
                meta_text(event, "event_type"),
                meta_text(event, "address"),
                event.url().to_string(),
            ],
        );
    }
    out
}
