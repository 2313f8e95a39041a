//! Human-readable renderings: the Markdown digest and the short chat message.

use std::fmt::Write;

use chrono::{DateTime, Datelike};
use chrono_tz::Tz;

use super::group_films;
use crate::aggregator::EventBuckets;
use crate::models::{Event, MetaValue};

const NO_MOVIES: &str = "No original-version screenings this week.";
const NO_RADAR: &str = "Nothing on the radar yet.";

fn link(title: &str, url: &str) -> String {
    if url.is_empty() {
        title.to_string()
    } else {
        format!("[{title}]({url})")
    }
}

fn radar_details(event: &Event) -> String {
    let mut details = vec![event.venue().to_string()];
    if let Some(MetaValue::Text(genre)) = event.metadata().get("genre") {
        if !genre.is_empty() {
            details.push(genre.clone());
        }
    }
    details.join(", ")
}

/// `weekly_digest.md`: movies grouped by day, radar grouped by month.
pub fn weekly_digest(buckets: &EventBuckets, now: &DateTime<Tz>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Hannover Week {}", now.iso_week().week());
    let _ = writeln!(out);
    let _ = writeln!(out, "_Updated {}_", now.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(out);

    let _ = writeln!(out, "## Movies (This Week)");
    if buckets.movies_this_week.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{NO_MOVIES}");
    }
    let mut current_day = None;
    for event in &buckets.movies_this_week {
        let day = event.date().date_naive();
        if current_day != Some(day) {
            current_day = Some(day);
            let _ = writeln!(out);
            let _ = writeln!(out, "### {}", event.format_date_short());
        }
        let _ = writeln!(
            out,
            "- {} {} ({})",
            event.date().format("%H:%M"),
            link(event.title(), event.url()),
            event.venue()
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "## On The Radar");
    if buckets.big_events_radar.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "{NO_RADAR}");
    }
    let mut current_month = None;
    for event in &buckets.big_events_radar {
        let month = (event.date().year(), event.date().month());
        if current_month != Some(month) {
            current_month = Some(month);
            let _ = writeln!(out);
            let _ = writeln!(out, "### {}", event.date().format("%B %Y"));
        }
        let _ = writeln!(
            out,
            "- {} {} ({})",
            event.format_date_long(now),
            link(event.title(), event.url()),
            radar_details(event)
        );
    }
    out
}

/// `latest_message.txt`: a compact chat-style summary with one line per film.
pub fn message(buckets: &EventBuckets, now: &DateTime<Tz>) -> String {
    let mut lines = vec![format!("*Hannover Week {}*", now.iso_week().week()), String::new()];

    lines.push("*Movies (This Week)*".to_string());
    let films = group_films(&buckets.movies_this_week);
    if films.is_empty() {
        lines.push(NO_MOVIES.to_string());
    }
    for film in &films {
        let times = film
            .showings
            .iter()
            .map(|event| event.format_time())
            .collect::<Vec<_>>()
            .join(", ");
        lines.push(format!("- {} ({}): {}", film.title, film.venue, times));
    }

    lines.push(String::new());
    lines.push("*On The Radar*".to_string());
    if buckets.big_events_radar.is_empty() {
        lines.push(NO_RADAR.to_string());
    }
    for event in &buckets.big_events_radar {
        lines.push(format!(
            "- {}: {} @ {}",
            event.format_date_long(now),
            event.title(),
            event.venue()
        ));
    }

    lines.join("\n")
}
