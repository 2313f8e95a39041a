//! Sequential, throttled run over every registered source.
//!
//! One run captures "now" once, walks the registry in order, spaces fetch
//! starts by a fixed interval and isolates each source behind a worker thread
//! so an error, panic or hang costs that source's events and nothing else.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{now_civil, Event};
use crate::scraping::{builtin_registry, RegistryError, Source, SourceRegistry};

pub const DEFAULT_SCRAPE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 14;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Source of the run's reference time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        now_civil()
    }
}

#[derive(Clone, Debug)]
pub struct FixedClock(pub DateTime<Tz>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.0
    }
}

pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Records requested pauses instead of sleeping. Clones share the log.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    naps: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn naps(&self) -> Vec<Duration> {
        self.naps.lock().map(|naps| naps.clone()).unwrap_or_default()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        if let Ok(mut naps) = self.naps.lock() {
            naps.push(duration);
        }
    }
}

/// Fixed-interval scheduler: every attempted fetch after the first waits
/// `interval`, whatever the outcome of the previous one.
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    attempts: usize,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            attempts: 0,
        }
    }

    /// Blocks through `sleeper` when needed; returns the pause taken.
    pub fn before_fetch(&mut self, sleeper: &dyn Sleeper) -> Option<Duration> {
        let first = self.attempts == 0;
        self.attempts += 1;
        if first || self.interval.is_zero() {
            return None;
        }
        sleeper.sleep(self.interval);
        Some(self.interval)
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AggregatorSettings {
    pub scrape_delay: Duration,
    pub lookahead_days: i64,
    /// `None` waits for every fetch indefinitely.
    pub fetch_timeout: Option<Duration>,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            scrape_delay: DEFAULT_SCRAPE_DELAY,
            lookahead_days: DEFAULT_LOOKAHEAD_DAYS,
            fetch_timeout: Some(DEFAULT_FETCH_TIMEOUT),
        }
    }
}

/// The two result lists handed to the exporters.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EventBuckets {
    pub movies_this_week: Vec<Event>,
    pub big_events_radar: Vec<Event>,
}

impl EventBuckets {
    pub fn total(&self) -> usize {
        self.movies_this_week.len() + self.big_events_radar.len()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0:#}")]
    Source(anyhow::Error),
    #[error("fetch panicked")]
    Panicked,
    #[error("fetch timed out after {0:?}")]
    TimedOut(Duration),
    #[error("unable to start fetch worker: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct SourceFailure {
    pub key: String,
    pub error: FetchError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceSuccess {
    pub key: String,
    pub events: usize,
}

#[derive(Debug)]
pub struct AggregationReport {
    pub now: DateTime<Tz>,
    pub buckets: EventBuckets,
    pub succeeded: Vec<SourceSuccess>,
    pub failures: Vec<SourceFailure>,
    pub skipped: Vec<String>,
}

pub struct Aggregator {
    registry: SourceRegistry,
    settings: AggregatorSettings,
    clock: Box<dyn Clock>,
    sleeper: Box<dyn Sleeper>,
}

impl Aggregator {
    pub fn new(registry: SourceRegistry, settings: AggregatorSettings) -> Self {
        Self {
            registry,
            settings,
            clock: Box::new(SystemClock),
            sleeper: Box::new(ThreadSleeper),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    pub fn settings(&self) -> &AggregatorSettings {
        &self.settings
    }

    pub fn run(&self) -> AggregationReport {
        let now = self.clock.now();
        let mut throttle = Throttle::new(self.settings.scrape_delay);
        let mut movies = Vec::new();
        let mut radar = Vec::new();
        let mut succeeded = Vec::new();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();

        info!(sources = self.registry.len(), now = %now.to_rfc3339(), "starting aggregation run");

        for entry in self.registry.get_all() {
            let key = entry.key();
            let built = panic::catch_unwind(AssertUnwindSafe(|| {
                let source = entry.instantiate();
                let enabled = source.enabled();
                (source, enabled)
            }));
            let (source, enabled) = match built {
                Ok(built) => built,
                Err(_) => {
                    warn!(source = key, "source constructor panicked");
                    failures.push(SourceFailure {
                        key: key.to_string(),
                        error: FetchError::Panicked,
                    });
                    continue;
                }
            };
            if !enabled {
                info!(source = key, "source disabled, skipping");
                skipped.push(key.to_string());
                continue;
            }

            if let Some(waited) = throttle.before_fetch(self.sleeper.as_ref()) {
                debug!(source = key, delay_ms = waited.as_millis() as u64, "throttled before fetch");
            }

            match self.fetch_isolated(key, source) {
                Ok(events) => {
                    info!(source = key, count = events.len(), "source fetched");
                    succeeded.push(SourceSuccess {
                        key: key.to_string(),
                        events: events.len(),
                    });
                    for event in events {
                        if event.is_movie() {
                            movies.push(event);
                        } else {
                            radar.push(event);
                        }
                    }
                }
                Err(error) => {
                    warn!(source = key, error = %error, "source failed");
                    failures.push(SourceFailure {
                        key: key.to_string(),
                        error,
                    });
                }
            }
        }

        let buckets = bucket_events(movies, radar, &now, self.settings.lookahead_days);
        info!(
            movies = buckets.movies_this_week.len(),
            radar = buckets.big_events_radar.len(),
            succeeded = succeeded.len(),
            failed = failures.len(),
            skipped = skipped.len(),
            "aggregation finished"
        );

        AggregationReport {
            now,
            buckets,
            succeeded,
            failures,
            skipped,
        }
    }

    /// Runs `fetch()` on a named worker thread. A worker that outlives the
    /// timeout is left detached; its result is discarded.
    fn fetch_isolated(&self, key: &str, source: Box<dyn Source>) -> Result<Vec<Event>, FetchError> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name(format!("fetch-{key}"))
            .spawn(move || {
                let _ = tx.send(source.fetch());
            })?;

        let received = match self.settings.fetch_timeout {
            Some(timeout) => rx.recv_timeout(timeout).map_err(|err| match err {
                RecvTimeoutError::Timeout => FetchError::TimedOut(timeout),
                RecvTimeoutError::Disconnected => FetchError::Panicked,
            }),
            None => rx.recv().map_err(|_| FetchError::Panicked),
        }?;
        received.map_err(FetchError::Source)
    }
}

/// Movies inside `[now, now + lookahead_days]`, radar from `now` on; both
/// sorted by date with equal timestamps keeping their arrival order.
pub fn bucket_events(
    mut movies: Vec<Event>,
    mut radar: Vec<Event>,
    now: &DateTime<Tz>,
    lookahead_days: i64,
) -> EventBuckets {
    movies.retain(|event| event.is_within_days_of(lookahead_days, now));
    movies.sort_by(|a, b| a.date().cmp(b.date()));
    radar.retain(|event| event.date() >= now);
    radar.sort_by(|a, b| a.date().cmp(b.date()));
    EventBuckets {
        movies_this_week: movies,
        big_events_radar: radar,
    }
}

/// One run over every built-in source with default settings and the wall clock.
pub fn fetch_all_events() -> Result<EventBuckets, RegistryError> {
    let registry = builtin_registry()?;
    let report = Aggregator::new(registry, AggregatorSettings::default()).run();
    Ok(report.buckets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttle_skips_the_first_fetch() {
        let sleeper = RecordingSleeper::new();
        let mut throttle = Throttle::new(Duration::from_millis(500));
        assert_eq!(throttle.before_fetch(&sleeper), None);
        assert_eq!(throttle.before_fetch(&sleeper), Some(Duration::from_millis(500)));
        assert_eq!(throttle.before_fetch(&sleeper), Some(Duration::from_millis(500)));
        assert_eq!(throttle.attempts(), 3);
        assert_eq!(sleeper.naps(), vec![Duration::from_millis(500); 2]);
    }

    #[test]
    fn zero_interval_never_sleeps() {
        let sleeper = RecordingSleeper::new();
        let mut throttle = Throttle::new(Duration::ZERO);
        for _ in 0..3 {
            assert_eq!(throttle.before_fetch(&sleeper), None);
        }
        assert!(sleeper.naps().is_empty());
    }

    #[test]
    fn recording_sleeper_clones_share_the_log() {
        let sleeper = RecordingSleeper::new();
        let handle = sleeper.clone();
        sleeper.sleep(Duration::from_secs(2));
        assert_eq!(handle.naps(), vec![Duration::from_secs(2)]);
    }

    #[test]
    fn default_settings() {
        let settings = AggregatorSettings::default();
        assert_eq!(settings.scrape_delay, Duration::from_secs(1));
        assert_eq!(settings.lookahead_days, 14);
        assert_eq!(settings.fetch_timeout, Some(Duration::from_secs(60)));
    }
}
