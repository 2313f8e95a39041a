pub mod aggregator;
pub mod config;
pub mod export;
pub mod genre;
pub mod github_sync;
pub mod logging;
pub mod models;
pub mod sanitize;
pub mod scraping;
mod utils;

use std::path::PathBuf;

use anyhow::Context;
use tracing::{error, info, warn};

pub use aggregator::{fetch_all_events, Aggregator, AggregatorSettings, EventBuckets};
pub use config::AppConfig;
pub use models::{Category, Event, Metadata};

/// Command-line switches that shape a single run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Export only; never push to GitHub.
    pub local: bool,
    pub config_path: Option<PathBuf>,
    /// Overrides `output_dir` from the config.
    pub output_dir: Option<PathBuf>,
    /// Restrict the run to these registry keys.
    pub only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub movies: usize,
    pub radar: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
    pub files: Vec<PathBuf>,
    pub synced: bool,
}

/// Loads the config and returns the registry it describes, with disabled
/// sources switched off and `only` applied.
pub fn prepare_registry(
    config: &AppConfig,
    only: &[String],
) -> anyhow::Result<scraping::SourceRegistry> {
    let mut registry = scraping::builtin_registry().context("unable to build source registry")?;
    for key in registry.disable(&config.disabled_sources) {
        warn!(source = %key, "disabled_sources names an unknown source");
    }
    if !only.is_empty() {
        registry.retain_keys(only)?;
    }
    Ok(registry)
}

/// The weekly workflow: aggregate, export, then optionally sync.
pub fn run(options: &RunOptions) -> anyhow::Result<RunSummary> {
    let mut config = AppConfig::load(options.config_path.as_deref())?;
    if let Some(dir) = &options.output_dir {
        config.output_dir = dir.clone();
    }

    let registry = prepare_registry(&config, &options.only)?;
    let report = Aggregator::new(registry, config.aggregator_settings()?).run();

    for failure in &report.failures {
        warn!(source = %failure.key, error = %failure.error, "no events from source this run");
    }
    info!(
        movies = report.buckets.movies_this_week.len(),
        radar = report.buckets.big_events_radar.len(),
        "run summary"
    );

    let files = export::export_all(&report.buckets, &report.now, &config.output_dir)
        .context("unable to write exports")?;

    let mut synced = false;
    if options.local {
        info!("local run, skipping github sync");
    } else if github_sync::should_sync(&config) {
        let web_events = config.output_dir.join(export::WEB_EVENTS_JSON);
        match github_sync::sync_config(&config, &web_events) {
            Ok(outcome) => {
                info!(outcome = ?outcome, "github sync finished");
                synced = true;
            }
            Err(err) => error!(error = %err, "github sync failed, site keeps stale data"),
        }
    }

    Ok(RunSummary {
        movies: report.buckets.movies_this_week.len(),
        radar: report.buckets.big_events_radar.len(),
        succeeded: report.succeeded.into_iter().map(|s| s.key).collect(),
        failed: report.failures.into_iter().map(|f| f.key).collect(),
        skipped: report.skipped,
        files,
        synced,
    })
}
