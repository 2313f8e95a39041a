use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregator::AggregatorSettings;
use crate::utils;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scrape_delay_seconds: f64,
    pub movies_lookahead_days: i64,
    /// Zero or `null` lets a fetch run without a watchdog.
    pub fetch_timeout_seconds: Option<f64>,
    pub output_dir: PathBuf,
    pub disabled_sources: Vec<String>,
    pub github_token: Option<String>,
    pub github_repo: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scrape_delay_seconds: 1.0,
            movies_lookahead_days: 14,
            fetch_timeout_seconds: Some(60.0),
            output_dir: PathBuf::from("output"),
            disabled_sources: Vec::new(),
            github_token: None,
            github_repo: None,
        }
    }
}

impl AppConfig {
    /// Reads the JSON file (explicit path, else the per-user default when it
    /// exists), applies environment overrides and validates the result.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match explicit {
            Some(path) => read_config(path)?,
            None => {
                let path = utils::default_config_path();
                if path.exists() {
                    read_config(&path)?
                } else {
                    debug!(path = ?path, "no config file, using defaults");
                    AppConfig::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overrides fields from `lookup` (normally the process environment).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(value) = lookup("BORINGHANNOVER_SCRAPE_DELAY") {
            self.scrape_delay_seconds = parse_number("scrape_delay_seconds", &value)?;
        }
        if let Some(value) = lookup("BORINGHANNOVER_LOOKAHEAD_DAYS") {
            self.movies_lookahead_days = parse_number("movies_lookahead_days", &value)?;
        }
        if let Some(value) = lookup("BORINGHANNOVER_FETCH_TIMEOUT") {
            self.fetch_timeout_seconds = Some(parse_number("fetch_timeout_seconds", &value)?);
        }
        if let Some(value) = lookup("BORINGHANNOVER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("GITHUB_TOKEN") {
            self.github_token = Some(value);
        }
        if let Some(value) = lookup("GITHUB_REPO") {
            self.github_repo = Some(value);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        seconds("scrape_delay_seconds", self.scrape_delay_seconds)?;
        if self.movies_lookahead_days < 0 {
            return Err(ConfigError::Invalid {
                field: "movies_lookahead_days",
                reason: format!("must be >= 0, got {}", self.movies_lookahead_days),
            });
        }
        if let Some(timeout) = self.fetch_timeout_seconds {
            seconds("fetch_timeout_seconds", timeout)?;
        }
        if let Some(repo) = self.github_repo.as_deref() {
            let valid = repo
                .split_once('/')
                .map(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::Invalid {
                    field: "github_repo",
                    reason: format!("expected owner/name, got {repo:?}"),
                });
            }
        }
        Ok(())
    }

    pub fn aggregator_settings(&self) -> Result<AggregatorSettings, ConfigError> {
        let fetch_timeout = match self.fetch_timeout_seconds {
            Some(secs) => Some(seconds("fetch_timeout_seconds", secs)?).filter(|d| !d.is_zero()),
            None => None,
        };
        Ok(AggregatorSettings {
            scrape_delay: seconds("scrape_delay_seconds", self.scrape_delay_seconds)?,
            lookahead_days: self.movies_lookahead_days,
            fetch_timeout,
        })
    }

    /// Token and repository, when both are configured.
    pub fn github_credentials(&self) -> Option<(&str, &str)> {
        match (self.github_token.as_deref(), self.github_repo.as_deref()) {
            (Some(token), Some(repo)) => Some((token, repo)),
            _ => None,
        }
    }
}

/// Non-negative seconds that fit a `Duration`.
fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value < 0.0 {
        return Err(ConfigError::Invalid {
            field,
            reason: format!("must be >= 0, got {value}"),
        });
    }
    Duration::try_from_secs_f64(value).map_err(|err| ConfigError::Invalid {
        field,
        reason: format!("{value} seconds: {err}"),
    })
}

fn parse_number<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        field,
        reason: format!("not a number: {value:?}"),
    })
}

fn read_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
