pub mod apollokino;
pub mod astor;
pub mod base;
pub mod broncos;
pub mod erhardt;
pub mod faust;
pub mod glocksee;
pub mod ics;
pub mod kulturpalast;
pub mod punkrock_konzerte;
pub mod weltspiele;

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::models::Event;

/// Grouping of sources by the kind of venue they cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Cinema,
    Concert,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Cinema => "cinema",
            SourceType::Concert => "concert",
        }
    }
}

/// Contract every venue adapter implements.
///
/// `fetch` is best effort: a listing that cannot be parsed is skipped, only
/// failures that make the whole page unusable are returned as errors.
pub trait Source: Send {
    fn source_name(&self) -> &'static str;
    fn source_type(&self) -> SourceType;
    fn source_url(&self) -> &'static str;
    fn enabled(&self) -> bool {
        true
    }
    fn fetch(&self) -> anyhow::Result<Vec<Event>>;
}

pub type SourceFactory = Arc<dyn Fn() -> Box<dyn Source> + Send + Sync>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source key registered twice: {0}")]
    DuplicateKey(String),
    #[error("unknown source key: {0}")]
    UnknownSource(String),
}

#[derive(Clone)]
pub struct SourceEntry {
    key: String,
    factory: SourceFactory,
}

impl SourceEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn instantiate(&self) -> Box<dyn Source> {
        (self.factory)()
    }
}

#[derive(Clone, Serialize)]
pub struct SourceInfo {
    pub key: String,
    pub name: String,
    pub source_type: SourceType,
    pub url: String,
    pub enabled: bool,
}

/// Key → factory table, filled once at start-up and read-only afterwards.
/// Iteration follows registration order so run logs are reproducible.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, key: &str, factory: F) -> Result<(), RegistryError>
    where
        F: Fn() -> Box<dyn Source> + Send + Sync + 'static,
    {
        if self.get(key).is_some() {
            return Err(RegistryError::DuplicateKey(key.to_string()));
        }
        self.entries.push(SourceEntry {
            key: key.to_string(),
            factory: Arc::new(factory),
        });
        Ok(())
    }

    pub fn get_all(&self) -> &[SourceEntry] {
        &self.entries
    }

    pub fn get(&self, key: &str) -> Option<&SourceEntry> {
        self.entries.iter().find(|entry| entry.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.key.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_type(&self, source_type: SourceType) -> Vec<&SourceEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.instantiate().source_type() == source_type)
            .collect()
    }

    /// Restricts the registry to `keys`, keeping registration order.
    pub fn retain_keys(&mut self, keys: &[String]) -> Result<(), RegistryError> {
        if let Some(unknown) = keys.iter().find(|key| self.get(key).is_none()) {
            return Err(RegistryError::UnknownSource(unknown.clone()));
        }
        self.entries.retain(|entry| keys.contains(&entry.key));
        Ok(())
    }

    /// Switches sources off without removing them; unknown keys are returned.
    pub fn disable(&mut self, keys: &[String]) -> Vec<String> {
        let unknown = keys
            .iter()
            .filter(|key| self.get(key).is_none())
            .cloned()
            .collect();
        for entry in self.entries.iter_mut() {
            if keys.contains(&entry.key) {
                let inner = entry.factory.clone();
                entry.factory = Arc::new(move || Box::new(Disabled(inner())) as Box<dyn Source>);
            }
        }
        unknown
    }

    pub fn list(&self) -> Vec<SourceInfo> {
        self.entries
            .iter()
            .map(|entry| {
                let source = entry.instantiate();
                SourceInfo {
                    key: entry.key.clone(),
                    name: source.source_name().to_string(),
                    source_type: source.source_type(),
                    url: source.source_url().to_string(),
                    enabled: source.enabled(),
                }
            })
            .collect()
    }
}

struct Disabled(Box<dyn Source>);

impl Source for Disabled {
    fn source_name(&self) -> &'static str {
        self.0.source_name()
    }

    fn source_type(&self) -> SourceType {
        self.0.source_type()
    }

    fn source_url(&self) -> &'static str {
        self.0.source_url()
    }

    fn enabled(&self) -> bool {
        false
    }

    fn fetch(&self) -> anyhow::Result<Vec<Event>> {
        Ok(Vec::new())
    }
}

/// Every venue adapter shipped with the crate, one registration call per module.
pub fn builtin_registry() -> Result<SourceRegistry, RegistryError> {
    let mut registry = SourceRegistry::new();
    apollokino::register(&mut registry)?;
    astor::register(&mut registry)?;
    broncos::register(&mut registry)?;
    faust::register(&mut registry)?;
    glocksee::register(&mut registry)?;
    erhardt::register(&mut registry)?;
    kulturpalast::register(&mut registry)?;
    punkrock_konzerte::register(&mut registry)?;
    weltspiele::register(&mut registry)?;
    Ok(registry)
}

/// Runs one registered source by key, outside the orchestrator.
pub fn run_single(registry: &SourceRegistry, key: &str) -> anyhow::Result<Vec<Event>> {
    let entry = registry
        .get(key)
        .ok_or_else(|| RegistryError::UnknownSource(key.to_string()))?;
    entry.instantiate().fetch()
}
