//! Pushes `web_events.json` to the site repository through the GitHub
//! Contents API so the front end rebuilds with fresh data.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{blocking::Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const WEB_EVENTS_REPO_PATH: &str = "web/output/web_events.json";
pub const COMMIT_MESSAGE: &str = "chore: update weekly event data [automated]";
const API_VERSION: &str = "2022-11-28";
const SYNC_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("github_token and github_repo must both be set")]
    MissingCredentials,
    #[error("github request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("github api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("local file not found: {0:?}")]
    MissingFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Remote content matches apart from the update timestamp.
    Unchanged,
    Committed { commit_sha: Option<String> },
}

#[derive(Debug, Deserialize)]
struct RemoteFile {
    sha: Option<String>,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct PutContents<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    commit: Option<CommitRef>,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: Option<String>,
}

pub fn should_sync(config: &AppConfig) -> bool {
    config.github_credentials().is_some()
}

/// Canonical form used for change detection: `meta.updatedAt` removed, keys
/// sorted, no whitespace. `None` when `raw` is not JSON.
pub fn normalize_events_json(raw: &[u8]) -> Option<String> {
    let mut value: Value = serde_json::from_slice(raw).ok()?;
    if let Some(meta) = value.get_mut("meta").and_then(Value::as_object_mut) {
        meta.remove("updatedAt");
    }
    // serde_json's default map is ordered, so the output is key-sorted.
    serde_json::to_string(&value).ok()
}

/// Contents API payloads wrap their base64 at 60 columns.
fn decode_content(encoded: &str) -> Option<Vec<u8>> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD.decode(compact).ok()
}

pub fn sync_config(config: &AppConfig, local_path: &Path) -> Result<SyncOutcome, SyncError> {
    let (token, repo) = config.github_credentials().ok_or(SyncError::MissingCredentials)?;
    sync_to_github(token, repo, local_path)
}

pub fn sync_to_github(token: &str, repo: &str, local_path: &Path) -> Result<SyncOutcome, SyncError> {
    if token.is_empty() || repo.is_empty() {
        return Err(SyncError::MissingCredentials);
    }
    let local = fs::read(local_path).map_err(|_| SyncError::MissingFile(local_path.to_path_buf()))?;

    let client = Client::builder().timeout(SYNC_TIMEOUT).build()?;
    let url = format!("{GITHUB_API_BASE}/repos/{repo}/contents/{WEB_EVENTS_REPO_PATH}");
    let request = |builder: reqwest::blocking::RequestBuilder| {
        builder
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(reqwest::header::USER_AGENT, "boringhannover")
    };

    let existing = request(client.get(&url)).send()?;
    let remote = match existing.status() {
        StatusCode::OK => Some(existing.json::<RemoteFile>()?),
        StatusCode::NOT_FOUND => None,
        status => return Err(api_error(status, existing)),
    };

    if let Some(raw) = remote
        .as_ref()
        .and_then(|file| file.content.as_deref())
        .and_then(decode_content)
    {
        let unchanged = matches!(
            (normalize_events_json(&raw), normalize_events_json(&local)),
            (Some(remote), Some(local)) if remote == local
        );
        if unchanged {
            info!(repo, "no meaningful changes, skipping commit");
            return Ok(SyncOutcome::Unchanged);
        }
    }

    let previous_sha = remote.as_ref().and_then(|file| file.sha.as_deref());
    match previous_sha {
        Some(sha) => debug!(repo, sha = %sha.chars().take(7).collect::<String>(), "updating existing file"),
        None => debug!(repo, "creating file"),
    }
    let payload = PutContents {
        message: COMMIT_MESSAGE,
        content: STANDARD.encode(&local),
        sha: previous_sha,
    };

    let response = request(client.put(&url)).json(&payload).send()?;
    if !response.status().is_success() {
        return Err(api_error(response.status(), response));
    }
    let commit_sha = response
        .json::<PutResponse>()
        .ok()
        .and_then(|body| body.commit)
        .and_then(|commit| commit.sha);
    info!(repo, commit = commit_sha.as_deref().unwrap_or("unknown"), "synced web events to github");
    Ok(SyncOutcome::Committed { commit_sha })
}

fn api_error(status: StatusCode, response: reqwest::blocking::Response) -> SyncError {
    let body = response
        .text()
        .map(|text| text.chars().take(ERROR_BODY_LIMIT).collect())
        .unwrap_or_else(|_| "no details".to_string());
    SyncError::Api { status, body }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_ignores_update_timestamp_and_key_order() {
        let a = br#"{"meta":{"updatedAt":"2025-11-24T09:00:00+01:00","week":48},"movies":[],"radar":[]}"#;
        let b = br#"{"radar":[],"movies":[],"meta":{"week":48,"updatedAt":"2025-11-25T09:00:00+01:00"}}"#;
        assert_eq!(normalize_events_json(a), normalize_events_json(b));
        assert_eq!(
            normalize_events_json(a).as_deref(),
            Some(r#"{"meta":{"week":48},"movies":[],"radar":[]}"#)
        );
    }

    #[test]
    fn normalization_detects_real_changes() {
        let a = br#"{"meta":{"week":48},"radar":[{"title":"Turbostaat"}]}"#;
        let b = br#"{"meta":{"week":48},"radar":[{"title":"Kettcar"}]}"#;
        assert_ne!(normalize_events_json(a), normalize_events_json(b));
        assert_eq!(normalize_events_json(b"not json"), None);
    }

    #[test]
    fn decodes_wrapped_base64() {
        let encoded = STANDARD.encode(br#"{"meta":{}}"#);
        let (head, tail) = encoded.split_at(8);
        let wrapped = format!("{head}\n{tail}\n");
        assert_eq!(decode_content(&wrapped), Some(br#"{"meta":{}}"#.to_vec()));
    }

    #[test]
    fn requires_credentials_and_file() {
        assert!(!should_sync(&AppConfig::default()));
        assert!(matches!(
            sync_config(&AppConfig::default(), Path::new("output/web_events.json")),
            Err(SyncError::MissingCredentials)
        ));
        assert!(matches!(
            sync_to_github("token", "owner/site", Path::new("/definitely/not/here.json")),
            Err(SyncError::MissingFile(_))
        ));
    }
}
