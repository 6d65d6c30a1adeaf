//! Client for the Cursor release API.

use crate::version;
use log::debug;
use semver::Version;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Fixed download query: platform and release track are baked in.
pub const DEFAULT_API_URL: &str =
    "https://www.cursor.com/api/download?platform=linux-x64&releaseTrack=stable";

const USER_AGENT: &str = "cursor-manager";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Latest available release as reported by the remote API.
///
/// Only constructed when both fields were present and non-empty in a single
/// successful response; never partially populated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseInfo {
    pub version: Version,
    pub download_url: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed release response: {0}")]
    Parse(String),
}

/// Fetch the latest release from the API.
///
/// One GET, no retries; retrying is the caller's call. A transport failure
/// or non-success status is `Network`, a response body missing either field
/// is `Parse`.
pub fn fetch_latest(api_url: &str) -> Result<ReleaseInfo, FetchError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FetchError::Network(e.to_string()))?;

    debug!("fetching latest release from {api_url}");
    let response = client
        .get(api_url)
        .send()
        .map_err(|e| FetchError::Network(e.to_string()))?;

    if !response.status().is_success() {
        return Err(FetchError::Network(format!(
            "release API returned status {}",
            response.status()
        )));
    }

    let body = response
        .text()
        .map_err(|e| FetchError::Network(e.to_string()))?;

    parse_release_body(&body)
}

/// Extract `version` and `downloadUrl` from the response body.
///
/// Tolerates arbitrary surrounding JSON but requires both fields to be
/// present, string-typed and non-empty.
pub fn parse_release_body(body: &str) -> Result<ReleaseInfo, FetchError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let version_str = string_field(&value, "version")?;
    let download_url = string_field(&value, "downloadUrl")?;

    let version = version::parse_lenient(version_str).ok_or_else(|| {
        FetchError::Parse(format!("unparseable version string {version_str:?}"))
    })?;

    Ok(ReleaseInfo {
        version,
        download_url: download_url.to_string(),
    })
}

fn string_field<'a>(
    value: &'a serde_json::Value,
    name: &str,
) -> Result<&'a str, FetchError> {
    match value.get(name).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => Ok(s),
        _ => Err(FetchError::Parse(format!(
            "missing or empty `{name}` field"
        ))),
    }
}
