use serde::Deserialize;
use url::form_urlencoded;

use crate::ornament::{Fingerprint, Ornament, SaveOrnamentRequest};

pub const ORNAMENTS_PATH: &str = "/api/ornaments";
pub const CACHE_BUST_PARAM: &str = "t";
pub const DELETE_ID_PARAM: &str = "ornamentId";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded with status {0}")]
    Status(u16),
    #[error("{0}")]
    Rejected(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("response carried no ornament list")]
    MissingList,
}

impl GatewayError {
    /// Message shown to the user for a failed save.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            GatewayError::Rejected(message) if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CreateReceipt {
    pub user_count: Option<u32>,
}

/// Access to the shared ornament list behind `/api/ornaments`.
#[allow(async_fn_in_trait)]
pub trait OrnamentGateway {
    async fn list(&self) -> Result<Vec<Ornament>, GatewayError>;
    async fn create(&self, request: &SaveOrnamentRequest) -> Result<CreateReceipt, GatewayError>;
    async fn remove(&self, fingerprint: &Fingerprint) -> Result<(), GatewayError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBody {
    #[serde(default)]
    ornaments: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody {
    #[serde(default)]
    user_count: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Parses a list response. Entries that are not ornament objects are dropped.
pub fn parse_list_body(body: &str) -> Result<Vec<Ornament>, GatewayError> {
    let parsed: ListBody =
        serde_json::from_str(body).map_err(|err| GatewayError::Malformed(err.to_string()))?;
    if let Some(message) = parsed.error.as_ref().and_then(error_text) {
        return Err(GatewayError::Rejected(message));
    }
    let Some(serde_json::Value::Array(entries)) = parsed.ornaments else {
        return Err(GatewayError::MissingList);
    };
    Ok(entries
        .into_iter()
        .filter(|entry| entry.is_object())
        .filter_map(|entry| serde_json::from_value::<Ornament>(entry).ok())
        .collect())
}

pub fn parse_create_body(body: &str) -> Result<CreateReceipt, GatewayError> {
    let parsed: CreateBody =
        serde_json::from_str(body).map_err(|err| GatewayError::Malformed(err.to_string()))?;
    if let Some(message) = parsed.error.as_ref().and_then(error_text) {
        return Err(GatewayError::Rejected(message));
    }
    let user_count = parsed.user_count.and_then(|value| match value {
        serde_json::Value::Number(number) => number.as_u64().map(|count| count as u32),
        serde_json::Value::String(raw) => raw.trim().parse::<u32>().ok(),
        _ => None,
    });
    Ok(CreateReceipt { user_count })
}

/// Delete answers are relayed with status 200, so a rejection only shows up
/// as an `error` field. Empty or non-JSON bodies count as success.
pub fn parse_remove_body(body: &str) -> Result<(), GatewayError> {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) else {
        return Ok(());
    };
    match parsed.get("error").and_then(error_text) {
        Some(message) => Err(GatewayError::Rejected(message)),
        None => Ok(()),
    }
}

fn error_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null | serde_json::Value::Bool(false) => None,
        serde_json::Value::String(message) if message.is_empty() => None,
        serde_json::Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

pub fn list_path(cache_bust_ms: i64) -> String {
    format!("{ORNAMENTS_PATH}?{CACHE_BUST_PARAM}={cache_bust_ms}")
}

pub fn delete_path(fingerprint: &Fingerprint) -> String {
    let encoded: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(DELETE_ID_PARAM, fingerprint.as_str())
        .finish();
    format!("{ORNAMENTS_PATH}?{encoded}")
}

/// Joins a configured base (`https://host` or `https://host/prefix/`) with a path.
pub fn join_base(base: &str, path: &str) -> String {
    let base = base.trim().trim_end_matches('/');
    format!("{base}{path}")
}

/// Upstream URL with the incoming query string carried over.
pub fn upstream_url(base: &str, query: Option<&str>) -> String {
    let base = base.trim();
    let Some(query) = query.map(|query| query.trim_start_matches('?')).filter(|q| !q.is_empty())
    else {
        return base.to_string();
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}{query}")
}
