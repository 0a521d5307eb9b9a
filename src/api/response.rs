//! Response decoding for the feed endpoints.

use crate::error::Result;
use crate::types::{DetailRecord, Notification, RunDetails, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use std::collections::{BTreeMap, BTreeSet};

/// One run of an event, as listed by `-/api/events`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryRun {
    #[serde(rename = "runid", alias = "run_id")]
    pub run_id: String,
    pub ts: Timestamp,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

/// Event id to the runs recorded for it.
pub type HistoryResponse = BTreeMap<String, Vec<HistoryRun>>;

/// Flatten grouped runs into notifications sorted by timestamp ascending.
///
/// The sort is stable: runs sharing a timestamp keep id order, then the
/// order the server listed them in.
pub fn flatten_history(response: HistoryResponse) -> Vec<Notification> {
    let mut flat: Vec<Notification> = response
        .into_iter()
        .flat_map(|(id, runs)| {
            runs.into_iter().map(move |run| Notification {
                id: id.clone(),
                run_id: run.run_id,
                timestamp: run.ts,
                tags: run.tags,
            })
        })
        .collect();
    flat.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    flat
}

/// Decode an `-/api/events` body into time-ordered notifications.
pub fn decode_history(body: &[u8]) -> Result<Vec<Notification>> {
    let response: HistoryResponse = serde_json::from_slice(body)?;
    Ok(flatten_history(response))
}

/// Decode the `-/api/tags` list.
pub fn decode_tags(body: &[u8]) -> Result<Vec<String>> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Deserialize)]
struct WireDetails {
    #[serde(default, rename = "runid", alias = "run_id")]
    run_id: Option<String>,
    #[serde(default)]
    ts: Option<Timestamp>,
    #[serde(default)]
    tags: BTreeSet<String>,
    data: Vec<WireRecord>,
}

#[derive(Deserialize)]
struct WireRecord {
    key: String,
    ts: Timestamp,
    data: String,
}

/// Decode `-/api/data`. Record payloads go through [`prettify_payload`].
pub fn decode_details(run_id: &str, body: &[u8]) -> Result<RunDetails> {
    let wire: WireDetails = serde_json::from_slice(body)?;
    Ok(RunDetails {
        run_id: wire.run_id.unwrap_or_else(|| run_id.to_string()),
        timestamp: wire.ts,
        tags: wire.tags,
        records: wire
            .data
            .into_iter()
            .map(|r| DetailRecord {
                key: r.key,
                timestamp: r.ts,
                payload: prettify_payload(&r.data),
            })
            .collect(),
    })
}

/// Re-indent a JSON payload with four spaces, keeping the sender's key
/// order; anything that does not parse is returned unchanged.
pub fn prettify_payload(raw: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
        return raw.to_string();
    };
    let mut out = Vec::with_capacity(raw.len() * 2);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(b"    "));
    if value.serialize(&mut ser).is_err() {
        return raw.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| raw.to_string())
}

/// Client settings published by the server at `-/sitelocal.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub subpath: String,
    /// The detail endpoint wants a Basic credential.
    #[serde(rename = "basic_auth_passwd")]
    pub auth_required: bool,
    /// Seconds of history loaded at startup.
    pub query_default_backrange: f64,
    pub notif_limit: usize,
    pub app_name: String,
    pub favicon_path: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            subpath: String::new(),
            auth_required: false,
            query_default_backrange: 60.0 * 60.0 * 24.0,
            notif_limit: 500,
            app_name: "app".to_string(),
            favicon_path: None,
        }
    }
}
