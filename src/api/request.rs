//! Request construction for the feed endpoints.

use crate::error::Result;
use crate::types::Timestamp;
use std::time::Duration;
use url::form_urlencoded;
use url::Url;

const EVENTS_PATH: &str = "-/api/events";
const DATA_PATH: &str = "-/api/data";
const TAGS_PATH: &str = "-/api/tags";
const SITE_CONFIG_PATH: &str = "-/sitelocal.json";

/// A GET request relative to the feed's base URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl ApiRequest {
    fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Event listing for a time window and tag set.
    pub fn events(query: &EventQuery) -> Self {
        let mut req = Self::new(EVENTS_PATH);
        if let Some(min) = query.min_ts {
            req.query.push(("min_ts".into(), min.to_string()));
        }
        if let Some(max) = query.max_ts {
            req.query.push(("max_ts".into(), max.to_string()));
        }
        for tag in &query.any_tag {
            req.query.push(("any_tag".into(), tag.clone()));
        }
        req
    }

    /// Detail records of one run.
    pub fn run_data(run_id: &str) -> Self {
        let mut req = Self::new(DATA_PATH);
        req.query.push(("runid".into(), run_id.to_string()));
        req
    }

    pub fn tags() -> Self {
        Self::new(TAGS_PATH)
    }

    pub fn site_config() -> Self {
        Self::new(SITE_CONFIG_PATH)
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn encoded_query(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.query)
            .finish()
    }

    /// Target resource (path plus query), headers excluded.
    pub fn cache_key(&self) -> String {
        if self.query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.encoded_query())
        }
    }

    /// Absolute URL against `base`. A base without a trailing slash is
    /// treated as a directory so the subpath is kept.
    pub fn url(&self, base: &Url) -> Result<Url> {
        let mut dir = base.clone();
        if !dir.path().ends_with('/') {
            let path = format!("{}/", dir.path());
            dir.set_path(&path);
        }
        let mut url = dir.join(&self.path)?;
        if !self.query.is_empty() {
            url.set_query(Some(&self.encoded_query()));
        }
        Ok(url)
    }
}

/// Window and tag filter for an event listing.
///
/// Missing bounds are filled in by [`EventQuery::resolve`]; a bound left
/// unset at request time is omitted and the server applies its own default.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventQuery {
    pub min_ts: Option<Timestamp>,
    pub max_ts: Option<Timestamp>,
    pub any_tag: Vec<String>,
}

impl EventQuery {
    /// `[now - backrange, now]`, no tag filter.
    pub fn recent(now: Timestamp, backrange: Duration) -> Self {
        Self {
            min_ts: Some(now.saturating_back(backrange)),
            max_ts: Some(now),
            any_tag: Vec::new(),
        }
    }

    #[must_use]
    pub fn between(mut self, min_ts: Option<Timestamp>, max_ts: Option<Timestamp>) -> Self {
        self.min_ts = min_ts;
        self.max_ts = max_ts;
        self
    }

    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.any_tag = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Fill unset bounds from `now`/`backrange` and an empty tag list from
    /// the active filter.
    pub fn resolve<'a>(
        mut self,
        now: Timestamp,
        backrange: Duration,
        active_filter: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        self.min_ts.get_or_insert(now.saturating_back(backrange));
        self.max_ts.get_or_insert(now);
        if self.any_tag.is_empty() {
            self.any_tag = active_filter.into_iter().cloned().collect();
        }
        self
    }
}
