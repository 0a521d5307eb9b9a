//! The HTTP seam and a thin typed client over it.

use super::request::ApiRequest;
use super::response::{decode_details, decode_history, decode_tags, SiteConfig};
use crate::error::{FeedError, Result};
use crate::types::{Notification, RunDetails};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Raw HTTP response as seen by the feed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body of a 2xx response, otherwise the status as an error.
    pub fn into_body(self) -> Result<Vec<u8>> {
        if self.is_success() {
            Ok(self.body)
        } else {
            Err(FeedError::from_status(self.status))
        }
    }
}

/// Executes GET requests. Implementations may block; the runtime only
/// calls them from worker threads.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &Url, headers: &[(String, String)]) -> Result<HttpResponse>;
}

/// Base URL plus transport.
#[derive(Clone)]
pub struct ApiClient {
    base: Url,
    transport: Arc<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(base: Url, transport: Arc<dyn HttpTransport>) -> Self {
        Self { base, transport }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Perform a request and return the body of a successful response.
    pub fn fetch(&self, request: &ApiRequest) -> Result<Vec<u8>> {
        let url = request.url(&self.base)?;
        tracing::debug!(%url, "GET");
        self.transport.get(&url, request.headers())?.into_body()
    }

    pub fn history(&self, request: &ApiRequest) -> Result<Vec<Notification>> {
        decode_history(&self.fetch(request)?)
    }

    pub fn details(&self, run_id: &str, request: &ApiRequest) -> Result<RunDetails> {
        decode_details(run_id, &self.fetch(request)?)
    }

    pub fn tags(&self) -> Result<Vec<String>> {
        decode_tags(&self.fetch(&ApiRequest::tags())?)
    }

    pub fn site_config(&self) -> Result<SiteConfig> {
        Ok(serde_json::from_slice(&self.fetch(&ApiRequest::site_config())?)?)
    }
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base.as_str()).finish()
    }
}
