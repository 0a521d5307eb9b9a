//! Memoized per-run detail fetches.

use super::credentials::{CredentialCache, CredentialSource};
use crate::api::{ApiClient, ApiRequest};
use crate::error::Result;
use crate::types::RunDetails;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default number of runs whose details are kept.
pub const DEFAULT_DETAIL_CACHE_SIZE: usize = 256;

/// Fetches run details at most once per request key and remembers them.
///
/// Only completed fetches are memoized: two concurrent misses for the same
/// run both go to the server. Failures are never cached. Owned by the
/// runtime that created it, so separate runtimes never share entries.
pub struct DetailCache {
    api: ApiClient,
    credentials: Option<CredentialCache>,
    entries: Mutex<LruCache<String, Arc<RunDetails>>>,
}

impl DetailCache {
    /// Cache for a server that does not protect the detail endpoint.
    pub fn new(api: ApiClient, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            api,
            credentials: None,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache that sends a Basic credential obtained from `source`.
    pub fn with_credentials(api: ApiClient, capacity: usize, source: Arc<dyn CredentialSource>) -> Self {
        Self {
            credentials: Some(CredentialCache::new(source)),
            ..Self::new(api, capacity)
        }
    }

    /// Credential state, when the endpoint is protected.
    pub fn credentials(&self) -> Option<&CredentialCache> {
        self.credentials.as_ref()
    }

    /// Cached details of `run_id`, or fetch, store and return them.
    ///
    /// If a fetch made with the cached credential fails, that credential is
    /// dropped (unless a newer one replaced it meanwhile) so the next call
    /// derives a fresh one, and the error is returned as is.
    pub fn fetch(&self, run_id: &str) -> Result<Arc<RunDetails>> {
        let request = ApiRequest::run_data(run_id);
        let key = request.cache_key();

        if let Some(hit) = self.entries.lock().get(&key).cloned() {
            tracing::debug!(run_id, "detail cache hit");
            return Ok(hit);
        }

        let (request, used) = match &self.credentials {
            Some(credentials) => {
                let header = credentials.authorization()?;
                (request.with_header("Authorization", header.clone()), Some(header))
            }
            None => (request, None),
        };

        match self.api.details(run_id, &request) {
            Ok(details) => {
                let details = Arc::new(details);
                self.entries.lock().put(key, Arc::clone(&details));
                tracing::debug!(run_id, records = details.records.len(), "details fetched");
                Ok(details)
            }
            Err(e) => {
                if let (Some(credentials), Some(used)) = (&self.credentials, used) {
                    if credentials.invalidate_if(&used) {
                        tracing::warn!(run_id, error = %e, "detail fetch failed, credential cleared");
                    }
                }
                Err(e)
            }
        }
    }

    /// Details already fetched for `run_id`, without any I/O.
    pub fn cached(&self, run_id: &str) -> Option<Arc<RunDetails>> {
        let key = ApiRequest::run_data(run_id).cache_key();
        self.entries.lock().peek(&key).cloned()
    }

    /// Number of runs whose details are held.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is memoized.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Forget every memoized result. Credentials are kept.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
