//! Basic-auth credential derivation and caching.

use crate::error::Result;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use parking_lot::Mutex;
use std::sync::Arc;

/// Asks the operator for the detail endpoint's password.
pub trait CredentialSource: Send + Sync {
    fn password(&self) -> Result<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Result<String> + Send + Sync,
{
    fn password(&self) -> Result<String> {
        self()
    }
}

/// `base64(":" + password)`: the server only checks the password half.
pub fn basic_credential(password: &str) -> String {
    BASE64_STANDARD.encode(format!(":{password}"))
}

/// Derives the credential once and reuses it until told it went bad.
///
/// Prompts are serialized on their own lock, so readers of the cached
/// value never wait on the operator.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    /// Full `Authorization` header value.
    cached: Mutex<Option<String>>,
    prompt: Mutex<()>,
}

impl CredentialCache {
    /// Nothing cached; the first [`authorization`](Self::authorization) prompts.
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            prompt: Mutex::new(()),
        }
    }

    /// `Authorization` header value, prompting only when nothing is cached.
    ///
    /// The returned value identifies the credential a request was made
    /// with; hand it back to [`invalidate_if`](Self::invalidate_if) when
    /// that request fails.
    pub fn authorization(&self) -> Result<String> {
        if let Some(header) = self.cached.lock().clone() {
            return Ok(header);
        }
        let _prompting = self.prompt.lock();
        // Another caller may have prompted while we waited.
        if let Some(header) = self.cached.lock().clone() {
            return Ok(header);
        }
        let header = format!("Basic {}", basic_credential(&self.source.password()?));
        *self.cached.lock() = Some(header.clone());
        Ok(header)
    }

    /// Drop the cached credential. Returns whether one was cached.
    pub fn invalidate(&self) -> bool {
        self.cached.lock().take().is_some()
    }

    /// Drop the cached credential only if it is still `used`. A failure
    /// of a request made with an older credential leaves a newer one alone.
    pub fn invalidate_if(&self, used: &str) -> bool {
        let mut cached = self.cached.lock();
        if cached.as_deref() == Some(used) {
            *cached = None;
            true
        } else {
            false
        }
    }

    /// Whether a credential is cached right now.
    pub fn is_cached(&self) -> bool {
        self.cached.lock().is_some()
    }
}
