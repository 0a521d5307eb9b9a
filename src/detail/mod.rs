//! Lazily fetched per-run details.

mod cache;
mod credentials;

pub use cache::{DetailCache, DEFAULT_DETAIL_CACHE_SIZE};
pub use credentials::{basic_credential, CredentialCache, CredentialSource};
