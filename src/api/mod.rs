//! HTTP side of the feed: request construction, response decoding, and
//! the transport seam.
//!
//! The crate never performs I/O itself. A [`HttpTransport`] implementation
//! supplied by the embedding application executes GET requests; everything
//! else (paths, query strings, auth headers, decoding) lives here.
//!
//! Endpoints, relative to the configured base URL:
//! - `-/api/events?min_ts=&max_ts=&any_tag=*` for history and searches
//! - `-/api/data?runid=` for per-run detail records
//! - `-/api/tags` for the known-tag universe
//! - `-/sitelocal.json` for server-side client settings

mod request;
mod response;
mod transport;

pub use request::{ApiRequest, EventQuery};
pub use response::{
    decode_details, decode_history, decode_tags, flatten_history, prettify_payload,
    HistoryResponse, HistoryRun, SiteConfig,
};
pub use transport::{ApiClient, HttpResponse, HttpTransport};
