//! Arbiter HTTP transport
//!
//! A bounded pool of reusable blocking HTTP handles. Remote drivers
//! acquire a [`Resource`] from the [`Pool`] (blocking until one is
//! free), issue GET/HEAD/PUT/POST through it with retry-with-backoff on
//! server errors, and get back an immutable [`Response`]. Everything in
//! this crate blocks the calling OS thread; there is no event loop.

pub mod config;
pub mod handle;
pub mod pool;
pub mod response;

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

pub use config::TransportConfig;
pub use handle::Handle;
pub use pool::{Pool, Resource};
pub use response::Response;

/// HTTP header fields. Sorted iteration keeps canonicalizers simple.
pub type Headers = BTreeMap<String, String>;

/// HTTP query parameters.
pub type Query = BTreeMap<String, String>;

/// Percent-encodes everything except unreserved characters.
const STRICT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// [`STRICT`] with `/` passed through, for URI paths.
const PATH: &AsciiSet = &STRICT.remove(b'/');

/// Percent-encodes a URI path, preserving `/` separators.
pub fn sanitize(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Percent-encodes a single path or query component, `/` included.
pub fn sanitize_component(component: &str) -> String {
    utf8_percent_encode(component, STRICT).to_string()
}

/// Builds a query string from key/value pairs: empty for an empty map,
/// otherwise `?k=v&...`. Values are appended verbatim; callers that need
/// encoding apply it beforehand.
pub fn build_query_string(query: &Query) -> String {
    let mut out = String::new();
    for (key, val) in query {
        out.push(if out.is_empty() { '?' } else { '&' });
        out.push_str(key);
        out.push('=');
        out.push_str(val);
    }
    out
}

/// Case-insensitive header lookup.
pub fn find_header<'a>(headers: &'a Headers, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, val)| val.as_str())
}
