//! Canonical URL serialization for search requests.
//!
//! Every facet option and paging link is produced here, so the ordering has
//! to be deterministic: the same parameter map always serializes to the same
//! string. That string doubles as the response id and the cache key.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};

use crate::search_const::params;
use crate::search_query::RequestParameters;

pub const SEARCH_BASE: &str = "/search";

/// Everything but unreserved characters gets encoded; spaces become %20.
const QUERY_ENCODE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Parameters that never survive into a drill-down link. Changing the
/// filter set restarts paging, and a cursor is only valid for the exact
/// query that produced it.
const PAGING_PARAMS: &[&str] = &[params::START, params::CURSOR];

fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY_ENCODE).to_string()
}

/// Serialize a parameter map into its canonical URL: keys sorted, values in
/// arrival order per key. Re-serializing an already-canonical map yields the
/// same string.
pub fn canonical_url(params: &RequestParameters) -> String {
    let mut parts = Vec::new();
    for (key, values) in params.params.iter() {
        for value in values {
            if value.is_empty() {
                continue;
            }
            parts.push(format!("{}={}", encode(key), encode(value)));
        }
    }
    if parts.is_empty() {
        return SEARCH_BASE.to_string();
    }
    format!("{}?{}", SEARCH_BASE, parts.join("&"))
}

/// Parse a raw query string back into a parameter map, preserving repeated
/// keys. Undecodable sequences are kept as-is rather than dropped.
pub fn parse_query_string(query: &str) -> RequestParameters {
    let mut pairs = Vec::new();
    for piece in query.trim_start_matches('?').split('&') {
        if piece.is_empty() {
            continue;
        }
        let (key, value) = piece.split_once('=').unwrap_or((piece, ""));
        let key = percent_decode_str(key).decode_utf8_lossy().to_string();
        let value = value.replace('+', " ");
        let value = percent_decode_str(&value).decode_utf8_lossy().to_string();
        if key.is_empty() {
            continue;
        }
        pairs.push((key, value));
    }
    RequestParameters::from_pairs(pairs)
}

fn strip_paging(params: &RequestParameters) -> RequestParameters {
    let mut stripped = params.clone();
    for key in PAGING_PARAMS {
        stripped.remove(key);
    }
    stripped
}

/// Drill-down link: append one more value to a repeatable key.
pub fn url_with(params: &RequestParameters, key: &str, value: &str) -> String {
    let mut next = strip_paging(params);
    next.append(key, value);
    canonical_url(&next)
}

/// Drill-down link: replace the value of a single-valued key.
pub fn url_replacing(params: &RequestParameters, key: &str, value: &str) -> String {
    let mut next = strip_paging(params);
    next.set(key, value);
    canonical_url(&next)
}

/// Remove-filter link: drop a key entirely.
pub fn url_without(params: &RequestParameters, key: &str) -> String {
    let mut next = strip_paging(params);
    next.remove(key);
    canonical_url(&next)
}

/// Remove-filter link: drop one value of a repeatable key.
pub fn url_without_value(params: &RequestParameters, key: &str, value: &str) -> String {
    let mut next = strip_paging(params);
    next.remove_value(key, value);
    canonical_url(&next)
}

/// Paging link at a given numeric offset.
pub fn url_at_start(params: &RequestParameters, start: u64) -> String {
    let mut next = params.clone();
    next.remove(params::CURSOR);
    if start == 0 {
        next.remove(params::START);
    } else {
        next.set(params::START, start.to_string());
    }
    canonical_url(&next)
}
