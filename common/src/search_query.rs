//! Shared search request models and helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::search_const::{self, params};

/// A client request as a multi-valued parameter map.
///
/// Values are kept in arrival order per key and are never deduplicated:
/// duplicate OR-branches inside hierarchy paths are meaningful and must
/// survive until hierarchy parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RequestParameters {
    pub params: BTreeMap<String, Vec<String>>,
}

impl RequestParameters {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in pairs {
            params.entry(key).or_default().push(value);
        }
        RequestParameters { params }
    }

    pub fn first(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.first()).map(|s| s.as_str())
    }

    pub fn all(&self, key: &str) -> &[String] {
        self.params.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.get(key).map(|v| !v.is_empty()).unwrap_or(false)
    }

    /// Numeric accessor; unparseable input falls back silently.
    pub fn first_u64(&self, key: &str) -> Option<u64> {
        self.first(key).and_then(|s| s.trim().parse::<u64>().ok())
    }

    pub fn first_f64(&self, key: &str) -> Option<f64> {
        self.first(key).and_then(|s| s.trim().parse::<f64>().ok())
    }

    pub fn first_u32(&self, key: &str) -> Option<u32> {
        self.first(key).and_then(|s| s.trim().parse::<u32>().ok())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.params.insert(key.to_string(), vec![value.into()]);
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.params.entry(key.to_string()).or_default().push(value.into());
    }

    pub fn remove(&mut self, key: &str) {
        self.params.remove(key);
    }

    /// Remove one value of a repeatable key, dropping the key when empty.
    pub fn remove_value(&mut self, key: &str, value: &str) {
        if let Some(values) = self.params.get_mut(key) {
            values.retain(|v| v != value);
            if values.is_empty() {
                self.params.remove(key);
            }
        }
    }

    /// Requested row count, clamped to the engine maximum.
    pub fn rows(&self) -> u64 {
        self.first_u64(params::ROWS)
            .unwrap_or(search_const::DEFAULT_ROWS)
            .min(search_const::MAX_ROWS)
    }

    pub fn response_types(&self) -> ResponseTypes {
        match self.first(params::RESPONSE) {
            Some(spec) => ResponseTypes::parse(spec),
            None => ResponseTypes::default(),
        }
    }

    /// True when any filter implying a cross-project result set is present.
    pub fn implies_multiple_projects(&self) -> bool {
        self.has(params::CONTEXT_PATH)
            || self.has(params::CATEGORY)
            || self.has(params::PROPERTY)
            || self.has(params::PROJECT)
    }
}

/// Which sections of the response the client wants computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseTypes {
    pub metadata: bool,
    pub records: bool,
    pub facets: bool,
    pub geo_facets: bool,
    pub chrono_facets: bool,
    pub uuids: bool,
    pub uris: bool,
    /// Pass engine failures through raw instead of degrading to an empty
    /// best-effort result.
    pub raw: bool,
}

impl Default for ResponseTypes {
    fn default() -> Self {
        ResponseTypes {
            metadata: true,
            records: true,
            facets: true,
            geo_facets: true,
            chrono_facets: true,
            uuids: false,
            uris: false,
            raw: false,
        }
    }
}

impl ResponseTypes {
    const NONE: ResponseTypes = ResponseTypes {
        metadata: false,
        records: false,
        facets: false,
        geo_facets: false,
        chrono_facets: false,
        uuids: false,
        uris: false,
        raw: false,
    };

    /// Parse a comma-separated selector; unknown tokens are dropped. A
    /// selector with no recognized token falls back to the default set.
    pub fn parse(spec: &str) -> Self {
        let mut types = ResponseTypes::NONE;
        for token in spec.split(',') {
            match token.trim() {
                "metadata" => types.metadata = true,
                "records" => types.records = true,
                "facet" => types.facets = true,
                "geo-facet" => types.geo_facets = true,
                "chrono-facet" => types.chrono_facets = true,
                "uuid" => types.uuids = true,
                "uri" => types.uris = true,
                "raw" => types.raw = true,
                _ => {}
            }
        }
        if types == ResponseTypes::NONE {
            return ResponseTypes::default();
        }
        types
    }

    /// True when some facet section is wanted; when false, facet
    /// computation is stripped from the engine query entirely.
    pub fn wants_any_facets(&self) -> bool {
        self.facets || self.geo_facets || self.chrono_facets
    }

    /// Bare uuid/uri listings skip record assembly.
    pub fn bare_listing(&self) -> bool {
        (self.uuids || self.uris) && !self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_values_survive() {
        let params = RequestParameters::from_pairs(vec![
            ("prop".to_string(), "a||a".to_string()),
            ("prop".to_string(), "a||a".to_string()),
        ]);
        assert_eq!(params.all("prop"), &["a||a".to_string(), "a||a".to_string()]);
    }

    #[test]
    fn rows_clamped_to_engine_maximum() {
        let params =
            RequestParameters::from_pairs(vec![("rows".to_string(), "20000".to_string())]);
        assert_eq!(params.rows(), search_const::MAX_ROWS);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let params =
            RequestParameters::from_pairs(vec![("start".to_string(), "abc".to_string())]);
        assert_eq!(params.first_u64("start"), None);
        assert_eq!(params.rows(), search_const::DEFAULT_ROWS);
    }

    #[test]
    fn response_type_tokens() {
        let types = ResponseTypes::parse("uuid,bogus");
        assert!(types.uuids);
        assert!(!types.records);
        assert!(!types.wants_any_facets());
        assert!(types.bare_listing());
    }

    #[test]
    fn unknown_only_selector_falls_back_to_default() {
        let types = ResponseTypes::parse("bogus,nothing");
        assert_eq!(types, ResponseTypes::default());
    }
}
