//! Index engine client and raw wire types.
//!
//! The engine speaks the Solr select protocol: a URL-encoded parameter list
//! in, a JSON envelope out. Facet counts come back as flat
//! value/count/value/count arrays and are paired up here; everything else is
//! deserialized as close to the wire as practical and shaped later.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawSolrResponse {
    #[serde(rename = "responseHeader")]
    pub header: RawResponseHeader,
    pub response: RawDocList,
    pub facet_counts: Option<RawFacetCounts>,
    pub stats: Option<RawStats>,
    #[serde(rename = "nextCursorMark")]
    pub next_cursor_mark: Option<String>,
    pub highlighting: Option<BTreeMap<String, BTreeMap<String, Vec<String>>>>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawResponseHeader {
    pub status: i64,
    #[serde(rename = "QTime")]
    pub qtime: u64,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawDocList {
    #[serde(rename = "numFound")]
    pub num_found: u64,
    pub start: u64,
    pub docs: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawFacetCounts {
    pub facet_queries: BTreeMap<String, u64>,
    /// Flat [value, count, value, count, ...] arrays, as Solr sends them.
    pub facet_fields: BTreeMap<String, Vec<serde_json::Value>>,
    pub facet_ranges: BTreeMap<String, RawRangeFacet>,
}

#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RawRangeFacet {
    pub counts: Vec<serde_json::Value>,
    pub gap: serde_json::Value,
    pub start: serde_json::Value,
    pub end: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RawStats {
    pub stats_fields: BTreeMap<String, RawStatsEntry>,
}

/// min/max/mean are numbers for numeric fields and ISO strings for date
/// fields; kept raw and interpreted by the prequery.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RawStatsEntry {
    pub min: serde_json::Value,
    pub max: serde_json::Value,
    pub mean: serde_json::Value,
    pub count: u64,
}

/// Pair up a flat facet array into (value, count) tuples. Malformed pairs
/// are dropped rather than failing the response.
pub fn facet_value_counts(flat: &[serde_json::Value]) -> Vec<(String, u64)> {
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    for chunk in flat.chunks(2) {
        let [value, count] = chunk else {
            continue;
        };
        let Some(value) = value.as_str() else {
            continue;
        };
        let Some(count) = count.as_u64() else {
            continue;
        };
        pairs.push((value.to_string(), count));
    }
    pairs
}

/// One round trip to the index engine.
pub async fn solr_select(params: &[(String, String)]) -> anyhow::Result<RawSolrResponse> {
    let t0 = std::time::Instant::now();
    let engine_url =
        std::env::var("SOLR_URL").unwrap_or("http://127.0.0.1:8983/solr/records".to_string());
    let engine_url = format!("{}/select", engine_url);
    let client = reqwest::Client::new();

    let response = client.post(engine_url).form(params).send().await?;
    let status = response.status();
    let response_txt = response.text().await?;
    if status.is_client_error() || status.is_server_error() {
        anyhow::bail!("Error: {}: {}", status, response_txt);
    }
    let dt_ms = t0.elapsed().as_millis() as u64;
    info!("engine response: len = {}, {}ms", response_txt.len(), dt_ms);

    let response: RawSolrResponse = serde_json::from_str(&response_txt)?;
    if response.header.status != 0 {
        anyhow::bail!("Engine reported status {}", response.header.status);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_facet_arrays_pair_up() {
        let flat = vec![
            serde_json::json!("turkey___x___id___Turkey"),
            serde_json::json!(120),
            serde_json::json!("italy___y___id___Italy"),
            serde_json::json!(44),
        ];
        assert_eq!(
            facet_value_counts(&flat),
            vec![
                ("turkey___x___id___Turkey".to_string(), 120),
                ("italy___y___id___Italy".to_string(), 44),
            ]
        );
    }

    #[test]
    fn malformed_pairs_dropped() {
        let flat = vec![serde_json::json!("only-a-value")];
        assert!(facet_value_counts(&flat).is_empty());
        let flat = vec![serde_json::json!(3), serde_json::json!(4)];
        assert!(facet_value_counts(&flat).is_empty());
    }

    #[test]
    fn response_envelope_parses() {
        let raw = r#"{
            "responseHeader": {"status": 0, "QTime": 7},
            "response": {"numFound": 2, "start": 0, "docs": [{"uuid": "a"}, {"uuid": "b"}]},
            "facet_counts": {
                "facet_queries": {"image_media_count:[1 TO *]": 1},
                "facet_fields": {"item_type": ["subjects", 2]},
                "facet_ranges": {}
            },
            "nextCursorMark": "AoE=",
            "highlighting": {"a": {"text": ["a <em>match</em>"]}}
        }"#;
        let parsed: RawSolrResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.response.num_found, 2);
        assert_eq!(parsed.header.qtime, 7);
        let facets = parsed.facet_counts.unwrap();
        assert_eq!(facets.facet_fields["item_type"].len(), 2);
        assert_eq!(parsed.next_cursor_mark.as_deref(), Some("AoE="));
    }
}
