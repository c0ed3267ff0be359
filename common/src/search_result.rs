//! Shared search response models.
//!
//! Everything here is a transient view model: built once per response from
//! index documents and facet counts, serialized to the client, never stored.

use serde::{Deserialize, Serialize};

use crate::hierarchy::EntityDescriptor;
use crate::search_query::RequestParameters;

/// The full search response. Sections are present or absent according to the
/// request's response-type selector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SearchApiResponse {
    /// Canonical URL of exactly this query; doubles as the cache key.
    pub id: String,
    pub query: RequestParameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<PagingBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sorting: Option<SortBlock>,
    pub active_filters: Vec<ActiveFilter>,
    pub facets: Vec<StandardFacet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo_facet: Option<GeoFacet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chrono_facet: Option<ChronoFacet>,
    pub records: Vec<ResultRecord>,
    pub uuids: Vec<String>,
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResponseMetadata {
    pub total_found: u64,
    pub engine_ms: u64,
    /// How many requested filters failed to resolve and were dropped.
    /// Malformed input is silently permissive by design; this counter is the
    /// only trace of it.
    pub filters_unresolved: u64,
}

/// Paging state: numeric offset and opaque cursor are mutually exclusive by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PagingBlock {
    Offset {
        total_found: u64,
        start: u64,
        rows: u64,
        first: Option<String>,
        previous: Option<String>,
        next: Option<String>,
        last: Option<String>,
    },
    Cursor {
        total_found: u64,
        rows: u64,
        next_cursor: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SortBlock {
    pub active: Vec<SortOption>,
    pub available: Vec<SortOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SortOption {
    pub key: String,
    pub label: String,
    pub direction: String,
    pub url: String,
}

/// One currently-applied filter, with the link that removes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ActiveFilter {
    pub param: String,
    pub value: String,
    pub label: String,
    pub remove_url: String,
}

/// A standard (non-tile) facet: one field's value/count summary with
/// drill-down links.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StandardFacet {
    /// Index facet field this came from.
    pub field: String,
    /// Client parameter a drill-down on this facet modifies.
    pub param: String,
    pub label: String,
    pub options: Vec<FacetOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FacetOption {
    /// Value a drill-down appends to the client parameter.
    pub value: String,
    pub label: String,
    pub count: u64,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntityDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeoFacet {
    pub aggregation_depth: u32,
    pub features: Vec<GeoTileFeature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoTileFeature {
    pub tile: String,
    pub count: u64,
    pub url: String,
    pub geometry: TileGeometry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "PascalCase")]
pub enum TileGeometry {
    /// Closed ring of [lon, lat] corners.
    Polygon(Vec<[f64; 2]>),
    Point([f64; 2]),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChronoFacet {
    pub aggregation_depth: u32,
    pub options: Vec<ChronoTileOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChronoTileOption {
    pub tile: String,
    pub earliest: f64,
    pub latest: f64,
    pub count: u64,
    pub url: String,
}

/// One record of the result page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ResultRecord {
    pub uuid: String,
    pub uri: String,
    pub slug: String,
    pub label: String,
    pub item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<EntityDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_icon: Option<String>,
    /// Spatial containment chain, outermost first.
    pub context: Vec<String>,
    /// Project containment chain, outermost first.
    pub project: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geometry: Option<RecordGeometry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<f64>,
    pub snippet: Vec<HighlightTextSpan>,
    pub attributes: Vec<RecordAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordGeometry {
    Point { latitude: f64, longitude: f64 },
    /// Raw GeoJSON geometry fetched from the item repository for non-point
    /// features.
    GeoJson { geojson: String },
}

/// One predicate with its values, possibly nested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAttribute {
    pub predicate: EntityDescriptor,
    pub values: Vec<AttributeValue>,
}

/// An attribute value is either a leaf or an entity that is itself the
/// subject of deeper predicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttributeValue {
    Literal { value: String },
    Entity {
        entity: EntityDescriptor,
        attributes: Vec<RecordAttribute>,
    },
}

/// A highlighted or plain run of snippet text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct HighlightTextSpan {
    pub text: String,
    pub is_highlighted: bool,
    pub index: u64,
}
