//! Shared constants and tunables for the search engine.

/// Results per page when the client does not ask for a row count.
pub const DEFAULT_ROWS: u64 = 20;
/// Hard ceiling on rows per query, whatever the client asks for.
pub const MAX_ROWS: u64 = 1000;
/// Hard ceiling on options returned per facet field.
pub const MAX_FACET_OPTIONS: usize = 200;
/// Per-field option limit sent to the index engine.
pub const FACET_FIELD_LIMIT: i64 = -1;

/// Delimiter between levels of a property/category hierarchy path.
pub const HIERARCHY_DELIM: &str = "---";
/// Delimiter between levels of a spatial context path.
pub const CONTEXT_DELIM: &str = "/";
/// Delimiter between OR-alternatives inside one hierarchy level.
pub const OR_DELIM: &str = "||";

/// Field-name suffix separator used by the index schema.
pub const FIELD_SEP: &str = "___";

/// Geospatial tile depth bounds and grouping target.
pub const GEO_MIN_TILE_DEPTH: u32 = 4;
pub const GEO_MAX_TILE_DEPTH: u32 = 18;
pub const GEO_TARGET_GROUPS: usize = 128;

/// Chronology tile depth bounds and grouping target.
pub const CHRONO_MIN_TILE_DEPTH: u32 = 4;
pub const CHRONO_MAX_TILE_DEPTH: u32 = 16;
pub const CHRONO_TARGET_GROUPS: usize = 64;

/// Root span of the chronology tile tree, in signed calendar years
/// (BCE negative, CE positive). Both the earliest and latest axes cover it.
pub const CHRONO_ROOT_EARLIEST: f64 = -10_000_000.0;
pub const CHRONO_ROOT_LATEST: f64 = 2_000.0;

/// Year-range width beyond which chronology aggregation depth is dampened.
pub const CHRONO_DAMPEN_THRESHOLD: f64 = 2_500.0;

/// Default and minimum bucket counts for range-faceted numeric fields.
pub const RANGE_BUCKET_TARGET: u64 = 20;
pub const RANGE_BUCKET_MIN: u64 = 4;
/// Record count below which the bucket target drops to the minimum.
pub const RANGE_SMALL_RESULT: u64 = 20;
/// Smallest permitted bucket width for zero-width stats.
pub const RANGE_MIN_WIDTH: f64 = 0.001;

/// Recursion guard for nested attribute trees in index documents.
pub const MAX_ATTRIBUTE_DEPTH: usize = 10;

/// Recognized request parameter names.
pub mod params {
    pub const FULLTEXT: &str = "q";
    pub const ITEM_TYPE: &str = "type";
    pub const CONTEXT_PATH: &str = "path";
    pub const CATEGORY: &str = "cat";
    pub const PROPERTY: &str = "prop";
    pub const VOCABULARY: &str = "vocab";
    pub const PROJECT: &str = "proj";
    pub const KEYWORD: &str = "keyword";
    pub const IDENTIFIER: &str = "id";
    pub const OBJECT: &str = "obj";
    pub const PERSON: &str = "person";
    pub const IMAGES: &str = "images";
    pub const OTHER_MEDIA: &str = "other-media";
    pub const DOCUMENTS: &str = "documents";
    pub const BBOX: &str = "bbox";
    pub const GEOTILE: &str = "geotile";
    pub const CHRONOTILE: &str = "chronotile";
    pub const START_DATE: &str = "start-date";
    pub const STOP_DATE: &str = "stop-date";
    pub const SORT: &str = "sort";
    pub const START: &str = "start";
    pub const ROWS: &str = "rows";
    pub const CURSOR: &str = "cursor";
    pub const RESPONSE: &str = "response";
    pub const ATTRIBUTES: &str = "attributes";
    pub const FLATTEN_ATTRIBUTES: &str = "flatten-attributes";
    pub const NESTED_ATTRIBUTES: &str = "nested-attributes";
    pub const GEO_DEEP: &str = "geodeep";
    pub const CHRONO_DEEP: &str = "chronodeep";
    pub const TILE_SHAPE: &str = "tile-shape";
}
