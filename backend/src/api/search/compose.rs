//! Query composition: translate a client request into an index query.
//!
//! This is the one place where client parameters become engine syntax.
//! Every hierarchical filter records which facet field it implies and which
//! raw client value produced it, so the aggregation side can build correct
//! drill-down links without re-deriving anything.

use common::hierarchy::{self, ROOT_PARENT};
use common::search_const::{
    self, CONTEXT_DELIM, FIELD_SEP, HIERARCHY_DELIM, OR_DELIM, params,
};
use common::search_query::RequestParameters;

use crate::api::search::sort::parse_sort_spec;
use crate::db_utils::snippets::{HIGHLIGHT_POST, HIGHLIGHT_PRE};

/// Index schema field names.
pub mod schema {
    pub const UUID: &str = "uuid";
    pub const SLUG: &str = "slug";
    pub const LABEL: &str = "label";
    pub const URI: &str = "uri";
    pub const TEXT: &str = "text";
    pub const ITEM_TYPE: &str = "item_type";
    pub const ITEM_CLASS: &str = "item_class";
    pub const PERSISTENT_ID: &str = "persistent_id";
    pub const OBJECT_UUID: &str = "object_uuid";
    pub const PERSON_UUID: &str = "person_uuid";
    pub const KEYWORDS: &str = "keywords";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
    pub const GEO_TILE: &str = "geo_tile";
    pub const GEO_TILE_LOW: &str = "geo_tile_low";
    pub const CHRONO_TILE: &str = "chrono_tile";
    pub const CHRONO_TILE_LOW: &str = "chrono_tile_low";
    pub const EARLIEST: &str = "earliest";
    pub const LATEST: &str = "latest";
    pub const CONTEXT_PATH: &str = "context_path";
    pub const PROJECT_PATH: &str = "project_path";
    pub const GEOMETRY_SOURCE: &str = "geometry_source";
    pub const GEOMETRY_TYPE: &str = "geometry_type";
    pub const IMAGE_MEDIA_COUNT: &str = "image_media_count";
    pub const OTHER_MEDIA_COUNT: &str = "other_media_count";
    pub const DOC_MEDIA_COUNT: &str = "doc_media_count";

    pub const SUFFIX_CONTEXT: &str = "context";
    pub const SUFFIX_CATEGORY: &str = "cat";
    pub const SUFFIX_PREDICATE: &str = "pred";
    pub const SUFFIX_VOCAB: &str = "vocab";
    pub const SUFFIX_PROJECT: &str = "project";
}

pub const ITEM_TYPES: &[&str] = &[
    "subjects",
    "media",
    "documents",
    "persons",
    "projects",
    "predicates",
    "types",
    "tables",
];

/// Categories that expose otherwise-buried property fields as top-level
/// facets. Product configuration, keyed by category leaf slug.
const CATEGORY_EXTRA_FACETS: &[(&str, &[&str])] = &[
    ("cat-coin", &["has-ruler", "has-mint"]),
    ("cat-animal-bone", &["has-taxon", "has-anatomical-id"]),
    ("cat-pottery", &["has-ware-type"]),
    ("cat-human-bone", &["has-biological-sex"]),
];

/// Paging state. Cursor and numeric offset are mutually exclusive by
/// construction; the engine forbids mixing them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Paging {
    Offset { start: u64, rows: u64 },
    Cursor { token: String, rows: u64 },
}

impl Paging {
    pub fn rows(&self) -> u64 {
        match self {
            Paging::Offset { rows, .. } => *rows,
            Paging::Cursor { rows, .. } => *rows,
        }
    }
}

/// Reverse association from one facet field back to the client parameter
/// and the literal raw value that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetFieldKey {
    pub field: String,
    pub param: String,
    pub raw_value: String,
    pub delim: String,
}

/// A derived range-facet request, filled in by the stats prequery.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFacetSpec {
    pub field: String,
    pub start: String,
    pub end: String,
    pub gap: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComposedQuery {
    pub fulltext: Option<String>,
    pub filters: Vec<String>,
    pub facet_fields: Vec<String>,
    pub facet_queries: Vec<String>,
    pub stats_fields: Vec<String>,
    pub range_facets: Vec<RangeFacetSpec>,
    pub sort_clauses: Vec<(String, String)>,
    pub paging: Paging,
    pub highlight: bool,
    pub geo_facet_field: Option<String>,
    pub chrono_facet_field: Option<String>,
    pub field_keys: Vec<FacetFieldKey>,
    pub filters_unresolved: u64,
}

/// Escape the engine's query metacharacters in one bare term.
fn escape_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if "+-&|!(){}[]^\"~*?:\\/".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Translate raw full-text input into quoted, escaped term groups.
/// Unquoted words are AND-combined; quoted phrases survive verbatim.
fn fulltext_clause(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut groups = Vec::new();
    let mut rest = input;
    while !rest.is_empty() {
        rest = rest.trim_start();
        if let Some(body) = rest.strip_prefix('"') {
            let (phrase, tail) = body.split_once('"').unwrap_or((body, ""));
            if !phrase.is_empty() {
                groups.push(format!("\"{}\"", phrase.replace('\\', "").replace('"', "")));
            }
            rest = tail;
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            let (word, tail) = rest.split_at(end);
            if !word.is_empty() {
                groups.push(escape_term(word));
            }
            rest = tail;
        }
    }
    if groups.is_empty() {
        return None;
    }
    Some(groups.join(" AND "))
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

fn valid_tile(tile: &str) -> bool {
    !tile.is_empty() && tile.chars().all(|c| ('0'..='3').contains(&c))
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn or_group(atoms: Vec<String>) -> Option<String> {
    match atoms.len() {
        0 => None,
        1 => Some(atoms.into_iter().next().unwrap_or_default()),
        _ => Some(format!("({})", atoms.join(" OR "))),
    }
}

/// A terminal `lo..hi` range segment on a property path, numeric or
/// RFC3339-dated. Produced by range-facet drill-down links.
enum RangeSegment {
    Numeric(f64, f64),
    Date(String, String),
}

fn parse_range_segment(segment: &str) -> Option<RangeSegment> {
    let (lo, hi) = segment.split_once("..")?;
    if let (Ok(lo), Ok(hi)) = (lo.parse::<f64>(), hi.parse::<f64>()) {
        return Some(RangeSegment::Numeric(lo, hi));
    }
    if chrono::DateTime::parse_from_rfc3339(lo).is_ok()
        && chrono::DateTime::parse_from_rfc3339(hi).is_ok()
    {
        return Some(RangeSegment::Date(lo.to_string(), hi.to_string()));
    }
    None
}

/// One expanded path variant into its deepest filter clause plus the facet
/// fields its leaves imply. A variant may still contain an unexpanded OR
/// segment; alternatives fan out in place.
fn variant_clause(variant: &[String], suffix: &str) -> Option<(String, Vec<String>)> {
    let mut parents: Vec<String> = vec![ROOT_PARENT.to_string()];
    let mut clause = None;
    for segment in variant {
        if let Some(range) = parse_range_segment(segment) {
            // a terminal range narrows the preceding predicate's values
            let atoms: Vec<String> = parents
                .iter()
                .map(|parent| match &range {
                    RangeSegment::Numeric(lo, hi) => {
                        format!("{parent}{FIELD_SEP}{suffix}_numeric:[{lo} TO {hi}]")
                    }
                    RangeSegment::Date(lo, hi) => {
                        format!("{parent}{FIELD_SEP}{suffix}_date:[{lo} TO {hi}]")
                    }
                })
                .collect();
            clause = or_group(atoms);
            continue;
        }
        let alts: Vec<String> = segment
            .split(OR_DELIM)
            .map(hierarchy::path_to_slug)
            .filter(|slug| valid_slug(slug))
            .collect();
        if alts.is_empty() {
            return None;
        }
        let atoms: Vec<String> = parents
            .iter()
            .flat_map(|parent| {
                alts.iter().map(move |alt| {
                    format!("{parent}{FIELD_SEP}{suffix}:{alt}{FIELD_SEP}*")
                })
            })
            .collect();
        clause = or_group(atoms);
        parents = alts;
    }
    let leaf_fields: Vec<String> = parents
        .into_iter()
        .map(|leaf| format!("{leaf}{FIELD_SEP}{suffix}"))
        .collect();
    clause.map(|clause| (clause, leaf_fields))
}

/// A whole raw hierarchy value into one filter clause (variants OR-joined)
/// and the leaf facet fields to offer for further drill-down.
fn hierarchy_filter(raw: &str, delim: &str, suffix: &str) -> Option<(String, Vec<String>)> {
    let variants = hierarchy::expand_path(raw, delim, OR_DELIM);
    if variants.is_empty() {
        return None;
    }
    let mut clauses = Vec::new();
    let mut leaf_fields: Vec<String> = Vec::new();
    for variant in &variants {
        if let Some((clause, leaves)) = variant_clause(variant, suffix) {
            clauses.push(clause);
            for leaf in leaves {
                if !leaf_fields.contains(&leaf) {
                    leaf_fields.push(leaf);
                }
            }
        }
    }
    let clause = or_group(clauses)?;
    Some((clause, leaf_fields))
}

/// Hierarchical parameters in composition order: (param, delimiter, suffix).
const HIERARCHY_PARAMS: &[(&str, &str, &str)] = &[
    (params::CONTEXT_PATH, CONTEXT_DELIM, schema::SUFFIX_CONTEXT),
    (params::CATEGORY, HIERARCHY_DELIM, schema::SUFFIX_CATEGORY),
    (params::PROPERTY, HIERARCHY_DELIM, schema::SUFFIX_PREDICATE),
    (params::VOCABULARY, HIERARCHY_DELIM, schema::SUFFIX_VOCAB),
    (params::PROJECT, HIERARCHY_DELIM, schema::SUFFIX_PROJECT),
];

pub fn compose(request: &RequestParameters) -> ComposedQuery {
    let types = request.response_types();
    let mut query = ComposedQuery {
        fulltext: None,
        filters: Vec::new(),
        facet_fields: Vec::new(),
        facet_queries: Vec::new(),
        stats_fields: Vec::new(),
        range_facets: Vec::new(),
        sort_clauses: parse_sort_spec(request.first(params::SORT)),
        paging: Paging::Offset {
            start: 0,
            rows: request.rows(),
        },
        highlight: false,
        geo_facet_field: None,
        chrono_facet_field: None,
        field_keys: Vec::new(),
        filters_unresolved: 0,
    };

    // 1. default facet fields; projects facet when the request already
    // implies a cross-project result set
    if types.facets {
        query.facet_fields.push(schema::ITEM_TYPE.to_string());
        query
            .facet_fields
            .push(hierarchy::field_name(None, schema::SUFFIX_CATEGORY));
        query
            .facet_fields
            .push(hierarchy::field_name(None, schema::SUFFIX_CONTEXT));
        query.facet_fields.push(schema::KEYWORDS.to_string());
        if request.implies_multiple_projects() {
            query
                .facet_fields
                .push(hierarchy::field_name(None, schema::SUFFIX_PROJECT));
        }
        for field in [
            schema::IMAGE_MEDIA_COUNT,
            schema::OTHER_MEDIA_COUNT,
            schema::DOC_MEDIA_COUNT,
        ] {
            query.facet_queries.push(format!("{field}:[1 TO *]"));
        }
    }

    // 2. full-text clause
    if let Some(term) = request.first(params::FULLTEXT) {
        query.fulltext = fulltext_clause(term);
        query.highlight = query.fulltext.is_some();
    }

    // 3. paging: an opaque cursor only when no numeric offset was requested
    let rows = request.rows();
    query.paging = match (request.first_u64(params::START), request.first(params::CURSOR)) {
        (None, Some(token)) if !token.is_empty() => Paging::Cursor {
            token: token.to_string(),
            rows,
        },
        (start, _) => Paging::Offset {
            start: start.unwrap_or(0),
            rows,
        },
    };

    // 4. direct-match filters
    if let Some(id) = request.first(params::IDENTIFIER) {
        query.filters.push(format!(
            "({}:{} OR {}:{})",
            schema::PERSISTENT_ID,
            quoted(id),
            schema::UUID,
            quoted(id)
        ));
    }
    if let Some(uuid) = request.first(params::OBJECT) {
        query
            .filters
            .push(format!("{}:{}", schema::OBJECT_UUID, quoted(uuid)));
    }
    if let Some(uuid) = request.first(params::PERSON) {
        query
            .filters
            .push(format!("{}:{}", schema::PERSON_UUID, quoted(uuid)));
    }
    if let Some(keyword) = request.first(params::KEYWORD) {
        query
            .filters
            .push(format!("{}:{}", schema::KEYWORDS, quoted(keyword)));
    }
    for (param, field) in [
        (params::IMAGES, schema::IMAGE_MEDIA_COUNT),
        (params::OTHER_MEDIA, schema::OTHER_MEDIA_COUNT),
        (params::DOCUMENTS, schema::DOC_MEDIA_COUNT),
    ] {
        if request.has(param) {
            query.filters.push(format!("{field}:[1 TO *]"));
        }
    }
    if request.has(params::ITEM_TYPE) {
        let atoms: Vec<String> = request
            .all(params::ITEM_TYPE)
            .iter()
            .filter(|value| ITEM_TYPES.contains(&value.as_str()))
            .map(|value| format!("{}:{}", schema::ITEM_TYPE, value))
            .collect();
        let requested = request.all(params::ITEM_TYPE).len();
        if atoms.len() < requested {
            query.filters_unresolved += (requested - atoms.len()) as u64;
        }
        if let Some(clause) = or_group(atoms) {
            query.filters.push(clause);
        }
    }

    // 5. spatial and chronological narrowing
    let mut geo_narrowed = false;
    let mut chrono_narrowed = false;
    if let Some(bbox) = request.first(params::BBOX) {
        let corners: Vec<f64> = bbox
            .split(',')
            .filter_map(|part| part.trim().parse::<f64>().ok())
            .collect();
        if corners.len() == 4 && corners[0] <= corners[2] && corners[1] <= corners[3] {
            query.filters.push(format!(
                "{}:[{} TO {}]",
                schema::LONGITUDE,
                corners[0],
                corners[2]
            ));
            query.filters.push(format!(
                "{}:[{} TO {}]",
                schema::LATITUDE,
                corners[1],
                corners[3]
            ));
            geo_narrowed = true;
        } else {
            query.filters_unresolved += 1;
        }
    }
    if let Some(tile) = request.first(params::GEOTILE) {
        if valid_tile(tile) {
            let tile: String = tile
                .chars()
                .take(search_const::GEO_MAX_TILE_DEPTH as usize)
                .collect();
            query
                .filters
                .push(format!("{}:{}*", schema::GEO_TILE, tile));
            geo_narrowed = true;
        } else {
            query.filters_unresolved += 1;
        }
    }
    if let Some(tile) = request.first(params::CHRONOTILE) {
        if valid_tile(tile) {
            let tile: String = tile
                .chars()
                .take(search_const::CHRONO_MAX_TILE_DEPTH as usize)
                .collect();
            query
                .filters
                .push(format!("{}:{}*", schema::CHRONO_TILE, tile));
            chrono_narrowed = true;
        } else {
            query.filters_unresolved += 1;
        }
    }
    // span filters select records whose dating intersects the requested span
    if let Some(start_year) = request.first_f64(params::START_DATE) {
        query
            .filters
            .push(format!("{}:[{} TO *]", schema::LATEST, start_year));
        chrono_narrowed = true;
    }
    if let Some(stop_year) = request.first_f64(params::STOP_DATE) {
        query
            .filters
            .push(format!("{}:[* TO {}]", schema::EARLIEST, stop_year));
        chrono_narrowed = true;
    }

    // 6. hierarchical filters, each recording its facet-field association
    let mut category_leaves: Vec<String> = Vec::new();
    for (param, delim, suffix) in HIERARCHY_PARAMS {
        for raw in request.all(param) {
            match hierarchy_filter(raw, delim, suffix) {
                Some((clause, leaf_fields)) => {
                    query.filters.push(clause);
                    for field in leaf_fields {
                        if *suffix == schema::SUFFIX_CATEGORY {
                            if let Some((leaf, _)) = hierarchy::split_field(&field) {
                                category_leaves.push(leaf.to_string());
                            }
                        }
                        if *suffix == schema::SUFFIX_PREDICATE && types.facets {
                            query.stats_fields.push(format!("{field}_numeric"));
                            query.stats_fields.push(format!("{field}_date"));
                        }
                        if types.facets {
                            query.field_keys.push(FacetFieldKey {
                                field: field.clone(),
                                param: param.to_string(),
                                raw_value: raw.clone(),
                                delim: delim.to_string(),
                            });
                            if !query.facet_fields.contains(&field) {
                                query.facet_fields.push(field);
                            }
                        }
                    }
                }
                None => query.filters_unresolved += 1,
            }
        }
    }

    // 7. tile facet fields, high-resolution once the client has narrowed
    if types.geo_facets {
        let field = if geo_narrowed {
            schema::GEO_TILE
        } else {
            schema::GEO_TILE_LOW
        };
        query.geo_facet_field = Some(field.to_string());
        query.facet_fields.push(field.to_string());
    }
    if types.chrono_facets {
        let field = if chrono_narrowed {
            schema::CHRONO_TILE
        } else {
            schema::CHRONO_TILE_LOW
        };
        query.chrono_facet_field = Some(field.to_string());
        query.facet_fields.push(field.to_string());
    }

    // 8. category-specific extra facet fields
    if types.facets {
        for (category, extra_slugs) in CATEGORY_EXTRA_FACETS {
            if !category_leaves.iter().any(|leaf| leaf == category) {
                continue;
            }
            for slug in *extra_slugs {
                let field = hierarchy::field_name(Some(slug), schema::SUFFIX_PREDICATE);
                if !query.facet_fields.contains(&field) {
                    query.facet_fields.push(field.clone());
                    query.field_keys.push(FacetFieldKey {
                        field,
                        param: params::PROPERTY.to_string(),
                        raw_value: slug.to_string(),
                        delim: HIERARCHY_DELIM.to_string(),
                    });
                }
            }
        }
    }

    // 9. no facet output wanted: strip facet computation entirely
    if !types.wants_any_facets() {
        query.facet_fields.clear();
        query.facet_queries.clear();
        query.stats_fields.clear();
        query.field_keys.clear();
        query.geo_facet_field = None;
        query.chrono_facet_field = None;
    }

    query
}

impl ComposedQuery {
    /// Render the engine parameter list. Offset and cursor paging are
    /// mutually exclusive here by construction.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut p: Vec<(String, String)> = Vec::new();
        p.push(("q".into(), self.fulltext.clone().unwrap_or("*:*".into())));
        p.push(("df".into(), schema::TEXT.into()));
        p.push(("wt".into(), "json".into()));

        for filter in &self.filters {
            p.push(("fq".into(), filter.clone()));
        }

        let any_facets = !self.facet_fields.is_empty()
            || !self.facet_queries.is_empty()
            || !self.range_facets.is_empty();
        if any_facets {
            p.push(("facet".into(), "true".into()));
            p.push(("facet.mincount".into(), "1".into()));
            p.push((
                "facet.limit".into(),
                search_const::FACET_FIELD_LIMIT.to_string(),
            ));
            for field in &self.facet_fields {
                p.push(("facet.field".into(), field.clone()));
            }
            for facet_query in &self.facet_queries {
                p.push(("facet.query".into(), facet_query.clone()));
            }
            for range in &self.range_facets {
                p.push(("facet.range".into(), range.field.clone()));
                p.push((
                    format!("f.{}.facet.range.start", range.field),
                    range.start.clone(),
                ));
                p.push((
                    format!("f.{}.facet.range.end", range.field),
                    range.end.clone(),
                ));
                p.push((
                    format!("f.{}.facet.range.gap", range.field),
                    range.gap.clone(),
                ));
            }
        }

        if !self.stats_fields.is_empty() {
            p.push(("stats".into(), "true".into()));
            for field in &self.stats_fields {
                p.push(("stats.field".into(), field.clone()));
            }
        }

        let mut sort_clauses = self.sort_clauses.clone();
        if sort_clauses.is_empty() {
            if self.fulltext.is_some() {
                sort_clauses.push(("score".into(), "desc".into()));
            } else {
                sort_clauses.push(("interest_score".into(), "desc".into()));
            }
        }
        if matches!(self.paging, Paging::Cursor { .. })
            && !sort_clauses.iter().any(|(field, _)| field == schema::UUID)
        {
            // cursors require a total order; uuid is the tiebreaker
            sort_clauses.push((schema::UUID.into(), "asc".into()));
        }
        let sort = sort_clauses
            .iter()
            .map(|(field, direction)| format!("{field} {direction}"))
            .collect::<Vec<_>>()
            .join(", ");
        p.push(("sort".into(), sort));

        match &self.paging {
            Paging::Offset { start, rows } => {
                p.push(("start".into(), start.to_string()));
                p.push(("rows".into(), rows.to_string()));
            }
            Paging::Cursor { token, rows } => {
                p.push(("cursorMark".into(), token.clone()));
                p.push(("rows".into(), rows.to_string()));
            }
        }

        if self.highlight {
            p.push(("hl".into(), "true".into()));
            p.push(("hl.fl".into(), schema::TEXT.into()));
            p.push(("hl.snippets".into(), "1".into()));
            p.push(("hl.fragsize".into(), "200".into()));
            p.push(("hl.simple.pre".into(), HIGHLIGHT_PRE.into()));
            p.push(("hl.simple.post".into(), HIGHLIGHT_POST.into()));
        }
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&str, &str)]) -> RequestParameters {
        RequestParameters::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn or_path_expands_to_both_variants() {
        let query = compose(&request(&[
            ("type", "subjects"),
            ("path", "Turkey/Domuztepe/I||II"),
        ]));
        let context_filter = query
            .filters
            .iter()
            .find(|f| f.contains("___context"))
            .unwrap();
        assert!(context_filter.contains("domuztepe___context:i___*"));
        assert!(context_filter.contains("domuztepe___context:ii___*"));
        assert!(context_filter.contains(" OR "));
    }

    #[test]
    fn facet_keys_map_back_to_literal_raw_value() {
        let query = compose(&request(&[("path", "Turkey/Domuztepe/I||II")]));
        let keys: Vec<&FacetFieldKey> = query
            .field_keys
            .iter()
            .filter(|key| key.param == "path")
            .collect();
        assert!(!keys.is_empty());
        for key in keys {
            assert_eq!(key.raw_value, "Turkey/Domuztepe/I||II");
        }
    }

    #[test]
    fn cursor_and_offset_are_exclusive() {
        let query = compose(&request(&[("cursor", "AoEpMDAwMA==")]));
        assert!(matches!(query.paging, Paging::Cursor { .. }));
        let rendered = query.to_params();
        assert!(rendered.iter().any(|(k, _)| k == "cursorMark"));
        assert!(!rendered.iter().any(|(k, _)| k == "start"));

        // an explicit offset wins over the cursor
        let query = compose(&request(&[("cursor", "AoEpMDAwMA=="), ("start", "40")]));
        assert!(matches!(query.paging, Paging::Offset { start: 40, .. }));
        let rendered = query.to_params();
        assert!(!rendered.iter().any(|(k, _)| k == "cursorMark"));
    }

    #[test]
    fn cursor_sort_gets_uuid_tiebreaker() {
        let query = compose(&request(&[("cursor", "AoE=")]));
        let rendered = query.to_params();
        let sort = &rendered.iter().find(|(k, _)| k == "sort").unwrap().1;
        assert!(sort.ends_with("uuid asc"));
    }

    #[test]
    fn rows_are_clamped() {
        let query = compose(&request(&[("rows", "20000")]));
        assert_eq!(query.paging.rows(), search_const::MAX_ROWS);
    }

    #[test]
    fn projects_facet_added_when_filters_imply_it() {
        let bare = compose(&request(&[]));
        assert!(!bare.facet_fields.iter().any(|f| f == "root___project"));
        let filtered = compose(&request(&[("cat", "cat-pottery")]));
        assert!(filtered.facet_fields.iter().any(|f| f == "root___project"));
    }

    #[test]
    fn quoted_phrases_survive_and_words_and_combine() {
        let query = compose(&request(&[("q", "painted \"fine ware\" bowl")]));
        assert_eq!(
            query.fulltext.as_deref(),
            Some("painted AND \"fine ware\" AND bowl")
        );
        assert!(query.highlight);
    }

    #[test]
    fn fulltext_metacharacters_escaped() {
        let query = compose(&request(&[("q", "bowl:large")]));
        assert_eq!(query.fulltext.as_deref(), Some("bowl\\:large"));
    }

    #[test]
    fn unknown_item_type_dropped_and_counted() {
        let query = compose(&request(&[("type", "starships")]));
        assert!(!query.filters.iter().any(|f| f.contains("starships")));
        assert_eq!(query.filters_unresolved, 1);
    }

    #[test]
    fn narrowing_switches_tile_field_to_high_resolution() {
        let low = compose(&request(&[]));
        assert_eq!(low.geo_facet_field.as_deref(), Some(schema::GEO_TILE_LOW));
        assert_eq!(
            low.chrono_facet_field.as_deref(),
            Some(schema::CHRONO_TILE_LOW)
        );
        let narrowed = compose(&request(&[
            ("bbox", "26.0,36.0,28.0,38.0"),
            ("start-date", "-6000"),
        ]));
        assert_eq!(narrowed.geo_facet_field.as_deref(), Some(schema::GEO_TILE));
        assert_eq!(
            narrowed.chrono_facet_field.as_deref(),
            Some(schema::CHRONO_TILE)
        );
    }

    #[test]
    fn malformed_bbox_dropped_and_counted() {
        let query = compose(&request(&[("bbox", "26.0,36.0,oops")]));
        assert!(!query.filters.iter().any(|f| f.contains("longitude")));
        assert_eq!(query.filters_unresolved, 1);
    }

    #[test]
    fn bare_listing_strips_facets() {
        let query = compose(&request(&[("response", "uuid"), ("cat", "cat-coin")]));
        assert!(query.facet_fields.is_empty());
        assert!(query.facet_queries.is_empty());
        assert!(query.stats_fields.is_empty());
        let rendered = query.to_params();
        assert!(!rendered.iter().any(|(k, _)| k == "facet"));
    }

    #[test]
    fn category_rule_exposes_extra_facet_fields() {
        let query = compose(&request(&[("cat", "cat-animal-bone")]));
        assert!(query.facet_fields.iter().any(|f| f == "has-taxon___pred"));
        let key = query
            .field_keys
            .iter()
            .find(|key| key.field == "has-taxon___pred")
            .unwrap();
        assert_eq!(key.param, "prop");
        assert_eq!(key.raw_value, "has-taxon");
    }

    #[test]
    fn range_segment_narrows_the_predicate() {
        let query = compose(&request(&[("prop", "has-thickness---2.5..4")]));
        assert!(query
            .filters
            .iter()
            .any(|f| f == "has-thickness___pred_numeric:[2.5 TO 4]"));
    }

    #[test]
    fn date_range_segment_uses_the_date_field() {
        let query = compose(&request(&[(
            "prop",
            "published-on---2010-01-01T00:00:00Z..2011-01-01T00:00:00Z",
        )]));
        assert!(query.filters.iter().any(|f| f
            == "published-on___pred_date:[2010-01-01T00:00:00Z TO 2011-01-01T00:00:00Z]"));
    }

    #[test]
    fn property_filters_request_stats_fields() {
        let query = compose(&request(&[("prop", "has-thickness")]));
        assert!(query
            .stats_fields
            .iter()
            .any(|f| f == "has-thickness___pred_numeric"));
        assert!(query
            .stats_fields
            .iter()
            .any(|f| f == "has-thickness___pred_date"));
    }
}
