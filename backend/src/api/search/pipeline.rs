//! The search pipeline: cache probe, composition, prequery, engine round
//! trip, aggregation, assembly, response shaping, cache write.
//!
//! The pipeline is stateless per request; the only cross-request state is
//! the pair of injected caches. Engine failure degrades to an empty
//! best-effort result unless the client asked for raw errors; repository
//! failures degrade to missing enrichment; cache writes are fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use common::geo_tile::TileAggregationConfig;
use common::hierarchy;
use common::search_const::{HIERARCHY_DELIM, params};
use common::search_link;
use common::search_query::RequestParameters;
use common::search_result::{
    ActiveFilter, PagingBlock, ResponseMetadata, SearchApiResponse,
};

use crate::api::search::assemble::{
    apply_category_icons, apply_geometries, apply_string_values, assemble_records,
};
use crate::api::search::compose::{ComposedQuery, Paging, compose, schema};
use crate::api::search::facets::{
    build_range_facets, build_standard_facets, humanize, most_specific_categories,
};
use crate::api::search::sort::build_sort_block;
use crate::api::search::stats_prequery::resolve_range_facets;
use crate::api::search::tile_facets::{build_chrono_facet, build_geo_facet};
use crate::db_utils::clickhouse_utils::{
    CategoryRow, fetch_entity_labels, fetch_geometries, fetch_project_categories,
    fetch_string_assertions,
};
use crate::db_utils::response_cache::{ClickhouseCache, MemoryCache, SearchCache};
use crate::db_utils::solr_utils::{RawFacetCounts, facet_value_counts, solr_select};

pub struct SearchEngine {
    pub response_cache: Arc<dyn SearchCache>,
    pub entity_cache: Arc<dyn SearchCache>,
    pub geo_config: TileAggregationConfig,
    pub chrono_config: TileAggregationConfig,
}

impl SearchEngine {
    pub fn new(response_cache: Arc<dyn SearchCache>, entity_cache: Arc<dyn SearchCache>) -> Self {
        SearchEngine {
            response_cache,
            entity_cache,
            geo_config: TileAggregationConfig::geo(),
            chrono_config: TileAggregationConfig::chrono(),
        }
    }

    pub fn from_env() -> Self {
        SearchEngine::new(
            Arc::new(ClickhouseCache::new("search_response_cache")),
            Arc::new(MemoryCache::new()),
        )
    }

    pub async fn run_search(&self, request: RequestParameters) -> anyhow::Result<SearchApiResponse> {
        let types = request.response_types();
        let canonical = search_link::canonical_url(&request);

        if let Some(cached) = self.response_cache.get(&canonical).await {
            if let Ok(response) = serde_json::from_str::<SearchApiResponse>(&cached) {
                info!("response cache hit: {}", canonical);
                return Ok(response);
            }
        }

        let mut composed = compose(&request);
        if !composed.stats_fields.is_empty() {
            // two sequential engine round trips: buckets depend on stats
            composed.range_facets = resolve_range_facets(&composed).await;
        }

        let raw = match solr_select(&composed.to_params()).await {
            Ok(raw) => raw,
            Err(err) => {
                if types.raw {
                    return Err(err);
                }
                warn!("engine query failed, returning empty result: {}", err);
                return Ok(self.empty_response(canonical, request, &composed));
            }
        };

        let total_found = raw.response.num_found;
        let mut response = SearchApiResponse {
            id: canonical.clone(),
            query: request.clone(),
            ..Default::default()
        };

        if types.metadata {
            response.metadata = Some(ResponseMetadata {
                total_found,
                engine_ms: raw.header.qtime,
                filters_unresolved: composed.filters_unresolved,
            });
            response.sorting = Some(build_sort_block(&request));
            response.paging = Some(paging_block(
                &request,
                &composed,
                total_found,
                raw.next_cursor_mark.clone(),
            ));
            response.active_filters = self.build_active_filters(&request).await;
        }

        let empty_counts = RawFacetCounts::default();
        let facet_counts = raw.facet_counts.as_ref().unwrap_or(&empty_counts);

        let category_rows = self
            .category_rows_for(&request, facet_counts, types.facets || types.records)
            .await;

        if types.facets {
            let mut facets = build_standard_facets(&request, &composed, facet_counts);
            facets.extend(build_range_facets(&request, &composed, facet_counts));
            if !category_rows.is_empty() {
                for facet in facets.iter_mut() {
                    if facet.field.ends_with("___cat") {
                        facet.options = most_specific_categories(
                            std::mem::take(&mut facet.options),
                            &category_rows,
                        );
                    }
                }
                facets.retain(|facet| !facet.options.is_empty());
            }
            response.facets = facets;
        }

        if types.geo_facets {
            if let Some(field) = &composed.geo_facet_field {
                if let Some(flat) = facet_counts.facet_fields.get(field) {
                    response.geo_facet =
                        build_geo_facet(&request, facet_value_counts(flat), &self.geo_config);
                }
            }
        }
        if types.chrono_facets {
            if let Some(field) = &composed.chrono_facet_field {
                if let Some(flat) = facet_counts.facet_fields.get(field) {
                    response.chrono_facet =
                        build_chrono_facet(&request, facet_value_counts(flat), &self.chrono_config);
                }
            }
        }

        if types.records {
            let mut batch = assemble_records(&request, &raw);
            let mut geometry_sources: Vec<String> = batch
                .geometry_needs
                .iter()
                .map(|(_, source)| source.clone())
                .collect();
            geometry_sources.sort();
            geometry_sources.dedup();

            // both enrichment lookups are batched and independent
            let (strings, shapes) = futures::join!(
                fetch_string_assertions(&batch.string_needs),
                fetch_geometries(&geometry_sources)
            );
            match strings {
                Ok(values) => apply_string_values(&mut batch.records, &values),
                Err(err) => warn!("string-attribute lookup failed, skipping: {}", err),
            }
            match shapes {
                Ok(shapes) => apply_geometries(&mut batch.records, &batch.geometry_needs, &shapes),
                Err(err) => warn!("geometry lookup failed, skipping: {}", err),
            }
            apply_category_icons(&mut batch.records, &category_rows);
            response.records = batch.records;
        }

        if types.uuids || types.uris {
            for doc in &raw.response.docs {
                let Some(uuid) = doc.get(schema::UUID).and_then(|v| v.as_str()) else {
                    continue;
                };
                if types.uuids {
                    response.uuids.push(uuid.to_string());
                }
                if types.uris {
                    let uri = doc
                        .get(schema::URI)
                        .and_then(|v| v.as_str())
                        .map(|uri| uri.to_string())
                        .unwrap_or_else(|| {
                            let item_type = doc
                                .get(schema::ITEM_TYPE)
                                .and_then(|v| v.as_str())
                                .unwrap_or("subjects");
                            format!("/{item_type}/{uuid}")
                        });
                    response.uris.push(uri);
                }
            }
        }

        if let Ok(serialized) = serde_json::to_string(&response) {
            let cache = self.response_cache.clone();
            let key = canonical.clone();
            tokio::spawn(async move {
                cache.set(&key, &serialized).await;
            });
        }
        Ok(response)
    }

    fn empty_response(
        &self,
        canonical: String,
        request: RequestParameters,
        composed: &ComposedQuery,
    ) -> SearchApiResponse {
        let types = request.response_types();
        let mut response = SearchApiResponse {
            id: canonical,
            query: request.clone(),
            ..Default::default()
        };
        if types.metadata {
            response.metadata = Some(ResponseMetadata {
                total_found: 0,
                engine_ms: 0,
                filters_unresolved: composed.filters_unresolved,
            });
        }
        response
    }

    /// Projects in play: explicit project filters plus any projects the
    /// index offered as facet values.
    async fn category_rows_for(
        &self,
        request: &RequestParameters,
        facet_counts: &RawFacetCounts,
        wanted: bool,
    ) -> Vec<CategoryRow> {
        if !wanted {
            return Vec::new();
        }
        let mut project_slugs: Vec<String> = Vec::new();
        for raw in request.all(params::PROJECT) {
            if let Some(slug) = leaf_slug(raw) {
                project_slugs.push(slug);
            }
        }
        let project_field = hierarchy::field_name(None, schema::SUFFIX_PROJECT);
        if let Some(flat) = facet_counts.facet_fields.get(&project_field) {
            for (token, _) in facet_value_counts(flat) {
                project_slugs.push(hierarchy::decode_entity_token(&token).slug);
            }
        }
        project_slugs.sort();
        project_slugs.dedup();
        if project_slugs.is_empty() {
            return Vec::new();
        }
        match fetch_project_categories(&project_slugs).await {
            Ok(rows) => rows,
            Err(err) => {
                warn!("category lookup failed, skipping summaries: {}", err);
                Vec::new()
            }
        }
    }

    /// Labels for bare slugs in active filters, through the entity cache
    /// with one batched repository lookup for the misses.
    async fn entity_labels(&self, slugs: &[String]) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        let mut missing = Vec::new();
        for slug in slugs {
            match self.entity_cache.get(&format!("label:{slug}")).await {
                Some(label) => {
                    labels.insert(slug.clone(), label);
                }
                None => missing.push(slug.clone()),
            }
        }
        if missing.is_empty() {
            return labels;
        }
        match fetch_entity_labels(&missing).await {
            Ok(fetched) => {
                for (slug, label) in fetched {
                    self.entity_cache
                        .set(&format!("label:{slug}"), &label)
                        .await;
                    labels.insert(slug, label);
                }
            }
            Err(err) => warn!("entity label lookup failed: {}", err),
        }
        labels
    }

    async fn build_active_filters(&self, request: &RequestParameters) -> Vec<ActiveFilter> {
        const FILTER_PARAMS: &[&str] = &[
            params::FULLTEXT,
            params::ITEM_TYPE,
            params::CONTEXT_PATH,
            params::CATEGORY,
            params::PROPERTY,
            params::VOCABULARY,
            params::PROJECT,
            params::IDENTIFIER,
            params::OBJECT,
            params::PERSON,
            params::KEYWORD,
            params::BBOX,
            params::GEOTILE,
            params::CHRONOTILE,
            params::START_DATE,
            params::STOP_DATE,
            params::IMAGES,
            params::OTHER_MEDIA,
            params::DOCUMENTS,
        ];
        const SLUG_PARAMS: &[&str] = &[
            params::CATEGORY,
            params::PROPERTY,
            params::VOCABULARY,
            params::PROJECT,
        ];

        let mut wanted_slugs = Vec::new();
        for param in SLUG_PARAMS {
            for raw in request.all(param) {
                if let Some(slug) = leaf_slug(raw) {
                    wanted_slugs.push(slug);
                }
            }
        }
        wanted_slugs.sort();
        wanted_slugs.dedup();
        let labels = self.entity_labels(&wanted_slugs).await;

        let mut filters = Vec::new();
        for param in FILTER_PARAMS {
            for raw in request.all(param) {
                let label = if SLUG_PARAMS.contains(param) {
                    match leaf_slug(raw) {
                        Some(slug) => labels
                            .get(&slug)
                            .cloned()
                            .unwrap_or_else(|| humanize(&slug)),
                        None => raw.clone(),
                    }
                } else {
                    raw.clone()
                };
                filters.push(ActiveFilter {
                    param: param.to_string(),
                    value: raw.clone(),
                    label,
                    remove_url: search_link::url_without_value(request, param, raw),
                });
            }
        }
        filters
    }
}

/// Last resolvable slug of a hierarchy path value; range segments and OR
/// groups fall back to their first alternative.
fn leaf_slug(raw: &str) -> Option<String> {
    let leaf = raw
        .split(HIERARCHY_DELIM)
        .filter(|segment| !segment.is_empty() && !segment.contains(".."))
        .last()?;
    let first_alt = leaf.split(common::search_const::OR_DELIM).next()?;
    let slug = hierarchy::path_to_slug(first_alt);
    if slug.is_empty() { None } else { Some(slug) }
}

fn paging_block(
    request: &RequestParameters,
    composed: &ComposedQuery,
    total_found: u64,
    next_cursor_mark: Option<String>,
) -> PagingBlock {
    match &composed.paging {
        Paging::Offset { start, rows } => {
            let start = *start;
            let rows = (*rows).max(1);
            let first = (start > 0).then(|| search_link::url_at_start(request, 0));
            let previous =
                (start > 0).then(|| search_link::url_at_start(request, start.saturating_sub(rows)));
            let next = (start + rows < total_found)
                .then(|| search_link::url_at_start(request, start + rows));
            let last_start = if total_found == 0 {
                0
            } else {
                ((total_found - 1) / rows) * rows
            };
            let last = (last_start > start).then(|| search_link::url_at_start(request, last_start));
            PagingBlock::Offset {
                total_found,
                start,
                rows,
                first,
                previous,
                next,
                last,
            }
        }
        Paging::Cursor { token, rows } => PagingBlock::Cursor {
            total_found,
            rows: *rows,
            // the engine echoes the same mark back when the walk is done
            next_cursor: next_cursor_mark.filter(|mark| mark != token),
        },
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
    fn offset_paging_links() {
        let req = request(&[("start", "40"), ("rows", "20")]);
        let composed = compose(&req);
        let block = paging_block(&req, &composed, 100, None);
        let PagingBlock::Offset {
            start,
            first,
            previous,
            next,
            last,
            ..
        } = block
        else {
            panic!("expected offset paging");
        };
        assert_eq!(start, 40);
        assert!(first.unwrap().contains("rows=20"));
        assert!(previous.unwrap().contains("start=20"));
        assert!(next.unwrap().contains("start=60"));
        assert!(last.unwrap().contains("start=80"));
    }

    #[test]
    fn first_page_has_no_backward_links() {
        let req = request(&[]);
        let composed = compose(&req);
        let block = paging_block(&req, &composed, 10, None);
        let PagingBlock::Offset {
            first,
            previous,
            next,
            last,
            ..
        } = block
        else {
            panic!("expected offset paging");
        };
        assert!(first.is_none());
        assert!(previous.is_none());
        // a single page needs no links at all
        assert!(next.is_none());
        assert!(last.is_none());
    }

    #[test]
    fn exhausted_cursor_yields_no_next() {
        let req = request(&[("cursor", "AoE=")]);
        let composed = compose(&req);
        let block = paging_block(&req, &composed, 5, Some("AoE=".to_string()));
        let PagingBlock::Cursor { next_cursor, .. } = block else {
            panic!("expected cursor paging");
        };
        assert!(next_cursor.is_none());

        let block = paging_block(&req, &composed, 5, Some("AoF=".to_string()));
        let PagingBlock::Cursor { next_cursor, .. } = block else {
            panic!("expected cursor paging");
        };
        assert_eq!(next_cursor.as_deref(), Some("AoF="));
    }

    #[test]
    fn leaf_slug_handles_or_and_ranges() {
        assert_eq!(leaf_slug("has-taxon---ovis||bos"), Some("ovis".to_string()));
        assert_eq!(leaf_slug("has-thickness---2..4"), Some("has-thickness".to_string()));
        assert_eq!(leaf_slug("cat-coin"), Some("cat-coin".to_string()));
        assert_eq!(leaf_slug(""), None);
    }

    #[tokio::test]
    async fn active_filters_have_remove_links() {
        let engine = SearchEngine::new(
            Arc::new(crate::db_utils::response_cache::MemoryCache::new()),
            Arc::new(crate::db_utils::response_cache::MemoryCache::new()),
        );
        // pre-seed the entity cache so no repository round trip happens
        engine.entity_cache.set("label:cat-coin", "Coin").await;
        let req = request(&[("q", "stamped"), ("cat", "cat-coin")]);
        let filters = engine.build_active_filters(&req).await;
        assert_eq!(filters.len(), 2);
        let cat = filters.iter().find(|f| f.param == "cat").unwrap();
        assert_eq!(cat.label, "Coin");
        assert!(!cat.remove_url.contains("cat="));
        assert!(cat.remove_url.contains("q=stamped"));
    }
}
