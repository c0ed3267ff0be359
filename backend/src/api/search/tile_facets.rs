//! Tile facet aggregation: geospatial map features and chronology spans.
//!
//! Raw tile facets come back at index resolution. Here they are cleaned of
//! degenerate-coordinate noise, truncated to an adaptive depth, re-summed by
//! truncated prefix, and turned into clickable map/timeline options.

use std::collections::BTreeMap;

use common::search_const::params;
use common::search_link;
use common::search_query::RequestParameters;
use common::search_result::{
    ChronoFacet, ChronoTileOption, GeoFacet, GeoTileFeature, TileGeometry,
};
use common::{chrono_tile, geo_tile};

/// Truncate tiles to `depth` and re-sum counts per truncated prefix.
fn truncate_and_sum(tiles: &[(String, u64)], depth: u32) -> BTreeMap<String, u64> {
    let mut grouped: BTreeMap<String, u64> = BTreeMap::new();
    for (tile, count) in tiles {
        let truncated: String = tile.chars().take(depth as usize).collect();
        if truncated.is_empty() {
            continue;
        }
        *grouped.entry(truncated).or_default() += count;
    }
    grouped
}

fn clamp_override(depth: u32, cfg: &geo_tile::TileAggregationConfig) -> u32 {
    depth.clamp(cfg.min_depth, cfg.max_depth)
}

pub fn build_geo_facet(
    request: &RequestParameters,
    raw_tiles: Vec<(String, u64)>,
    cfg: &geo_tile::TileAggregationConfig,
) -> Option<GeoFacet> {
    let tiles: Vec<(String, u64)> = raw_tiles
        .into_iter()
        .filter(|(tile, _)| !geo_tile::is_degenerate_tile(tile))
        .collect();
    if tiles.is_empty() {
        return None;
    }

    // explicit client override bypasses the signals but not the clamp
    let depth = match request.first_u32(params::GEO_DEEP) {
        Some(depth) => clamp_override(depth, cfg),
        None => geo_tile::aggregation_depth(&tiles, cfg),
    };

    let current_url = search_link::canonical_url(request);
    let as_points = request.first(params::TILE_SHAPE) == Some("point");

    let mut features = Vec::new();
    for (tile, count) in truncate_and_sum(&tiles, depth) {
        let url = search_link::url_replacing(request, params::GEOTILE, &tile);
        if url == current_url {
            continue;
        }
        let geometry = if as_points {
            TileGeometry::Point(geo_tile::tile_to_point(&tile))
        } else {
            TileGeometry::Polygon(geo_tile::tile_to_polygon(&tile))
        };
        features.push(GeoTileFeature {
            tile,
            count,
            url,
            geometry,
        });
    }
    if features.is_empty() {
        return None;
    }
    features.sort_by_key(|feature| u64::MAX - feature.count);
    Some(GeoFacet {
        aggregation_depth: depth,
        features,
    })
}

pub fn build_chrono_facet(
    request: &RequestParameters,
    raw_tiles: Vec<(String, u64)>,
    cfg: &geo_tile::TileAggregationConfig,
) -> Option<ChronoFacet> {
    if raw_tiles.is_empty() {
        return None;
    }
    let depth = match request.first_u32(params::CHRONO_DEEP) {
        Some(depth) => clamp_override(depth, cfg),
        None => chrono_tile::aggregation_depth(&raw_tiles, cfg),
    };

    let current_url = search_link::canonical_url(request);
    let mut options = Vec::new();
    for (tile, count) in truncate_and_sum(&raw_tiles, depth) {
        let url = search_link::url_replacing(request, params::CHRONOTILE, &tile);
        if url == current_url {
            continue;
        }
        let (earliest, latest) = chrono_tile::tile_to_span(&tile);
        options.push(ChronoTileOption {
            tile,
            earliest,
            latest,
            count,
            url,
        });
    }
    if options.is_empty() {
        return None;
    }
    options.sort_by(|a, b| {
        a.earliest
            .partial_cmp(&b.earliest)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Some(ChronoFacet {
        aggregation_depth: depth,
        options,
    })
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

    fn geo_cfg() -> geo_tile::TileAggregationConfig {
        geo_tile::TileAggregationConfig::geo()
    }

    #[test]
    fn degenerate_tiles_excluded() {
        let noise = geo_tile::lon_lat_to_tile(0.0, 0.0, 12);
        let facet = build_geo_facet(&request(&[]), vec![(noise, 999)], &geo_cfg());
        assert!(facet.is_none());
    }

    #[test]
    fn counts_resum_under_truncation() {
        let a = geo_tile::lon_lat_to_tile(37.551, 27.211, 18);
        let b = geo_tile::lon_lat_to_tile(37.552, 27.212, 18);
        let facet = build_geo_facet(
            &request(&[("geodeep", "5")]),
            vec![(a, 3), (b, 4)],
            &geo_cfg(),
        );
        let facet = facet.unwrap();
        assert_eq!(facet.aggregation_depth, 5);
        assert_eq!(facet.features.len(), 1);
        assert_eq!(facet.features[0].count, 7);
        assert_eq!(facet.features[0].tile.chars().count(), 5);
    }

    #[test]
    fn geodeep_override_is_clamped() {
        let tile = geo_tile::lon_lat_to_tile(37.5, 27.2, 18);
        let facet = build_geo_facet(
            &request(&[("geodeep", "99")]),
            vec![(tile, 1)],
            &geo_cfg(),
        )
        .unwrap();
        assert_eq!(facet.aggregation_depth, geo_cfg().max_depth);
    }

    #[test]
    fn point_shape_on_request() {
        let tile = geo_tile::lon_lat_to_tile(37.5, 27.2, 18);
        let facet = build_geo_facet(
            &request(&[("tile-shape", "point"), ("geodeep", "8")]),
            vec![(tile, 2)],
            &geo_cfg(),
        )
        .unwrap();
        assert!(matches!(facet.features[0].geometry, TileGeometry::Point(_)));
    }

    #[test]
    fn chrono_options_carry_spans_in_order() {
        let cfg = geo_tile::TileAggregationConfig::chrono();
        let early = chrono_tile::span_to_tile(-6000.0, -5800.0, 16);
        let late = chrono_tile::span_to_tile(-1200.0, -1000.0, 16);
        let facet = build_chrono_facet(
            &request(&[("chronodeep", "12")]),
            vec![(late, 2), (early, 5)],
            &cfg,
        )
        .unwrap();
        assert_eq!(facet.aggregation_depth, 12);
        assert!(facet.options.len() >= 2);
        assert!(facet.options[0].earliest <= facet.options[1].earliest);
        for option in &facet.options {
            assert!(option.earliest < option.latest);
            assert!(option.url.contains("chronotile="));
        }
    }

    #[test]
    fn tile_drill_down_replaces_current_tile_filter() {
        let cfg = geo_cfg();
        let tile = geo_tile::lon_lat_to_tile(37.5, 27.2, 18);
        let req = request(&[("geotile", "0313"), ("geodeep", "6")]);
        let facet = build_geo_facet(&req, vec![(tile, 1)], &cfg).unwrap();
        // the new tile filter replaces, not stacks on, the old one
        assert_eq!(
            facet.features[0]
                .url
                .matches("geotile=")
                .count(),
            1
        );
    }
}
