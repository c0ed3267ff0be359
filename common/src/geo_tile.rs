//! Geospatial quadtree tiles (Web Mercator quadkeys).
//!
//! A tile key is one base-4 digit per zoom level; a longer key is a deeper,
//! smaller tile, and a key prefix is an ancestor tile. Truncating keys to a
//! common depth is how map facets are aggregated.

use serde::{Deserialize, Serialize};

use crate::search_const;

const MAX_LATITUDE: f64 = 85.051_128_78;
const EARTH_RADIUS_M: f64 = 6_371_000.0;
const EARTH_CIRCUMFERENCE_M: f64 = 40_075_016.686;

/// Bounds and group target for tile aggregation. The constants here are
/// product tuning, not law; callers may pass their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileAggregationConfig {
    pub min_depth: u32,
    pub max_depth: u32,
    pub target_groups: usize,
}

impl TileAggregationConfig {
    pub fn geo() -> Self {
        TileAggregationConfig {
            min_depth: search_const::GEO_MIN_TILE_DEPTH,
            max_depth: search_const::GEO_MAX_TILE_DEPTH,
            target_groups: search_const::GEO_TARGET_GROUPS,
        }
    }

    pub fn chrono() -> Self {
        TileAggregationConfig {
            min_depth: search_const::CHRONO_MIN_TILE_DEPTH,
            max_depth: search_const::CHRONO_MAX_TILE_DEPTH,
            target_groups: search_const::CHRONO_TARGET_GROUPS,
        }
    }
}

impl Default for TileAggregationConfig {
    fn default() -> Self {
        TileAggregationConfig::geo()
    }
}

fn clamp_lat(lat: f64) -> f64 {
    lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
}

fn clamp_lon(lon: f64) -> f64 {
    lon.clamp(-180.0, 180.0)
}

/// Encode a coordinate into its tile key at the given depth.
pub fn lon_lat_to_tile(lat: f64, lon: f64, depth: u32) -> String {
    let lat = clamp_lat(if lat.is_finite() { lat } else { 0.0 });
    let lon = clamp_lon(if lon.is_finite() { lon } else { 0.0 });

    let x = (lon + 180.0) / 360.0;
    let sin_lat = (lat * std::f64::consts::PI / 180.0).sin();
    let y = 0.5 - ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / (4.0 * std::f64::consts::PI);

    let n = (1u64 << depth) as f64;
    let max_index = (1u64 << depth) - 1;
    let tile_x = ((x * n).floor() as u64).min(max_index);
    let tile_y = ((y * n).floor() as u64).min(max_index);

    let mut key = String::with_capacity(depth as usize);
    for level in (1..=depth).rev() {
        let mask = 1u64 << (level - 1);
        let mut digit = 0u8;
        if tile_x & mask != 0 {
            digit += 1;
        }
        if tile_y & mask != 0 {
            digit += 2;
        }
        key.push((b'0' + digit) as char);
    }
    key
}

fn tile_indexes(tile: &str) -> (u64, u64, u32) {
    let mut tile_x = 0u64;
    let mut tile_y = 0u64;
    let mut depth = 0u32;
    for c in tile.chars() {
        let digit = match c {
            '0' => 0u64,
            '1' => 1,
            '2' => 2,
            '3' => 3,
            // foreign characters end the key early
            _ => break,
        };
        tile_x = (tile_x << 1) | (digit & 1);
        tile_y = (tile_y << 1) | (digit >> 1);
        depth += 1;
    }
    (tile_x, tile_y, depth)
}

/// Decode a tile key into (lon_min, lat_min, lon_max, lat_max).
pub fn tile_to_bounds(tile: &str) -> (f64, f64, f64, f64) {
    let (tile_x, tile_y, depth) = tile_indexes(tile);
    let n = (1u64 << depth) as f64;

    let lon_min = tile_x as f64 / n * 360.0 - 180.0;
    let lon_max = (tile_x + 1) as f64 / n * 360.0 - 180.0;
    let lat_max = mercator_y_to_lat(tile_y as f64 / n);
    let lat_min = mercator_y_to_lat((tile_y + 1) as f64 / n);
    (lon_min, lat_min, lon_max, lat_max)
}

fn mercator_y_to_lat(y: f64) -> f64 {
    let value = std::f64::consts::PI * (1.0 - 2.0 * y);
    value.sinh().atan() * 180.0 / std::f64::consts::PI
}

/// Closed ring of `[lon, lat]` corners for a tile, first point repeated.
pub fn tile_to_polygon(tile: &str) -> Vec<[f64; 2]> {
    let (lon_min, lat_min, lon_max, lat_max) = tile_to_bounds(tile);
    vec![
        [lon_min, lat_min],
        [lon_max, lat_min],
        [lon_max, lat_max],
        [lon_min, lat_max],
        [lon_min, lat_min],
    ]
}

/// Centroid of a tile as `[lon, lat]`.
pub fn tile_to_point(tile: &str) -> [f64; 2] {
    let (lon_min, lat_min, lon_max, lat_max) = tile_to_bounds(tile);
    [(lon_min + lon_max) / 2.0, (lat_min + lat_max) / 2.0]
}

/// The tile that (0, 0) coordinates land in at a given depth. Records with
/// exactly zeroed coordinates are legacy noise and their tile is excluded
/// from aggregation.
pub fn degenerate_tile(depth: u32) -> String {
    lon_lat_to_tile(0.0, 0.0, depth)
}

pub fn is_degenerate_tile(tile: &str) -> bool {
    !tile.is_empty() && tile == degenerate_tile(tile.chars().count() as u32)
}

/// Great-circle distance between two `[lon, lat]` points, in meters.
pub fn haversine_distance_m(a: [f64; 2], b: [f64; 2]) -> f64 {
    let to_rad = std::f64::consts::PI / 180.0;
    let d_lat = (b[1] - a[1]) * to_rad;
    let d_lon = (b[0] - a[0]) * to_rad;
    let h = (d_lat / 2.0).sin().powi(2)
        + (a[1] * to_rad).cos() * (b[1] * to_rad).cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Zoom level whose tile edge is comparable to a distance: larger spans give
/// shallower depth.
pub fn zoom_for_distance(meters: f64) -> u32 {
    let meters = meters.max(1.0);
    let zoom = (EARTH_CIRCUMFERENCE_M / meters).log2().floor();
    if zoom <= 0.0 {
        return 0;
    }
    (zoom as u32).min(search_const::GEO_MAX_TILE_DEPTH)
}

/// Deepest truncation depth that keeps the distinct-prefix count within the
/// group target. Distinct prefixes only grow with depth, so this steps down
/// from the maximum until the tiles fit.
pub fn depth_for_group_target(tiles: &[&str], target_groups: usize, min_depth: u32, max_depth: u32) -> u32 {
    let mut depth = max_depth;
    while depth > min_depth {
        let mut prefixes: Vec<&str> = tiles
            .iter()
            .map(|tile| {
                let end = tile
                    .char_indices()
                    .nth(depth as usize)
                    .map(|(i, _)| i)
                    .unwrap_or(tile.len());
                &tile[..end]
            })
            .collect();
        prefixes.sort_unstable();
        prefixes.dedup();
        if prefixes.len() <= target_groups {
            return depth;
        }
        depth -= 1;
    }
    min_depth
}

/// Dual-signal aggregation depth for a set of observed (tile, count) pairs.
///
/// The count signal keeps distinct output groups within the target; the
/// distance signal keeps the zoom sane for the geographic spread of the
/// observations (one excavation square must not produce continent-deep
/// tiles, a continent must not collapse into one bucket). The shallower of
/// the two wins, clamped to the configured bounds.
pub fn aggregation_depth(tiles: &[(String, u64)], cfg: &TileAggregationConfig) -> u32 {
    let keys: Vec<&str> = tiles.iter().map(|(tile, _)| tile.as_str()).collect();
    if keys.is_empty() {
        return cfg.min_depth;
    }
    let count_signal = depth_for_group_target(&keys, cfg.target_groups, cfg.min_depth, cfg.max_depth);

    let points: Vec<[f64; 2]> = keys.iter().map(|tile| tile_to_point(tile)).collect();
    let mut lon = (f64::MAX, f64::MIN);
    let mut lat = (f64::MAX, f64::MIN);
    for point in &points {
        lon = (lon.0.min(point[0]), lon.1.max(point[0]));
        lat = (lat.0.min(point[1]), lat.1.max(point[1]));
    }
    let span_m = haversine_distance_m([lon.0, lat.0], [lon.1, lat.1]);
    let distance_signal = zoom_for_distance(span_m);

    count_signal
        .min(distance_signal)
        .clamp(cfg.min_depth, cfg.max_depth)
}
