//! Chronological tiles: nested paths over (earliest, latest) year spans.
//!
//! A record's dating is a pair of signed calendar years (BCE negative, CE
//! positive, fractional years allowed). The pair is treated as a point in a
//! two-dimensional space — earliest on one axis, latest on the other — and
//! encoded as a quadtree path, one base-4 digit per level: bit 0 picks the
//! upper half of the earliest axis, bit 1 the upper half of the latest axis.
//! Prefixes are ancestors, exactly as with geospatial tiles, so the same
//! truncation aggregation applies.

use crate::geo_tile::{TileAggregationConfig, depth_for_group_target};
use crate::search_const;

/// Clamp a year into the root span.
fn clamp_year(year: f64) -> f64 {
    let year = if year.is_finite() { year } else { 0.0 };
    year.clamp(search_const::CHRONO_ROOT_EARLIEST, search_const::CHRONO_ROOT_LATEST)
}

/// Encode a dated span into its tile key at the given depth. Reversed
/// inputs are swapped rather than rejected.
pub fn span_to_tile(earliest: f64, latest: f64, depth: u32) -> String {
    let mut earliest = clamp_year(earliest);
    let mut latest = clamp_year(latest);
    if earliest > latest {
        std::mem::swap(&mut earliest, &mut latest);
    }

    let mut e_lo = search_const::CHRONO_ROOT_EARLIEST;
    let mut e_hi = search_const::CHRONO_ROOT_LATEST;
    let mut l_lo = search_const::CHRONO_ROOT_EARLIEST;
    let mut l_hi = search_const::CHRONO_ROOT_LATEST;

    let mut key = String::with_capacity(depth as usize);
    for _ in 0..depth {
        let e_mid = (e_lo + e_hi) / 2.0;
        let l_mid = (l_lo + l_hi) / 2.0;
        let mut digit = 0u8;
        if earliest >= e_mid {
            digit += 1;
            e_lo = e_mid;
        } else {
            e_hi = e_mid;
        }
        if latest >= l_mid {
            digit += 2;
            l_lo = l_mid;
        } else {
            l_hi = l_mid;
        }
        key.push((b'0' + digit) as char);
    }
    key
}

/// Decode a tile key into the outer bounds of its span:
/// (earliest year, latest year).
pub fn tile_to_span(tile: &str) -> (f64, f64) {
    let mut e_lo = search_const::CHRONO_ROOT_EARLIEST;
    let mut e_hi = search_const::CHRONO_ROOT_LATEST;
    let mut l_lo = search_const::CHRONO_ROOT_EARLIEST;
    let mut l_hi = search_const::CHRONO_ROOT_LATEST;

    for c in tile.chars() {
        let digit = match c {
            '0' => 0u8,
            '1' => 1,
            '2' => 2,
            '3' => 3,
            _ => break,
        };
        let e_mid = (e_lo + e_hi) / 2.0;
        let l_mid = (l_lo + l_hi) / 2.0;
        if digit & 1 != 0 {
            e_lo = e_mid;
        } else {
            e_hi = e_mid;
        }
        if digit & 2 != 0 {
            l_lo = l_mid;
        } else {
            l_hi = l_mid;
        }
    }
    (e_lo, l_hi)
}

/// Width in years of the span a tile covers.
pub fn tile_span_width(tile: &str) -> f64 {
    let (earliest, latest) = tile_to_span(tile);
    latest - earliest
}

/// Depth whose tile width is comparable to an observed year-range width,
/// with the long-span dampening rule: ranges wider than the threshold lose
/// one level per threshold multiple, so a ten-millennium result set does not
/// fragment into hundreds of slivers.
pub fn depth_for_year_width(width: f64) -> u32 {
    let root_width = search_const::CHRONO_ROOT_LATEST - search_const::CHRONO_ROOT_EARLIEST;
    let width = width.abs().max(1.0);
    let raw = (root_width / width).log2().floor();
    let mut depth = if raw <= 0.0 {
        0
    } else {
        (raw as u32).min(search_const::CHRONO_MAX_TILE_DEPTH)
    };
    if width > search_const::CHRONO_DAMPEN_THRESHOLD {
        let dampen = (width / search_const::CHRONO_DAMPEN_THRESHOLD).floor() as u32;
        depth = depth.saturating_sub(dampen);
    }
    depth
}

/// Dual-signal aggregation depth over observed (tile, count) pairs, as with
/// geospatial tiles but using the year-range width as the spread signal.
pub fn aggregation_depth(tiles: &[(String, u64)], cfg: &TileAggregationConfig) -> u32 {
    let keys: Vec<&str> = tiles.iter().map(|(tile, _)| tile.as_str()).collect();
    if keys.is_empty() {
        return cfg.min_depth;
    }
    let count_signal = depth_for_group_target(&keys, cfg.target_groups, cfg.min_depth, cfg.max_depth);

    let mut earliest = f64::MAX;
    let mut latest = f64::MIN;
    for key in &keys {
        let (tile_earliest, tile_latest) = tile_to_span(key);
        earliest = earliest.min(tile_earliest);
        latest = latest.max(tile_latest);
    }
    let width_signal = depth_for_year_width(latest - earliest);

    count_signal.min(width_signal).clamp(cfg.min_depth, cfg.max_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_contains_its_span() {
        let tile = span_to_tile(-1200.0, -800.0, 16);
        let (earliest, latest) = tile_to_span(&tile);
        assert!(earliest <= -1200.0);
        assert!(latest >= -800.0);
    }

    #[test]
    fn child_span_inside_parent_span() {
        let tile = span_to_tile(-5600.0, -5300.0, 12);
        let (p_earliest, p_latest) = tile_to_span(&tile);
        for digit in ["0", "1", "2", "3"] {
            let child = format!("{tile}{digit}");
            let (c_earliest, c_latest) = tile_to_span(&child);
            assert!(c_earliest >= p_earliest);
            assert!(c_latest <= p_latest);
        }
    }

    #[test]
    fn truncation_is_a_valid_ancestor() {
        let tile = span_to_tile(-2500.0, -2100.0, 16);
        let ancestor: String = tile.chars().take(9).collect();
        let (a_earliest, a_latest) = tile_to_span(&ancestor);
        let (t_earliest, t_latest) = tile_to_span(&tile);
        assert!(a_earliest <= t_earliest);
        assert!(a_latest >= t_latest);
    }

    #[test]
    fn reversed_span_is_swapped() {
        assert_eq!(span_to_tile(-800.0, -1200.0, 10), span_to_tile(-1200.0, -800.0, 10));
    }

    #[test]
    fn fractional_years_encode() {
        let a = span_to_tile(1066.25, 1066.75, 16);
        let b = span_to_tile(1066.0, 1067.0, 16);
        // both land in nearby cells of the same ancestor
        assert_eq!(a[..12], b[..12]);
    }

    #[test]
    fn wide_spans_get_shallower_depth() {
        assert!(depth_for_year_width(10_000.0) < depth_for_year_width(100.0));
    }

    #[test]
    fn dampening_kicks_in_past_threshold() {
        let just_under = depth_for_year_width(2_400.0);
        let just_over = depth_for_year_width(2_600.0);
        assert!(just_over < just_under);
    }

    #[test]
    fn aggregation_prefers_shallow_for_long_spans() {
        let cfg = TileAggregationConfig::chrono();
        let long_span: Vec<(String, u64)> = (0..20)
            .map(|i| (span_to_tile(-9_000.0 + i as f64 * 500.0, 1_000.0, 16), 1))
            .collect();
        let short_span: Vec<(String, u64)> = (0..20)
            .map(|i| (span_to_tile(-950.0 + i as f64 * 5.0, -900.0, 16), 1))
            .collect();
        assert!(aggregation_depth(&long_span, &cfg) < aggregation_depth(&short_span, &cfg));
    }
}
