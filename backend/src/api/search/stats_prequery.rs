//! Stats prequery: discover numeric/date field ranges before the main query.
//!
//! Range-bucketed facets need bucket boundaries, and boundaries need the
//! field's min/max/mean. A lightweight stats-only round trip (rows=0, no
//! facets) runs first; the main query then carries the derived range-facet
//! parameters. The same round trip doubles as type discovery: a property is
//! faceted as numeric or date depending on which of its stats fields has any
//! values at all.

use chrono::{DateTime, Duration, FixedOffset};
use tracing::warn;

use common::search_const;

use crate::api::search::compose::{ComposedQuery, RangeFacetSpec};
use crate::db_utils::solr_utils::{RawStatsEntry, solr_select};

/// Bucket width for a numeric field, per the skew-guard rules: a twentieth
/// of the observed range, shrunk to mean/3 when that exceeds the mean
/// (heavily right-skewed data), and never zero.
pub fn numeric_bucket_width(min: f64, max: f64, mean: f64, count: u64) -> f64 {
    let target = bucket_target(count) as f64;
    let mut width = (max - min) / target;
    if width <= 0.0 {
        width = search_const::RANGE_MIN_WIDTH;
    }
    if mean > 0.0 && width > mean {
        width = mean / 3.0;
    }
    width
}

fn bucket_target(count: u64) -> u64 {
    if count < search_const::RANGE_SMALL_RESULT {
        search_const::RANGE_BUCKET_MIN
    } else {
        search_const::RANGE_BUCKET_TARGET
    }
}

/// Gap in whole days for a date field; calendar difference, not raw
/// numeric subtraction.
pub fn date_bucket_gap_days(
    min: DateTime<FixedOffset>,
    max: DateTime<FixedOffset>,
    count: u64,
) -> i64 {
    let target = bucket_target(count) as i64;
    let total_days = (max - min).num_days();
    (total_days / target).max(1)
}

fn range_spec(field: &str, entry: &RawStatsEntry) -> Option<RangeFacetSpec> {
    if entry.count == 0 {
        return None;
    }
    if let (Some(min), Some(max)) = (entry.min.as_f64(), entry.max.as_f64()) {
        let mean = entry.mean.as_f64().unwrap_or((min + max) / 2.0);
        let width = numeric_bucket_width(min, max, mean, entry.count);
        return Some(RangeFacetSpec {
            field: field.to_string(),
            start: min.to_string(),
            end: (max + width).to_string(),
            gap: width.to_string(),
        });
    }
    if let (Some(min), Some(max)) = (entry.min.as_str(), entry.max.as_str()) {
        let min = DateTime::parse_from_rfc3339(min).ok()?;
        let max = DateTime::parse_from_rfc3339(max).ok()?;
        let gap_days = date_bucket_gap_days(min, max, entry.count);
        let end = max + Duration::days(gap_days);
        return Some(RangeFacetSpec {
            field: field.to_string(),
            start: min.to_rfc3339(),
            end: end.to_rfc3339(),
            gap: format!("+{gap_days}DAYS"),
        });
    }
    None
}

fn stats_params(composed: &ComposedQuery) -> Vec<(String, String)> {
    let mut p: Vec<(String, String)> = Vec::new();
    p.push(("q".into(), composed.fulltext.clone().unwrap_or("*:*".into())));
    p.push(("df".into(), "text".into()));
    p.push(("wt".into(), "json".into()));
    for filter in &composed.filters {
        p.push(("fq".into(), filter.clone()));
    }
    p.push(("rows".into(), "0".into()));
    p.push(("stats".into(), "true".into()));
    for field in &composed.stats_fields {
        p.push(("stats.field".into(), field.clone()));
    }
    p
}

/// Run the prequery and derive range-facet parameters for every stats field
/// that turned out to hold values. Engine failure degrades to "no range
/// facets"; it never fails the request.
pub async fn resolve_range_facets(composed: &ComposedQuery) -> Vec<RangeFacetSpec> {
    if composed.stats_fields.is_empty() {
        return Vec::new();
    }
    let response = match solr_select(&stats_params(composed)).await {
        Ok(response) => response,
        Err(err) => {
            warn!("stats prequery failed, skipping range facets: {}", err);
            return Vec::new();
        }
    };
    let Some(stats) = response.stats else {
        return Vec::new();
    };
    let mut specs = Vec::new();
    for field in &composed.stats_fields {
        let Some(entry) = stats.stats_fields.get(field) else {
            continue;
        };
        if let Some(spec) = range_spec(field, entry) {
            specs.push(spec);
        }
    }
    specs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_is_a_twentieth_of_the_range() {
        let width = numeric_bucket_width(0.0, 200.0, 100.0, 500);
        assert!((width - 10.0).abs() < 1e-9);
    }

    #[test]
    fn width_never_zero() {
        let width = numeric_bucket_width(5.0, 5.0, 5.0, 100);
        assert!(width > 0.0);
    }

    #[test]
    fn skewed_data_clamps_width_below_mean() {
        // range 0..100000 but mean 2: classic right skew
        let width = numeric_bucket_width(0.0, 100_000.0, 2.0, 1000);
        assert!(width <= 2.0);
        assert!((width - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_equal_values_stay_below_mean() {
        let width = numeric_bucket_width(0.0001, 0.0001, 0.0001, 50);
        assert!(width > 0.0);
        assert!(width <= 0.0001);
    }

    #[test]
    fn small_result_sets_use_fewer_buckets() {
        let small = numeric_bucket_width(0.0, 100.0, 50.0, 10);
        let large = numeric_bucket_width(0.0, 100.0, 50.0, 1000);
        assert!(small > large);
    }

    #[test]
    fn date_gap_is_calendar_days() {
        let min = DateTime::parse_from_rfc3339("2010-01-01T00:00:00Z").unwrap();
        let max = DateTime::parse_from_rfc3339("2012-01-01T00:00:00Z").unwrap();
        let gap = date_bucket_gap_days(min, max, 500);
        assert_eq!(gap, 730 / 20);
    }

    #[test]
    fn date_gap_never_below_one_day() {
        let min = DateTime::parse_from_rfc3339("2012-01-01T00:00:00Z").unwrap();
        let max = DateTime::parse_from_rfc3339("2012-01-01T06:00:00Z").unwrap();
        assert_eq!(date_bucket_gap_days(min, max, 1000), 1);
    }

    #[test]
    fn numeric_entry_becomes_range_spec() {
        let entry = RawStatsEntry {
            min: serde_json::json!(0.0),
            max: serde_json::json!(200.0),
            mean: serde_json::json!(90.0),
            count: 400,
        };
        let spec = range_spec("has-thickness___pred_numeric", &entry).unwrap();
        assert_eq!(spec.start, "0");
        assert_eq!(spec.gap, "10");
    }

    #[test]
    fn empty_fields_produce_no_spec() {
        let entry = RawStatsEntry::default();
        assert!(range_spec("f", &entry).is_none());
    }
}
