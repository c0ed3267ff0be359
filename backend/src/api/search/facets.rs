//! Standard facet aggregation: raw value/count pairs into labeled,
//! clickable drill-down options.

use common::hierarchy;
use common::search_const::params;
use common::search_link;
use common::search_query::RequestParameters;
use common::search_result::{FacetOption, StandardFacet};

use crate::api::search::compose::{ComposedQuery, schema};
use crate::db_utils::clickhouse_utils::CategoryRow;
use crate::db_utils::solr_utils::{RawFacetCounts, facet_value_counts};

/// Slug to display text: `cat-animal-bone` -> `Cat animal bone`.
pub fn humanize(slug: &str) -> String {
    let text = slug.replace('-', " ");
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => text,
    }
}

fn drill_down_url(
    request: &RequestParameters,
    param: &str,
    raw_value: Option<(&str, &str)>,
    next_value: &str,
) -> String {
    let mut next = request.clone();
    next.remove(params::START);
    next.remove(params::CURSOR);
    if let Some((raw, delim)) = raw_value {
        next.remove_value(param, raw);
        next.append(param, format!("{raw}{delim}{next_value}"));
    } else {
        next.append(param, next_value);
    }
    search_link::canonical_url(&next)
}

fn facet_title(field: &str) -> String {
    match field {
        schema::ITEM_TYPE => "Item types".to_string(),
        schema::KEYWORDS => "Keywords".to_string(),
        "root___cat" => "Categories".to_string(),
        "root___context" => "Contexts".to_string(),
        "root___project" => "Projects".to_string(),
        _ => match hierarchy::split_field(field) {
            Some((parent, _)) => humanize(parent),
            None => humanize(field),
        },
    }
}

/// Build the standard facets for a response. Tile fields are skipped here
/// and aggregated by the tile module; options whose drill-down URL equals
/// the current canonical URL are suppressed as no-op filters.
pub fn build_standard_facets(
    request: &RequestParameters,
    composed: &ComposedQuery,
    facet_counts: &RawFacetCounts,
) -> Vec<StandardFacet> {
    let current_url = search_link::canonical_url(request);
    let mut facets = Vec::new();

    for field in &composed.facet_fields {
        if Some(field) == composed.geo_facet_field.as_ref()
            || Some(field) == composed.chrono_facet_field.as_ref()
        {
            continue;
        }
        let Some(flat) = facet_counts.facet_fields.get(field) else {
            continue;
        };
        let pairs = facet_value_counts(flat);
        if pairs.is_empty() {
            continue;
        }

        let field_key = composed.field_keys.iter().find(|key| &key.field == field);
        let mut options = Vec::new();
        for (value, count) in pairs {
            let entity = hierarchy::decode_entity_token(&value);
            let (url, drill_value) = match field_key {
                Some(key) => {
                    // context paths are label-addressed, everything else is
                    // slug-addressed
                    let next_value = if key.param == params::CONTEXT_PATH {
                        entity.label.clone()
                    } else {
                        entity.slug.clone()
                    };
                    let url = drill_down_url(
                        request,
                        &key.param,
                        Some((&key.raw_value, &key.delim)),
                        &next_value,
                    );
                    (url, next_value)
                }
                None => match field.as_str() {
                    schema::ITEM_TYPE => (
                        search_link::url_replacing(request, params::ITEM_TYPE, &value),
                        value.clone(),
                    ),
                    schema::KEYWORDS => (
                        search_link::url_replacing(request, params::KEYWORD, &value),
                        value.clone(),
                    ),
                    "root___context" => (
                        drill_down_url(request, params::CONTEXT_PATH, None, &entity.label),
                        entity.label.clone(),
                    ),
                    "root___project" => (
                        drill_down_url(request, params::PROJECT, None, &entity.slug),
                        entity.slug.clone(),
                    ),
                    _ => (
                        drill_down_url(request, params::CATEGORY, None, &entity.slug),
                        entity.slug.clone(),
                    ),
                },
            };
            if url == current_url {
                // a no-op filter: drilling down would reproduce this query
                continue;
            }
            let label = if entity.label.is_empty() {
                humanize(&entity.slug)
            } else {
                entity.label.clone()
            };
            options.push(FacetOption {
                value: drill_value,
                label,
                count,
                url,
                entity: Some(entity),
            });
        }
        if options.is_empty() {
            continue;
        }
        options.sort_by_key(|option| (u64::MAX - option.count, option.label.clone()));
        options.truncate(common::search_const::MAX_FACET_OPTIONS);

        let param = field_key
            .map(|key| key.param.clone())
            .unwrap_or_else(|| default_param_for(field).to_string());
        facets.push(StandardFacet {
            field: field.clone(),
            param,
            label: facet_title(field),
            options,
        });
    }

    if let Some(media) = build_related_media_facet(request, facet_counts, &current_url) {
        facets.push(media);
    }
    facets
}

fn default_param_for(field: &str) -> &'static str {
    match field {
        schema::ITEM_TYPE => params::ITEM_TYPE,
        schema::KEYWORDS => params::KEYWORD,
        "root___context" => params::CONTEXT_PATH,
        "root___project" => params::PROJECT,
        _ => params::CATEGORY,
    }
}

fn build_related_media_facet(
    request: &RequestParameters,
    facet_counts: &RawFacetCounts,
    current_url: &str,
) -> Option<StandardFacet> {
    let media_queries: &[(&str, &str, &str)] = &[
        (schema::IMAGE_MEDIA_COUNT, params::IMAGES, "Has image media"),
        (schema::OTHER_MEDIA_COUNT, params::OTHER_MEDIA, "Has other media"),
        (schema::DOC_MEDIA_COUNT, params::DOCUMENTS, "Has document media"),
    ];
    let mut options = Vec::new();
    for (field, param, label) in media_queries {
        let facet_query = format!("{field}:[1 TO *]");
        let Some(count) = facet_counts.facet_queries.get(&facet_query) else {
            continue;
        };
        if *count == 0 {
            continue;
        }
        let url = search_link::url_replacing(request, param, "1");
        if url == current_url {
            continue;
        }
        options.push(FacetOption {
            value: "1".to_string(),
            label: label.to_string(),
            count: *count,
            url,
            entity: None,
        });
    }
    if options.is_empty() {
        return None;
    }
    Some(StandardFacet {
        field: "related-media".to_string(),
        param: String::new(),
        label: "Related media".to_string(),
        options,
    })
}

fn trim_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn date_gap_days(gap: &serde_json::Value) -> Option<i64> {
    let gap = gap.as_str()?;
    gap.strip_prefix('+')?.strip_suffix("DAYS")?.parse::<i64>().ok()
}

/// Shape the second-phase range-facet buckets into clickable options. Each
/// bucket drills down by appending a `lo..hi` range segment to the property
/// path that requested the stats field.
pub fn build_range_facets(
    request: &RequestParameters,
    composed: &ComposedQuery,
    facet_counts: &RawFacetCounts,
) -> Vec<StandardFacet> {
    let current_url = search_link::canonical_url(request);
    let mut facets = Vec::new();
    for (field, range) in &facet_counts.facet_ranges {
        let (base_field, is_date) = if let Some(base) = field.strip_suffix("_numeric") {
            (base, false)
        } else if let Some(base) = field.strip_suffix("_date") {
            (base, true)
        } else {
            continue;
        };
        let Some(key) = composed.field_keys.iter().find(|key| key.field == base_field) else {
            continue;
        };

        let mut options = Vec::new();
        for (bucket_start, count) in facet_value_counts(&range.counts) {
            if count == 0 {
                continue;
            }
            let bucket = if is_date {
                let gap = date_gap_days(&range.gap);
                let start = chrono::DateTime::parse_from_rfc3339(&bucket_start).ok();
                match (start, gap) {
                    (Some(start), Some(gap)) => {
                        let end = start + chrono::Duration::days(gap);
                        Some((start.to_rfc3339(), end.to_rfc3339()))
                    }
                    _ => None,
                }
            } else {
                let gap = range.gap.as_f64();
                let start = bucket_start.parse::<f64>().ok();
                match (start, gap) {
                    (Some(start), Some(gap)) => {
                        Some((trim_number(start), trim_number(start + gap)))
                    }
                    _ => None,
                }
            };
            let Some((lo, hi)) = bucket else {
                continue;
            };
            let url = drill_down_url(
                request,
                &key.param,
                Some((&key.raw_value, &key.delim)),
                &format!("{lo}..{hi}"),
            );
            if url == current_url {
                continue;
            }
            options.push(FacetOption {
                value: format!("{lo}..{hi}"),
                label: format!("{lo} to {hi}"),
                count,
                url,
                entity: None,
            });
        }
        if options.is_empty() {
            continue;
        }
        let predicate_slug = hierarchy::split_field(base_field)
            .map(|(slug, _)| slug)
            .unwrap_or(base_field);
        facets.push(StandardFacet {
            field: field.clone(),
            param: key.param.clone(),
            label: humanize(predicate_slug),
            options,
        });
    }
    facets
}

/// Keep only the most specific categories: an option is dropped when some
/// other offered option is its descendant in the project's authoritative
/// category tree.
pub fn most_specific_categories(
    options: Vec<FacetOption>,
    rows: &[CategoryRow],
) -> Vec<FacetOption> {
    let present: Vec<String> = options
        .iter()
        .filter_map(|option| option.entity.as_ref().map(|e| e.slug.clone()))
        .collect();

    let parent_of = |slug: &str| -> Option<&str> {
        rows.iter()
            .find(|row| row.class_slug == slug)
            .map(|row| row.parent_slug.as_str())
            .filter(|parent| !parent.is_empty())
    };

    let has_present_descendant = |slug: &str| -> bool {
        for candidate in &present {
            if candidate == slug {
                continue;
            }
            // walk ancestors of the candidate; bounded by tree depth
            let mut ancestor = parent_of(candidate);
            let mut hops = 0;
            while let Some(parent) = ancestor {
                if parent == slug {
                    return true;
                }
                hops += 1;
                if hops > 32 {
                    break;
                }
                ancestor = parent_of(parent);
            }
        }
        false
    };

    options
        .into_iter()
        .filter(|option| match option.entity.as_ref() {
            Some(entity) => !has_present_descendant(&entity.slug),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::search::compose::compose;
    use common::hierarchy::EntityDescriptor;
    use std::collections::BTreeMap;

    fn request(pairs: &[(&str, &str)]) -> RequestParameters {
        RequestParameters::from_pairs(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn counts_with_field(field: &str, flat: Vec<serde_json::Value>) -> RawFacetCounts {
        let mut facet_fields = BTreeMap::new();
        facet_fields.insert(field.to_string(), flat);
        RawFacetCounts {
            facet_fields,
            ..Default::default()
        }
    }

    #[test]
    fn options_carry_drill_down_urls() {
        let req = request(&[("path", "Turkey")]);
        let composed = compose(&req);
        let counts = counts_with_field(
            "turkey___context",
            vec![
                serde_json::json!("domuztepe___u1___id___Domuztepe"),
                serde_json::json!(41),
            ],
        );
        let facets = build_standard_facets(&req, &composed, &counts);
        let context = facets
            .iter()
            .find(|facet| facet.field == "turkey___context")
            .unwrap();
        assert_eq!(context.options.len(), 1);
        let option = &context.options[0];
        assert_eq!(option.count, 41);
        assert_eq!(option.label, "Domuztepe");
        // path drill-down appends the label to the raw path
        assert!(option.url.contains("Turkey%2FDomuztepe"));
    }

    #[test]
    fn or_filter_drills_down_from_the_literal_raw_value() {
        let req = request(&[("path", "Turkey/Domuztepe/I||II")]);
        let composed = compose(&req);
        let counts = counts_with_field(
            "i___context",
            vec![serde_json::json!("lot-5___u2___id___Lot 5"), serde_json::json!(3)],
        );
        let facets = build_standard_facets(&req, &composed, &counts);
        let option = &facets[0].options[0];
        // the OR path is replaced wholesale, not one expanded variant
        assert!(option.url.contains("Turkey%2FDomuztepe%2FI%7C%7CII%2FLot%205"));
    }

    #[test]
    fn no_op_options_are_suppressed() {
        let req = request(&[("type", "subjects")]);
        let composed = compose(&req);
        let counts = counts_with_field(
            "item_type",
            vec![
                serde_json::json!("subjects"),
                serde_json::json!(10),
                serde_json::json!("media"),
                serde_json::json!(4),
            ],
        );
        let facets = build_standard_facets(&req, &composed, &counts);
        let item_type = facets
            .iter()
            .find(|facet| facet.field == "item_type")
            .unwrap();
        // drilling into "subjects" again would be a no-op
        assert_eq!(item_type.options.len(), 1);
        assert_eq!(item_type.options[0].value, "media");
    }

    #[test]
    fn options_sorted_by_count_then_label() {
        let req = request(&[]);
        let composed = compose(&req);
        let counts = counts_with_field(
            "root___cat",
            vec![
                serde_json::json!("cat-b___u___id___B"),
                serde_json::json!(5),
                serde_json::json!("cat-a___u___id___A"),
                serde_json::json!(9),
                serde_json::json!("cat-c___u___id___C"),
                serde_json::json!(5),
            ],
        );
        let facets = build_standard_facets(&req, &composed, &counts);
        let labels: Vec<&str> = facets[0].options.iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
    }

    #[test]
    fn related_media_counts_become_options() {
        let req = request(&[]);
        let composed = compose(&req);
        let mut counts = RawFacetCounts::default();
        counts
            .facet_queries
            .insert("image_media_count:[1 TO *]".to_string(), 7);
        counts
            .facet_queries
            .insert("doc_media_count:[1 TO *]".to_string(), 0);
        let facets = build_standard_facets(&req, &composed, &counts);
        let media = facets
            .iter()
            .find(|facet| facet.field == "related-media")
            .unwrap();
        assert_eq!(media.options.len(), 1);
        assert_eq!(media.options[0].label, "Has image media");
        assert!(media.options[0].url.contains("images=1"));
    }

    #[test]
    fn range_buckets_become_clickable_options() {
        use crate::db_utils::solr_utils::RawRangeFacet;
        let req = request(&[("prop", "has-thickness")]);
        let composed = compose(&req);
        let mut counts = RawFacetCounts::default();
        counts.facet_ranges.insert(
            "has-thickness___pred_numeric".to_string(),
            RawRangeFacet {
                counts: vec![
                    serde_json::json!("0.0"),
                    serde_json::json!(3),
                    serde_json::json!("10.0"),
                    serde_json::json!(0),
                ],
                gap: serde_json::json!(10.0),
                start: serde_json::json!(0.0),
                end: serde_json::json!(20.0),
            },
        );
        let facets = build_range_facets(&req, &composed, &counts);
        assert_eq!(facets.len(), 1);
        // the zero-count bucket is dropped
        assert_eq!(facets[0].options.len(), 1);
        let option = &facets[0].options[0];
        assert_eq!(option.value, "0..10");
        assert!(option.url.contains("has-thickness---0..10"));
    }

    #[test]
    fn ancestors_yield_to_most_specific_category() {
        let rows = vec![
            CategoryRow {
                project_slug: "p".into(),
                class_slug: "cat-object".into(),
                parent_slug: String::new(),
                label: "Object".into(),
                icon: String::new(),
            },
            CategoryRow {
                project_slug: "p".into(),
                class_slug: "cat-coin".into(),
                parent_slug: "cat-object".into(),
                label: "Coin".into(),
                icon: String::new(),
            },
        ];
        let option = |slug: &str| FacetOption {
            value: slug.to_string(),
            label: humanize(slug),
            count: 1,
            url: format!("/search?cat={slug}"),
            entity: Some(EntityDescriptor {
                slug: slug.to_string(),
                uuid: String::new(),
                data_type: "id".to_string(),
                label: humanize(slug),
            }),
        };
        let kept = most_specific_categories(vec![option("cat-object"), option("cat-coin")], &rows);
        let slugs: Vec<&str> = kept.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(slugs, vec!["cat-coin"]);
    }
}
