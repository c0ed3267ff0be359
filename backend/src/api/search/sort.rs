//! Sort-spec parsing and the active/available sort blocks.

use common::search_const::params;
use common::search_link;
use common::search_query::RequestParameters;
use common::search_result::{SortBlock, SortOption};

/// Client sort keys and the index fields behind them.
pub const SORT_FIELDS: &[(&str, &str, &str)] = &[
    ("interest", "Interest", "interest_score"),
    ("item", "Item", "sort_label"),
    ("published", "Published", "published"),
    ("updated", "Updated", "updated"),
];

/// Parse a `key--direction` sort spec (comma-separated for multi-key sorts)
/// into (index field, direction) clauses. Unknown keys and directions are
/// dropped silently.
pub fn parse_sort_spec(spec: Option<&str>) -> Vec<(String, String)> {
    let Some(spec) = spec else {
        return Vec::new();
    };
    let mut clauses = Vec::new();
    for piece in spec.split(',') {
        let piece = piece.trim();
        let (key, direction) = piece.split_once("--").unwrap_or((piece, "desc"));
        let direction = match direction {
            "asc" | "desc" => direction,
            _ => continue,
        };
        let Some((_, _, field)) = SORT_FIELDS.iter().find(|(k, _, _)| *k == key) else {
            continue;
        };
        clauses.push((field.to_string(), direction.to_string()));
    }
    clauses
}

/// Build the active-sort and available-sort blocks for a response.
pub fn build_sort_block(request: &RequestParameters) -> SortBlock {
    let spec = request.first(params::SORT).unwrap_or("");
    let active_keys: Vec<(&str, &str)> = spec
        .split(',')
        .filter_map(|piece| {
            let piece = piece.trim();
            let (key, direction) = piece.split_once("--").unwrap_or((piece, "desc"));
            SORT_FIELDS
                .iter()
                .find(|(k, _, _)| *k == key)
                .map(|(k, _, _)| (*k, direction))
        })
        .collect();

    let mut block = SortBlock::default();
    for (key, label, _) in SORT_FIELDS {
        let active = active_keys.iter().find(|(k, _)| k == key);
        // the offered link toggles direction when the sort is already active
        let next_direction = match active {
            Some((_, "desc")) => "asc",
            _ => "desc",
        };
        let option = SortOption {
            key: key.to_string(),
            label: label.to_string(),
            direction: next_direction.to_string(),
            url: search_link::url_replacing(
                request,
                params::SORT,
                &format!("{key}--{next_direction}"),
            ),
        };
        if let Some((_, direction)) = active {
            block.active.push(SortOption {
                direction: direction.to_string(),
                url: search_link::canonical_url(request),
                ..option.clone()
            });
        }
        block.available.push(option);
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_key_and_direction() {
        assert_eq!(
            parse_sort_spec(Some("published--asc")),
            vec![("published".to_string(), "asc".to_string())]
        );
    }

    #[test]
    fn bare_key_defaults_to_desc() {
        assert_eq!(
            parse_sort_spec(Some("interest")),
            vec![("interest_score".to_string(), "desc".to_string())]
        );
    }

    #[test]
    fn unknown_keys_dropped() {
        assert!(parse_sort_spec(Some("bogus--asc")).is_empty());
        assert!(parse_sort_spec(Some("item--sideways")).is_empty());
        assert!(parse_sort_spec(None).is_empty());
    }

    #[test]
    fn active_sort_offers_direction_toggle() {
        let request = RequestParameters::from_pairs(vec![(
            "sort".to_string(),
            "published--desc".to_string(),
        )]);
        let block = build_sort_block(&request);
        assert_eq!(block.active.len(), 1);
        assert_eq!(block.active[0].key, "published");
        let published = block
            .available
            .iter()
            .find(|option| option.key == "published")
            .unwrap();
        assert_eq!(published.direction, "asc");
        assert!(published.url.contains("published--asc"));
    }
}
