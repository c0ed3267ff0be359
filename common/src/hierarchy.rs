//! Hierarchy path encoding between client paths and index field/value tokens.
//!
//! Client filters arrive as delimited paths (`Turkey/Domuztepe/I||II`,
//! `has-taxon---ovis-aries`). Each level may carry OR-alternatives. The index
//! stores one dynamic field per hierarchy level, named after the parent
//! entity's slug, so a path turns into a field name plus a value token.

use serde::{Deserialize, Serialize};

use crate::search_const::FIELD_SEP;

/// Parent slug used for the top level of every hierarchy.
pub const ROOT_PARENT: &str = "root";

/// Expand a delimited path into its OR variants.
///
/// Each OR segment produces one variant per alternative, holding every other
/// segment fixed and unexpanded. A path with a single OR segment therefore
/// expands to one variant per alternative; a path without OR comes back as a
/// single variant equal to its segment list. Empty segments are dropped
/// silently; this never fails.
pub fn expand_path(path: &str, hier_delim: &str, or_delim: &str) -> Vec<Vec<String>> {
    let segments: Vec<&str> = path
        .split(hier_delim)
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.is_empty() {
        return Vec::new();
    }

    let mut variants: Vec<Vec<String>> = Vec::new();
    for (position, segment) in segments.iter().enumerate() {
        let alternatives: Vec<&str> = segment
            .split(or_delim)
            .filter(|alt| !alt.is_empty())
            .collect();
        if alternatives.len() < 2 {
            continue;
        }
        for alternative in alternatives {
            let mut variant: Vec<String> =
                segments.iter().map(|segment| segment.to_string()).collect();
            variant[position] = alternative.to_string();
            variants.push(variant);
        }
    }

    if variants.is_empty() {
        // no OR anywhere: the path is its own single variant
        let mut variant = Vec::new();
        for segment in segments {
            let alternatives: Vec<&str> = segment
                .split(or_delim)
                .filter(|alt| !alt.is_empty())
                .collect();
            match alternatives.first() {
                Some(alt) => variant.push(alt.to_string()),
                None => continue,
            }
        }
        if variant.is_empty() {
            return Vec::new();
        }
        return vec![variant];
    }
    variants
}

/// Normalize a path segment or label into an index slug.
pub fn path_to_slug(segment: &str) -> String {
    let mut slug = String::with_capacity(segment.len());
    let mut last_dash = false;
    for c in segment.trim().chars() {
        let mapped = if c.is_whitespace() || c == '_' || c == '/' {
            '-'
        } else {
            c.to_ascii_lowercase()
        };
        if mapped == '-' {
            if last_dash {
                continue;
            }
            last_dash = true;
        } else {
            last_dash = false;
        }
        slug.push(mapped);
    }
    slug.trim_matches('-').to_string()
}

/// Index field name for children of `parent` under a given suffix
/// (`None` parent means the hierarchy root).
pub fn field_name(parent: Option<&str>, suffix: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}{FIELD_SEP}{suffix}"),
        _ => format!("{ROOT_PARENT}{FIELD_SEP}{suffix}"),
    }
}

/// Split an index field name back into (parent slug, suffix).
pub fn split_field(field: &str) -> Option<(&str, &str)> {
    field.split_once(FIELD_SEP)
}

/// A decoded index value token: the entity behind one facet value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    pub slug: String,
    pub uuid: String,
    pub data_type: String,
    pub label: String,
}

impl EntityDescriptor {
    pub fn is_entity(&self) -> bool {
        self.data_type == "id"
    }

    /// String-typed values are not carried by the index and need a
    /// repository lookup.
    pub fn is_string_typed(&self) -> bool {
        self.data_type == "xsd:string"
    }
}

/// Decode a packed index value token `slug___uuid___type___label`.
///
/// Tokens that do not follow the packed layout come back as plain literals
/// with an empty uuid, never as an error.
pub fn decode_entity_token(token: &str) -> EntityDescriptor {
    let parts: Vec<&str> = token.splitn(4, FIELD_SEP).collect();
    if parts.len() == 4 {
        return EntityDescriptor {
            slug: parts[0].to_string(),
            uuid: parts[1].to_string(),
            data_type: parts[2].to_string(),
            label: parts[3].to_string(),
        };
    }
    EntityDescriptor {
        slug: path_to_slug(token),
        uuid: String::new(),
        data_type: "literal".to_string(),
        label: token.to_string(),
    }
}

/// Pack an entity back into its index value token.
pub fn encode_entity_token(entity: &EntityDescriptor) -> String {
    format!(
        "{}{FIELD_SEP}{}{FIELD_SEP}{}{FIELD_SEP}{}",
        entity.slug, entity.uuid, entity.data_type, entity.label
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search_const::{HIERARCHY_DELIM, OR_DELIM};

    #[test]
    fn plain_path_is_single_variant() {
        let variants = expand_path("has-taxon---ovis", HIERARCHY_DELIM, OR_DELIM);
        assert_eq!(variants, vec![vec!["has-taxon".to_string(), "ovis".to_string()]]);
    }

    #[test]
    fn no_delimiter_is_one_element_list() {
        let variants = expand_path("ceramics", HIERARCHY_DELIM, OR_DELIM);
        assert_eq!(variants, vec![vec!["ceramics".to_string()]]);
    }

    #[test]
    fn or_expands_in_place() {
        let variants = expand_path("a||b---c", HIERARCHY_DELIM, OR_DELIM);
        assert_eq!(
            variants,
            vec![
                vec!["a".to_string(), "c".to_string()],
                vec!["b".to_string(), "c".to_string()],
            ]
        );
    }

    #[test]
    fn trailing_or_expands_with_shared_prefix() {
        let variants = expand_path("Turkey/Domuztepe/I||II", "/", OR_DELIM);
        assert_eq!(
            variants,
            vec![
                vec!["Turkey".to_string(), "Domuztepe".to_string(), "I".to_string()],
                vec!["Turkey".to_string(), "Domuztepe".to_string(), "II".to_string()],
            ]
        );
    }

    #[test]
    fn two_or_segments_do_not_cross_multiply() {
        let variants = expand_path("a||b---c||d", HIERARCHY_DELIM, OR_DELIM);
        // one expanded segment per variant, the other held unexpanded
        assert_eq!(
            variants,
            vec![
                vec!["a".to_string(), "c||d".to_string()],
                vec!["b".to_string(), "c||d".to_string()],
                vec!["a||b".to_string(), "c".to_string()],
                vec!["a||b".to_string(), "d".to_string()],
            ]
        );
    }

    #[test]
    fn empty_segments_dropped_silently() {
        let variants = expand_path("------a---", HIERARCHY_DELIM, OR_DELIM);
        assert_eq!(variants, vec![vec!["a".to_string()]]);
        assert!(expand_path("", HIERARCHY_DELIM, OR_DELIM).is_empty());
    }

    #[test]
    fn single_alternative_round_trips() {
        let path = "oc-gen---cat-coin";
        let variants = expand_path(path, HIERARCHY_DELIM, OR_DELIM);
        assert_eq!(variants[0].join(HIERARCHY_DELIM), path);
    }

    #[test]
    fn slugs_normalize() {
        assert_eq!(path_to_slug("  Domuztepe Hoyuk "), "domuztepe-hoyuk");
        assert_eq!(path_to_slug("oc_gen/cat"), "oc-gen-cat");
    }

    #[test]
    fn field_names() {
        assert_eq!(field_name(None, "context"), "root___context");
        assert_eq!(field_name(Some("domuztepe"), "context"), "domuztepe___context");
        assert_eq!(split_field("domuztepe___context"), Some(("domuztepe", "context")));
    }

    #[test]
    fn entity_tokens_round_trip() {
        let token = "has-taxon___9d8c54f2___id___Has taxon";
        let entity = decode_entity_token(token);
        assert_eq!(entity.label, "Has taxon");
        assert!(entity.is_entity());
        assert_eq!(encode_entity_token(&entity), token);
    }

    #[test]
    fn unpacked_token_is_literal() {
        let entity = decode_entity_token("Iron Age");
        assert_eq!(entity.data_type, "literal");
        assert_eq!(entity.label, "Iron Age");
        assert_eq!(entity.slug, "iron-age");
    }
}
