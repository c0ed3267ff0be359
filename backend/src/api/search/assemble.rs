//! Result assembly: index documents into client record view models.
//!
//! The index stores attribute trees flattened into dynamic fields:
//! `{subject}___pred_id` lists the nodes one level below `subject` (the
//! record's predicates at the root, a value's sub-predicates deeper down),
//! and `{predicate}___pred_id` / `_numeric` / `_date` hold that predicate's
//! values. String-typed values are never indexed; they resolve through a
//! batched item-repository lookup keyed by (record uuid, predicate uuid),
//! and only when the client asked for attribute data at all.

use std::collections::HashMap;

use serde_json::Value;
use tracing::warn;

use common::hierarchy::{self, EntityDescriptor};
use common::search_const::{self, params};
use common::search_query::RequestParameters;
use common::search_result::{AttributeValue, RecordAttribute, RecordGeometry, ResultRecord};

use crate::api::search::compose::schema;
use crate::db_utils::clickhouse_utils::CategoryRow;
use crate::db_utils::snippets::decompose_snippet;
use crate::db_utils::solr_utils::RawSolrResponse;

type Doc = serde_json::Map<String, Value>;

/// Which attributes the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeSelection {
    None,
    All,
    Slugs(Vec<String>),
}

impl AttributeSelection {
    pub fn from_request(request: &RequestParameters) -> Self {
        match request.first(params::ATTRIBUTES) {
            None => AttributeSelection::None,
            Some("all") | Some("ALL") => AttributeSelection::All,
            Some(spec) => {
                let slugs: Vec<String> = spec
                    .split(',')
                    .map(|slug| hierarchy::path_to_slug(slug))
                    .filter(|slug| !slug.is_empty())
                    .collect();
                if slugs.is_empty() {
                    AttributeSelection::None
                } else {
                    AttributeSelection::Slugs(slugs)
                }
            }
        }
    }

    fn wants(&self, slug: &str) -> bool {
        match self {
            AttributeSelection::None => false,
            AttributeSelection::All => true,
            AttributeSelection::Slugs(slugs) => slugs.iter().any(|s| s == slug),
        }
    }

    pub fn wants_any(&self) -> bool {
        !matches!(self, AttributeSelection::None)
    }
}

/// Records plus the batched lookups they still need.
#[derive(Debug, Default)]
pub struct AssembledBatch {
    pub records: Vec<ResultRecord>,
    /// (record uuid, predicate uuid) pairs wanting string values.
    pub string_needs: Vec<(String, String)>,
    /// (record uuid, geometry source uuid) pairs wanting non-point shapes.
    pub geometry_needs: Vec<(String, String)>,
}

fn doc_str<'a>(doc: &'a Doc, key: &str) -> Option<&'a str> {
    doc.get(key).and_then(|value| value.as_str())
}

fn doc_f64(doc: &Doc, key: &str) -> Option<f64> {
    doc.get(key).and_then(|value| value.as_f64())
}

/// Multi-valued fields arrive as arrays, single-valued as scalars.
fn doc_str_list(doc: &Doc, key: &str) -> Vec<String> {
    match doc.get(key) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(|s| s.to_string())
            .collect(),
        _ => Vec::new(),
    }
}

fn doc_num_list(doc: &Doc, key: &str) -> Vec<f64> {
    match doc.get(key) {
        Some(Value::Number(n)) => n.as_f64().into_iter().collect(),
        Some(Value::Array(items)) => items.iter().filter_map(|item| item.as_f64()).collect(),
        _ => Vec::new(),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Values of one predicate, recursing into entity values that have deeper
/// children of their own.
fn build_values(
    doc: &Doc,
    predicate: &EntityDescriptor,
    depth: usize,
    record_uuid: &str,
    string_needs: &mut Vec<(String, String)>,
) -> Vec<AttributeValue> {
    if depth >= search_const::MAX_ATTRIBUTE_DEPTH {
        return Vec::new();
    }
    let mut values = Vec::new();
    let id_field = format!("{}___pred_id", predicate.slug);
    for token in doc_str_list(doc, &id_field) {
        let entity = hierarchy::decode_entity_token(&token);
        let attributes = build_attributes_at(doc, &entity.slug, depth + 1, record_uuid, string_needs);
        values.push(AttributeValue::Entity { entity, attributes });
    }
    for number in doc_num_list(doc, &format!("{}___pred_numeric", predicate.slug)) {
        values.push(AttributeValue::Literal {
            value: format_number(number),
        });
    }
    for date in doc_str_list(doc, &format!("{}___pred_date", predicate.slug)) {
        values.push(AttributeValue::Literal { value: date });
    }
    if values.is_empty() && predicate.is_string_typed() && !predicate.uuid.is_empty() {
        // string values live in the item repository, fetched in one batch
        string_needs.push((record_uuid.to_string(), predicate.uuid.clone()));
    }
    values
}

/// Predicates attached under `subject_slug`, depth-guarded against cyclic
/// slug references.
fn build_attributes_at(
    doc: &Doc,
    subject_slug: &str,
    depth: usize,
    record_uuid: &str,
    string_needs: &mut Vec<(String, String)>,
) -> Vec<RecordAttribute> {
    if depth >= search_const::MAX_ATTRIBUTE_DEPTH {
        return Vec::new();
    }
    let list_field = format!("{subject_slug}___pred_id");
    let mut attributes = Vec::new();
    for token in doc_str_list(doc, &list_field) {
        let predicate = hierarchy::decode_entity_token(&token);
        let values = build_values(doc, &predicate, depth + 1, record_uuid, string_needs);
        attributes.push(RecordAttribute { predicate, values });
    }
    attributes
}

/// Root attributes, honoring the client's selection before any values are
/// built so unselected string predicates never become repository lookups.
fn build_root_attributes(
    doc: &Doc,
    record_uuid: &str,
    selection: &AttributeSelection,
    string_needs: &mut Vec<(String, String)>,
) -> Vec<RecordAttribute> {
    let list_field = format!("{}___pred_id", hierarchy::ROOT_PARENT);
    let mut attributes = Vec::new();
    for token in doc_str_list(doc, &list_field) {
        let predicate = hierarchy::decode_entity_token(&token);
        if !selection.wants(&predicate.slug) {
            continue;
        }
        let values = build_values(doc, &predicate, 1, record_uuid, string_needs);
        attributes.push(RecordAttribute { predicate, values });
    }
    attributes
}

fn leaf_text(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Literal { value } => value.clone(),
        AttributeValue::Entity { entity, .. } => entity.label.clone(),
    }
}

/// Multi-value lists into one delimited string per attribute; nested
/// structure is discarded.
fn flatten_attributes(attributes: &mut Vec<RecordAttribute>) {
    for attribute in attributes.iter_mut() {
        let joined = attribute
            .values
            .iter()
            .map(leaf_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("; ");
        attribute.values = vec![AttributeValue::Literal { value: joined }];
    }
}

fn record_geometry(
    doc: &Doc,
    uuid: &str,
    geometry_needs: &mut Vec<(String, String)>,
) -> Option<RecordGeometry> {
    let geometry_type = doc_str(doc, schema::GEOMETRY_TYPE).unwrap_or("point");
    if geometry_type != "point" {
        // indirection: the shape may live on the record or a containing item
        let source = doc_str(doc, schema::GEOMETRY_SOURCE).unwrap_or(uuid);
        geometry_needs.push((uuid.to_string(), source.to_string()));
    }
    let latitude = doc_f64(doc, schema::LATITUDE)?;
    let longitude = doc_f64(doc, schema::LONGITUDE)?;
    Some(RecordGeometry::Point {
        latitude,
        longitude,
    })
}

pub fn assemble_records(request: &RequestParameters, raw: &RawSolrResponse) -> AssembledBatch {
    let selection = AttributeSelection::from_request(request);
    let flatten = request.has(params::FLATTEN_ATTRIBUTES);
    let nested = request.has(params::NESTED_ATTRIBUTES);
    if flatten && nested {
        warn!("flatten-attributes and nested-attributes are mutually exclusive; flattening");
    }

    let mut batch = AssembledBatch::default();
    for doc in &raw.response.docs {
        let Some(uuid) = doc_str(doc, schema::UUID) else {
            continue;
        };
        let uuid = uuid.to_string();
        let item_type = doc_str(doc, schema::ITEM_TYPE).unwrap_or("subjects").to_string();
        let uri = doc_str(doc, schema::URI)
            .map(|uri| uri.to_string())
            .unwrap_or_else(|| format!("/{item_type}/{uuid}"));

        let mut attributes = Vec::new();
        if selection.wants_any() {
            attributes = build_root_attributes(doc, &uuid, &selection, &mut batch.string_needs);
            if flatten {
                flatten_attributes(&mut attributes);
            }
        }

        let snippet = raw
            .highlighting
            .as_ref()
            .and_then(|highlights| highlights.get(&uuid))
            .and_then(|fields| fields.get(schema::TEXT))
            .and_then(|snippets| snippets.first())
            .map(|snippet| decompose_snippet(snippet))
            .unwrap_or_default();

        let record = ResultRecord {
            uri,
            slug: doc_str(doc, schema::SLUG).unwrap_or_default().to_string(),
            label: doc_str(doc, schema::LABEL).unwrap_or_default().to_string(),
            item_type,
            category: doc_str(doc, schema::ITEM_CLASS)
                .map(hierarchy::decode_entity_token),
            category_icon: None,
            context: doc_str_list(doc, schema::CONTEXT_PATH),
            project: doc_str_list(doc, schema::PROJECT_PATH),
            geometry: record_geometry(doc, &uuid, &mut batch.geometry_needs),
            earliest: doc_f64(doc, schema::EARLIEST),
            latest: doc_f64(doc, schema::LATEST),
            snippet,
            attributes,
            uuid,
        };
        batch.records.push(record);
    }
    batch
}

/// Splice batched string-assertion values into their waiting attributes.
pub fn apply_string_values(
    records: &mut [ResultRecord],
    values: &HashMap<(String, String), Vec<String>>,
) {
    for record in records.iter_mut() {
        let uuid = record.uuid.clone();
        apply_string_values_to(&mut record.attributes, &uuid, values);
    }
}

fn apply_string_values_to(
    attributes: &mut [RecordAttribute],
    record_uuid: &str,
    values: &HashMap<(String, String), Vec<String>>,
) {
    for attribute in attributes.iter_mut() {
        if attribute.values.is_empty() && attribute.predicate.is_string_typed() {
            let key = (record_uuid.to_string(), attribute.predicate.uuid.clone());
            if let Some(found) = values.get(&key) {
                attribute.values = found
                    .iter()
                    .map(|value| AttributeValue::Literal {
                        value: value.clone(),
                    })
                    .collect();
            }
        }
        for value in attribute.values.iter_mut() {
            if let AttributeValue::Entity { attributes, .. } = value {
                apply_string_values_to(attributes, record_uuid, values);
            }
        }
    }
}

/// Replace point geometries with repository shapes where one was found.
/// Records whose lookup failed keep whatever they had.
pub fn apply_geometries(
    records: &mut [ResultRecord],
    needs: &[(String, String)],
    shapes: &HashMap<String, String>,
) {
    for (record_uuid, source_uuid) in needs {
        let Some(geojson) = shapes.get(source_uuid) else {
            continue;
        };
        for record in records.iter_mut() {
            if &record.uuid == record_uuid {
                record.geometry = Some(RecordGeometry::GeoJson {
                    geojson: geojson.clone(),
                });
            }
        }
    }
}

/// Decorate record categories with icons from the authoritative class rows.
pub fn apply_category_icons(records: &mut [ResultRecord], rows: &[CategoryRow]) {
    for record in records.iter_mut() {
        let Some(category) = record.category.as_ref() else {
            continue;
        };
        let icon = rows
            .iter()
            .find(|row| row.class_slug == category.slug && !row.icon.is_empty())
            .map(|row| row.icon.clone());
        if icon.is_some() {
            record.category_icon = icon;
        }
    }
}
