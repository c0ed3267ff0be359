//! Item repository access: the authoritative record store consulted for
//! data the index does not carry. All lookups here are batched — callers
//! gather every key they need first and issue one query per concern.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

pub fn get_clickhouse_client() -> clickhouse::Client {
    clickhouse::Client::default()
        .with_url(std::env::var("CLICKHOUSE_URL").unwrap_or("http://localhost:8123".to_string()))
        .with_user("digsite")
        .with_password("digsite")
        .with_database("Digsite_Records")
}

/// Free-text assertion values for (subject uuid, predicate uuid) pairs.
/// The index never carries string-typed values; this is the only way to get
/// them. The IN-filter is a superset (both key columns filtered separately),
/// so results are re-matched against the requested pairs client-side.
pub async fn fetch_string_assertions(
    pairs: &[(String, String)],
) -> anyhow::Result<HashMap<(String, String), Vec<String>>> {
    if pairs.is_empty() {
        return Ok(HashMap::new());
    }
    let subject_uuids: Vec<String> = pairs.iter().map(|(s, _)| s.clone()).collect();
    let predicate_uuids: Vec<String> = pairs.iter().map(|(_, p)| p.clone()).collect();

    let client = get_clickhouse_client();
    let sql = "
    SELECT subject_uuid, predicate_uuid, content
    FROM assertion_strings
    WHERE subject_uuid IN ?
      AND predicate_uuid IN ?
    ORDER BY sort_order
    ";
    let rows = client
        .query(sql)
        .bind(subject_uuids)
        .bind(predicate_uuids)
        .fetch_all::<(String, String, String)>()
        .await?;

    let wanted: HashSet<&(String, String)> = pairs.iter().collect();
    let mut result: HashMap<(String, String), Vec<String>> = HashMap::new();
    for (subject_uuid, predicate_uuid, content) in rows {
        let key = (subject_uuid, predicate_uuid);
        if !wanted.contains(&key) {
            continue;
        }
        result.entry(key).or_default().push(content);
    }
    Ok(result)
}

/// Non-point geometries by source uuid, as raw GeoJSON strings.
pub async fn fetch_geometries(uuids: &[String]) -> anyhow::Result<HashMap<String, String>> {
    if uuids.is_empty() {
        return Ok(HashMap::new());
    }
    let client = get_clickhouse_client();
    let sql = "
    SELECT uuid, geojson
    FROM item_geometries
    WHERE uuid IN ?
    ";
    let rows = client
        .query(sql)
        .bind(uuids.to_vec())
        .fetch_all::<(String, String)>()
        .await?;
    Ok(HashMap::from_iter(rows))
}

/// Labels for entity slugs that arrive bare in client filters (the index
/// value tokens carry their own labels, client paths do not).
pub async fn fetch_entity_labels(slugs: &[String]) -> anyhow::Result<HashMap<String, String>> {
    if slugs.is_empty() {
        return Ok(HashMap::new());
    }
    let client = get_clickhouse_client();
    let sql = "
    SELECT slug, label
    FROM entities
    WHERE slug IN ?
    ";
    let rows = client
        .query(sql)
        .bind(slugs.to_vec())
        .fetch_all::<(String, String)>()
        .await?;
    Ok(HashMap::from_iter(rows))
}

/// One row of a project's authoritative category tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, clickhouse::Row)]
pub struct CategoryRow {
    pub project_slug: String,
    pub class_slug: String,
    pub parent_slug: String,
    pub label: String,
    pub icon: String,
}

/// The category trees of the given projects, used to cross-reference index
/// category facets (most-specific-match rule) and to decorate records with
/// icons.
pub async fn fetch_project_categories(
    project_slugs: &[String],
) -> anyhow::Result<Vec<CategoryRow>> {
    if project_slugs.is_empty() {
        return Ok(Vec::new());
    }
    let client = get_clickhouse_client();
    let sql = "
    SELECT project_slug, class_slug, parent_slug, label, icon
    FROM project_categories
    WHERE project_slug IN ?
    ";
    let rows = client
        .query(sql)
        .bind(project_slugs.to_vec())
        .fetch_all::<CategoryRow>()
        .await?;
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, clickhouse::Row)]
pub struct ProjectInfo {
    pub slug: String,
    pub label: String,
    pub description: String,
    pub banner_uri: String,
    pub item_count: u64,
}

/// Published projects with description/banner metadata and child counts.
pub async fn list_projects() -> anyhow::Result<Vec<ProjectInfo>> {
    let client = get_clickhouse_client();
    let rows = client
        .query(
            "
    SELECT slug, label, description, banner_uri, item_count
    FROM projects
    ORDER BY label
    ",
        )
        .fetch_all::<ProjectInfo>()
        .await?;
    Ok(rows)
}
