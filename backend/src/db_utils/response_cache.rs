//! Injected caches for the search pipeline.
//!
//! Both the response cache (canonical URL -> rendered response) and the
//! entity-label cache sit behind the same small get/set/clear interface,
//! owned by whoever builds the pipeline. Nothing here is process-global,
//! and a failing cache write never fails a request.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db_utils::clickhouse_utils::get_clickhouse_client;

#[async_trait]
pub trait SearchCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str);
    async fn clear(&self);
}

/// Response cache backed by a ClickHouse table, keyed by the sha256 of the
/// canonical request URL.
pub struct ClickhouseCache {
    pub table: String,
}

impl ClickhouseCache {
    pub fn new(table: impl Into<String>) -> Self {
        ClickhouseCache { table: table.into() }
    }
}

#[async_trait]
impl SearchCache for ClickhouseCache {
    async fn get(&self, key: &str) -> Option<String> {
        let key_hash = sha256::digest(key);
        let client = get_clickhouse_client();
        let sql = "
        SELECT result_json
        FROM ?
        WHERE key_hash = ?
        ORDER BY date_created DESC
        LIMIT 1
        ";
        let rows = client
            .query(sql)
            .bind(clickhouse::sql::Identifier(&self.table))
            .bind(key_hash.clone())
            .fetch_all::<String>()
            .await;
        match rows {
            Ok(rows) => {
                let hit = rows.into_iter().next();
                if hit.is_some() {
                    debug!("cache hit: {}", key_hash);
                }
                hit
            }
            Err(err) => {
                warn!("cache read failed: {}", err);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str) {
        let key_hash = sha256::digest(key);
        let client = get_clickhouse_client();
        let sql = "
        INSERT INTO ? (key_hash, cache_key, result_json)
        VALUES (?, ?, ?)
        ";
        let written = client
            .query(sql)
            .bind(clickhouse::sql::Identifier(&self.table))
            .bind(key_hash.clone())
            .bind(key.to_string())
            .bind(value.to_string())
            .execute()
            .await;
        match written {
            Ok(()) => debug!("cache inserted: {}", key_hash),
            Err(err) => warn!("cache insert failed: {} ({})", key_hash, err),
        }
    }

    async fn clear(&self) {
        let client = get_clickhouse_client();
        let cleared = client
            .query("TRUNCATE TABLE ?")
            .bind(clickhouse::sql::Identifier(&self.table))
            .execute()
            .await;
        if let Err(err) = cleared {
            warn!("cache clear failed: {}", err);
        }
    }
}

/// In-memory cache for tests and for per-process entity label memoization.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

#[async_trait]
impl SearchCache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    async fn set(&self, key: &str, value: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value.to_string());
        }
    }

    async fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}
