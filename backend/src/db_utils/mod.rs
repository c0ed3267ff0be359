//! External store clients and shared response-shaping helpers.

pub mod clickhouse_utils;
pub mod response_cache;
pub mod snippets;
pub mod solr_utils;
