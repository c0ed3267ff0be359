//! Shared models and pure algorithms for the record search engine.

extern crate serde;


pub mod search_query;
pub mod search_result;
pub mod search_link;
pub mod search_const;
pub mod hierarchy;
pub mod geo_tile;
pub mod chrono_tile;
