//! API route handlers and module exports.

pub mod projects;
pub mod search;

use std::sync::Arc;

use axum::Json;
use axum::extract::{RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tracing::error;

use common::search_const::params;
use common::search_link::parse_query_string;

use crate::api::search::SearchEngine;

pub fn router(engine: Arc<SearchEngine>) -> axum::Router {
    axum::Router::new()
        .route("/search", get(search_handler))
        .route("/search/uuids", get(search_uuids_handler))
        .route("/projects", get(projects_handler))
        .with_state(engine)
}

async fn search_handler(
    State(engine): State<Arc<SearchEngine>>,
    RawQuery(query): RawQuery,
) -> Response {
    let request = parse_query_string(query.as_deref().unwrap_or(""));
    match engine.run_search(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            error!("search failed: {}", err);
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

async fn search_uuids_handler(
    State(engine): State<Arc<SearchEngine>>,
    RawQuery(query): RawQuery,
) -> Response {
    let mut request = parse_query_string(query.as_deref().unwrap_or(""));
    request.set(params::RESPONSE, "uuid,uri");
    match engine.run_search(request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            error!("uuid listing failed: {}", err);
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}

async fn projects_handler() -> Response {
    match projects::list_projects().await {
        Ok(projects) => Json(projects).into_response(),
        Err(err) => {
            error!("project listing failed: {}", err);
            (StatusCode::BAD_GATEWAY, err.to_string()).into_response()
        }
    }
}
