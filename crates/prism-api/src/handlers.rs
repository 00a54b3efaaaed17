//! Route handlers for the graph API.
//!
//! Request bodies are pulled apart by hand rather than through typed
//! extractors so that every missing or mis-typed field yields the same
//! `{error, status, execution_time}` 400 body without touching the stores.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use prism_ingest::DocumentOutcome;

use crate::error::ApiError;
use crate::state::AppState;

/// Elapsed time in the response-body format, e.g. "0.42 seconds".
pub fn format_elapsed(started: Instant) -> String {
    format!("{:.2} seconds", started.elapsed().as_secs_f64())
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateGraphResponse {
    pub message: String,
    pub photo_count: usize,
    pub status: String,
    pub execution_time: String,
    /// Per-document outcomes: partial success is reported, not hidden.
    pub outcomes: Vec<DocumentOutcome>,
    pub dropped_entities: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResponse {
    pub result: String,
    pub status: String,
    pub execution_time: String,
    pub degraded: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AddPhotoResponse {
    pub message: String,
    pub status: String,
    pub execution_time: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub graph_connected: bool,
    pub vector_store_initialized: bool,
    pub rebuild_in_progress: bool,
    pub uptime_secs: u64,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /graph/create - wipe both stores and rebuild from the given photos.
pub async fn create_graph(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<CreateGraphResponse>, ApiError> {
    let started = Instant::now();

    let photos = body
        .get("photos")
        .ok_or_else(|| ApiError::bad_request("Missing 'photos' in request body", started))?;
    let photos = photos.as_object().ok_or_else(|| {
        ApiError::bad_request(
            "Photos must be provided as an object of filename to description",
            started,
        )
    })?;

    let mut documents = BTreeMap::new();
    for (filename, description) in photos {
        let text = description.as_str().ok_or_else(|| {
            ApiError::bad_request(
                format!("Description for '{}' must be a string", filename),
                started,
            )
        })?;
        documents.insert(filename.clone(), text.to_string());
    }

    let report = state
        .pipeline
        .rebuild_all(&documents)
        .await
        .map_err(|e| ApiError::from_error(e, started))?;

    Ok(Json(CreateGraphResponse {
        message: "Knowledge graph created successfully".to_string(),
        photo_count: report.document_count,
        status: "success".to_string(),
        execution_time: format_elapsed(started),
        outcomes: report.outcomes,
        dropped_entities: report.dropped_entities,
    }))
}

/// POST /graph/search - fused dual-channel retrieval plus ranking.
pub async fn search_graph(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<SearchResponse>, ApiError> {
    let started = Instant::now();

    let query = body
        .get("query")
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::bad_request("Missing 'query' in request body", started))?;
    if query.trim().is_empty() {
        return Err(ApiError::bad_request("'query' must not be empty", started));
    }

    let answer = state
        .orchestrator
        .answer(query)
        .await
        .map_err(|e| ApiError::from_error(e, started))?;

    Ok(Json(SearchResponse {
        result: answer.result,
        status: "success".to_string(),
        execution_time: format_elapsed(started),
        degraded: answer.degraded,
        warnings: answer.warnings,
    }))
}

/// POST /graph/add-photo - incremental add without a rebuild.
pub async fn add_photo(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<AddPhotoResponse>, ApiError> {
    let started = Instant::now();

    let filename = body.get("filename").and_then(Value::as_str);
    let description = body.get("description").and_then(Value::as_str);
    let (Some(filename), Some(description)) = (filename, description) else {
        return Err(ApiError::bad_request(
            "Missing required fields: 'filename' and 'description'",
            started,
        ));
    };
    if filename.trim().is_empty() {
        return Err(ApiError::bad_request("'filename' must not be empty", started));
    }

    state
        .pipeline
        .add_one(filename, description)
        .await
        .map_err(|e| ApiError::from_error(e, started))?;

    Ok(Json(AddPhotoResponse {
        message: format!("Photo {} added successfully", filename),
        status: "success".to_string(),
        execution_time: format_elapsed(started),
    }))
}

/// GET /health - store reachability and index readiness.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        graph_connected: state.graph.connected().await,
        vector_store_initialized: state.vectors.initialized(),
        rebuild_in_progress: state.status.is_rebuilding(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
