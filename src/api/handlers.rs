//! Route handlers.

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::ApiError;
use super::AppState;
use crate::responder;
use crate::roster::Employee;
use crate::search::ScoredEmployee;

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub text: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Query string of the `/employees/search` and `/employees/matches` routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub query: String,
    pub k: Option<usize>,
    pub min_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub employees: usize,
    pub embedder: String,
    pub index: String,
    pub uptime: u64,
}

pub async fn chat(
    State(state): State<AppState>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    metrics::counter!("staffing_requests_total", "endpoint" => "chat").increment(1);

    let matches = state.engine.retrieve(&req.text, req.k, req.min_score).await?;
    info!(returned = matches.len(), "Chat query answered");

    Ok(Json(ChatResponse {
        response: responder::format(&matches, &req.text),
    }))
}

pub async fn search_employees(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<Employee>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    metrics::counter!("staffing_requests_total", "endpoint" => "search").increment(1);

    let matches = state
        .engine
        .retrieve(&params.query, params.k, params.min_score)
        .await?;
    debug!(returned = matches.len(), "Search answered");
    Ok(Json(matches))
}

pub async fn match_employees(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<ScoredEmployee>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    metrics::counter!("staffing_requests_total", "endpoint" => "matches").increment(1);

    let matches = state
        .engine
        .retrieve_scored(&params.query, params.k, params.min_score)
        .await?;
    Ok(Json(matches))
}

pub async fn list_employees(State(state): State<AppState>) -> Json<Vec<Employee>> {
    Json(state.engine.roster().employees().to_vec())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        employees: state.engine.roster().len(),
        embedder: state.engine.embedder_name().to_string(),
        index: state.engine.index_name().to_string(),
        uptime: state.start_time.elapsed().as_secs(),
    })
}

pub async fn render_metrics(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .metrics
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("metrics recorder is not installed".into()))?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        handle.render(),
    ))
}
