use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::api::health::{HealthResponse, HealthState};
use crate::db::SnapshotStore;
use crate::error::AppError;
use crate::history::history;
use crate::ingest::run_ingestion;
use crate::provider::ProviderGateway;
use crate::ranker::rank;
use crate::types::{IngestionCounters, Mover, OfferHistory, SortMode, WindowDays};

#[derive(Clone)]
pub struct ApiState {
    pub store: SnapshotStore,
    pub gateway: Arc<ProviderGateway>,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/fetch-and-snapshot", post(fetch_and_snapshot))
        .route("/api/top-movers", get(get_top_movers))
        .route("/api/offer/:offer_id/history", get(get_offer_history))
        .route("/api/health", get(get_health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

/// `Query` whose rejections render as the API's JSON error body.
#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);

#[derive(Deserialize)]
pub struct TopMoversQuery {
    pub window: Option<u32>,
    #[serde(rename = "sortMode")]
    pub sort_mode: Option<String>,
    pub search: Option<String>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub window: Option<u32>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn fetch_and_snapshot(
    State(state): State<ApiState>,
) -> Result<Json<IngestionCounters>, AppError> {
    let today = Utc::now().date_naive();
    let counters = run_ingestion(&state.gateway, &state.store, today).await?;
    state.health.record_ingestion(Utc::now(), counters);
    Ok(Json(counters))
}

async fn get_top_movers(
    State(state): State<ApiState>,
    ApiQuery(params): ApiQuery<TopMoversQuery>,
) -> Result<Json<Vec<Mover>>, AppError> {
    let window = WindowDays::for_movers(params.window)?;
    let sort_mode = params
        .sort_mode
        .as_deref()
        .map(str::parse::<SortMode>)
        .transpose()?
        .unwrap_or_default();
    let today = Utc::now().date_naive();

    let movers = rank(&state.store, window, sort_mode, params.search.as_deref(), today).await?;
    Ok(Json(movers))
}

async fn get_offer_history(
    State(state): State<ApiState>,
    Path(offer_id): Path<String>,
    ApiQuery(params): ApiQuery<HistoryQuery>,
) -> Result<Json<OfferHistory>, AppError> {
    let window = WindowDays::for_history(params.window)?;
    let today = Utc::now().date_naive();
    Ok(Json(history(&state.store, &offer_id, window, today).await?))
}

async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(state.health.snapshot())
}
