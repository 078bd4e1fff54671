//! HTTP request handlers
//!
//! Thin wrappers over [`FusionEngine`](crate::fusion::FusionEngine); all
//! decisions are made by the engine.

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::fusion::{EngineStats, ObservationSnapshot, RoomHistory, Submission};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use emofuse_common::params::{FusionConfig, FusionConfigPatch, TemporalConfig, TemporalConfigPatch};
use emofuse_common::{Channel, FusionResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ObservationRequest {
    pub room: String,
    pub channel: Channel,
    /// Classifier label; synonyms and unknown labels are normalized
    pub emotion: String,
    pub confidence: f64,
    #[serde(default)]
    pub distribution: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
pub struct RoomQuery {
    pub room: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoomResetResponse {
    pub status: String,
    pub room: String,
    pub existed: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetAllResponse {
    pub status: String,
    pub rooms_cleared: usize,
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

fn parse_channel(channel: &str) -> ApiResult<Channel> {
    Channel::ALL
        .into_iter()
        .find(|c| c.as_str().eq_ignore_ascii_case(channel))
        .ok_or_else(|| ApiError::BadRequest(format!("unknown channel '{}'", channel)))
}

// ============================================================================
// Observation Endpoints
// ============================================================================

/// POST /observations - Submit one classifier output
pub async fn submit_observation(
    State(state): State<AppState>,
    payload: Result<Json<ObservationRequest>, JsonRejection>,
) -> ApiResult<Json<Submission>> {
    let req = json_body(payload)?;
    let submission = state
        .engine
        .submit_observation(&req.room, req.channel, &req.emotion, req.confidence, req.distribution)
        .await?;
    Ok(Json(submission))
}

/// GET /rooms/:room/latest/:channel - Newest fresh observation of a channel
pub async fn latest_observation(
    State(state): State<AppState>,
    Path((room, channel)): Path<(String, String)>,
) -> ApiResult<Json<ObservationSnapshot>> {
    let channel = parse_channel(&channel)?;
    state
        .engine
        .latest(&room, channel)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no fresh {} observation in room {}", channel, room)))
}

// ============================================================================
// Fusion Endpoints
// ============================================================================

/// POST /rooms/:room/fuse - Run a fusion now
pub async fn fuse(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Json<FusionResult> {
    Json(state.engine.fuse(&room).await)
}

/// GET /rooms/:room/history - Accepted decisions, oldest first
pub async fn history(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Json<RoomHistory> {
    Json(state.engine.history(&room).await)
}

/// GET /stats - Engine-wide stats, or one room's with `?room=`
pub async fn stats(
    State(state): State<AppState>,
    Query(query): Query<RoomQuery>,
) -> Json<EngineStats> {
    Json(state.engine.stats(query.room.as_deref()).await)
}

// ============================================================================
// Room Lifecycle Endpoints
// ============================================================================

/// POST /rooms/:room/reset - Forget one room
pub async fn reset_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Json<RoomResetResponse> {
    let existed = state.engine.reset_room(&room).await;
    Json(RoomResetResponse {
        status: "ok".to_string(),
        room,
        existed,
    })
}

/// POST /rooms/reset - Forget every room
pub async fn reset_all(State(state): State<AppState>) -> Json<ResetAllResponse> {
    let rooms_cleared = state.engine.reset_all().await;
    Json(ResetAllResponse {
        status: "ok".to_string(),
        rooms_cleared,
    })
}

// ============================================================================
// Parameter Endpoints
// ============================================================================

/// GET /config - Active weighting parameters
pub async fn get_config(State(state): State<AppState>) -> Json<FusionConfig> {
    Json(state.engine.config().await)
}

/// POST /config - Patch weighting parameters
pub async fn update_config(
    State(state): State<AppState>,
    payload: Result<Json<FusionConfigPatch>, JsonRejection>,
) -> ApiResult<Json<FusionConfig>> {
    let patch = json_body(payload)?;
    Ok(Json(state.engine.update_config(&patch).await?))
}

/// GET /temporal-config - Active smoothing and persistence parameters
pub async fn get_temporal_config(State(state): State<AppState>) -> Json<TemporalConfig> {
    Json(state.engine.temporal_config().await)
}

/// POST /temporal-config - Patch smoothing and persistence parameters
pub async fn update_temporal_config(
    State(state): State<AppState>,
    payload: Result<Json<TemporalConfigPatch>, JsonRejection>,
) -> ApiResult<Json<TemporalConfig>> {
    let patch = json_body(payload)?;
    Ok(Json(state.engine.update_temporal_config(&patch).await?))
}
