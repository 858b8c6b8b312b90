//! REST control plane: health/readiness split, status + timeseries
//! aggregation, clear, and the hijack-lease family.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::error::SwarmError;
use crate::manager::SwarmManager;
use crate::state::{BotSummary, StatusSample, TimeseriesSummary};

pub fn build_router(manager: Arc<SwarmManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/swarm/status", get(swarm_status))
        .route("/swarm/clear", post(swarm_clear))
        .route("/swarm/timeseries/summary", get(timeseries_summary))
        .route("/swarm/bots/{id}/register", post(register_bot))
        .route("/swarm/bots/{id}/status", post(report_status))
        .route("/bots/{id}/assume", post(assume))
        .route("/bots/{id}/hijack/begin", post(hijack_begin))
        .route("/bots/{id}/hijack/heartbeat", post(hijack_heartbeat))
        .route("/bots/{id}/hijack/release", post(hijack_release))
        .route("/bots/{id}/hijack/read", post(hijack_read))
        .route("/bots/{id}/hijack/send", post(hijack_send))
        .layer(CorsLayer::permissive())
        .with_state(manager)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// `GET /health` — liveness only, always 200 once the process is up;
/// per-bot readiness is a separate concern surfaced through
/// `GET /swarm/status`.
async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

#[derive(Debug, Serialize)]
struct SwarmStatusResponse {
    bots: Vec<BotSummary>,
}

async fn swarm_status(State(mgr): State<Arc<SwarmManager>>) -> impl IntoResponse {
    Json(SwarmStatusResponse { bots: mgr.status_all() })
}

async fn swarm_clear(State(mgr): State<Arc<SwarmManager>>) -> impl IntoResponse {
    mgr.clear();
    Json(serde_json::json!({ "cleared": true }))
}

#[derive(Debug, Deserialize)]
struct TimeseriesQuery {
    #[serde(default = "default_window_minutes")]
    window_minutes: u32,
}

fn default_window_minutes() -> u32 {
    15
}

#[derive(Debug, Serialize)]
struct TimeseriesResponse {
    window_minutes: u32,
    bots: Vec<TimeseriesSummary>,
}

async fn timeseries_summary(
    State(mgr): State<Arc<SwarmManager>>,
    Query(q): Query<TimeseriesQuery>,
) -> impl IntoResponse {
    let now_ms = crate::clock::epoch_ms();
    Json(TimeseriesResponse { window_minutes: q.window_minutes, bots: mgr.timeseries_summary(q.window_minutes, now_ms) })
}

async fn register_bot(State(mgr): State<Arc<SwarmManager>>, Path(id): Path<String>) -> impl IntoResponse {
    mgr.register_bot(&id);
    Json(serde_json::json!({ "registered": id }))
}

async fn report_status(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(sample): Json<StatusSample>,
) -> impl IntoResponse {
    mgr.report_status(&id, sample);
    Json(serde_json::json!({ "accepted": true }))
}

#[derive(Debug, Deserialize)]
struct LeaseRequest {
    owner: String,
    #[serde(default = "default_lease_s")]
    lease_s: u64,
}

fn default_lease_s() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
struct OwnerOnlyRequest {
    owner: String,
}

async fn assume(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<LeaseRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    let lease = mgr.assume(&id, &req.owner, req.lease_s)?;
    Ok(Json(lease_response(lease)))
}

async fn hijack_begin(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<LeaseRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    let lease = mgr.hijack_begin(&id, &req.owner, req.lease_s)?;
    Ok(Json(lease_response(lease)))
}

async fn hijack_heartbeat(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<OwnerOnlyRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    let lease = mgr.hijack_heartbeat(&id, &req.owner)?;
    Ok(Json(lease_response(lease)))
}

async fn hijack_release(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<OwnerOnlyRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    mgr.hijack_release(&id, &req.owner)?;
    Ok(Json(serde_json::json!({ "released": true })))
}

#[derive(Debug, Serialize)]
struct LeaseResponse {
    bot_id: String,
    owner: String,
    lease_s: u64,
    expires_at_ms: u64,
}

fn lease_response(lease: crate::lease::HijackLease) -> LeaseResponse {
    LeaseResponse { bot_id: lease.bot_id, owner: lease.owner, lease_s: lease.lease_s, expires_at_ms: lease.expires_at_ms }
}

/// `POST /bots/{id}/hijack/read` — authorizes the caller against the
/// lease table. The manager does not hold the bot's transport itself —
/// it gates access, it does not proxy the session — so the
/// actual screen payload is left to the caller's own session attachment
/// once authorized; here we hand back the authorization result.
async fn hijack_read(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<OwnerOnlyRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    mgr.hijack_authorize(&id, &req.owner)?;
    Ok(Json(serde_json::json!({ "authorized": true })))
}

#[derive(Debug, Deserialize)]
struct HijackSendRequest {
    owner: String,
    #[serde(default)]
    keys: String,
}

async fn hijack_send(
    State(mgr): State<Arc<SwarmManager>>,
    Path(id): Path<String>,
    Json(req): Json<HijackSendRequest>,
) -> Result<impl IntoResponse, SwarmError> {
    mgr.hijack_authorize(&id, &req.owner)?;
    Ok(Json(serde_json::json!({ "authorized": true, "echoed_keys": req.keys })))
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
