//! API route definitions.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::error::Category;
use serde_json::{json, Value};

use super::error::ApiError;
use super::state::AppState;
use crate::escalation::Incident;
use crate::triage::{IncidentId, IncidentReport, TriageError};

/// Actor recorded when a request does not name one.
const API_ACTOR: &str = "api";

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/teams", get(list_teams))
        .route("/triage", post(preview_triage))
        .route("/incidents", get(list_incidents).post(open_incident))
        .route("/incidents/{id}", get(get_incident))
        .route("/incidents/{id}/ack", post(acknowledge))
        .route("/incidents/{id}/resolve", post(resolve))
        .route("/incidents/{id}/close", post(close))
        .route("/incidents/{id}/retriage", post(retriage))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn incident_body(incident: &Incident) -> Json<Value> {
    Json(json!({ "data": incident, "meta": meta() }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn list_teams(State(state): State<AppState>) -> Json<Value> {
    let catalog = state.desk.teams();
    let teams: Vec<_> = catalog.teams().collect();
    Json(json!({
        "data": teams,
        "meta": {
            "total": teams.len(),
            "default_team": catalog.default_team(),
            "oncall_team": catalog.oncall_team(),
            "broader_channel": catalog.broader_channel(),
        }
    }))
}

async fn preview_triage(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let report: IncidentReport = required_body(&body)?;
    let decision = state.desk.preview(&report)?;
    Ok(Json(json!({ "data": decision, "meta": meta() })))
}

async fn open_incident(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let report: IncidentReport = required_body(&body)?;
    let incident = state.desk.submit(report).await?;
    Ok((StatusCode::CREATED, incident_body(&incident)))
}

async fn list_incidents(State(state): State<AppState>) -> Json<Value> {
    let incidents = state.desk.list().await;
    Json(json!({
        "data": incidents,
        "meta": { "total": incidents.len() }
    }))
}

async fn get_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let incident = state.desk.get(&IncidentId::from(id)).await?;
    Ok(incident_body(&incident))
}

#[derive(Debug, Default, Deserialize)]
struct ActorRequest {
    actor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ResolveRequest {
    actor: Option<String>,
    #[serde(default)]
    note: String,
}

#[derive(Debug, Deserialize)]
struct RetriageRequest {
    actor: Option<String>,
    report: IncidentReport,
}

/// A body that parses but lacks required fields is a validation error;
/// anything that is not JSON is a bad request.
fn required_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| match e.classify() {
        Category::Data => ApiError::from(TriageError::Validation(e.to_string())),
        _ => ApiError::BadRequest(format!("invalid request body: {e}")),
    })
}

/// An empty body means "all defaults"; anything else must be valid JSON.
fn optional_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid request body: {e}")))
}

fn actor(name: Option<String>) -> String {
    name.filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| API_ACTOR.to_string())
}

async fn acknowledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: ActorRequest = optional_body(&body)?;
    let incident = state
        .desk
        .acknowledge(&IncidentId::from(id), actor(req.actor))
        .await?;
    Ok(incident_body(&incident))
}

async fn resolve(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: ResolveRequest = optional_body(&body)?;
    let incident = state
        .desk
        .resolve(&IncidentId::from(id), actor(req.actor), req.note)
        .await?;
    Ok(incident_body(&incident))
}

async fn close(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: ActorRequest = optional_body(&body)?;
    let incident = state.desk.close(&IncidentId::from(id), actor(req.actor)).await?;
    Ok(incident_body(&incident))
}

async fn retriage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let req: RetriageRequest = required_body(&body)?;
    let incident = state
        .desk
        .retriage(&IncidentId::from(id), req.report, actor(req.actor))
        .await?;
    Ok(incident_body(&incident))
}
