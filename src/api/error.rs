//! Mapping from desk errors to HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::desk::DeskError;
use crate::escalation::EscalationError;
use crate::triage::TriageError;

#[derive(Debug)]
pub enum ApiError {
    Desk(DeskError),
    BadRequest(String),
}

impl<E: Into<DeskError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self::Desk(err.into())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Desk(DeskError::Triage(TriageError::Validation(_))) => {
                (StatusCode::BAD_REQUEST, "validation")
            }
            ApiError::Desk(DeskError::Escalation(e)) => match e {
                EscalationError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                EscalationError::AlreadyExists(_) => (StatusCode::CONFLICT, "already_exists"),
                EscalationError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
                EscalationError::TerminalState(_) => (StatusCode::LOCKED, "terminal_state"),
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Desk(e) => e.to_string(),
            ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.message(),
            }
        }));
        (status, body).into_response()
    }
}
