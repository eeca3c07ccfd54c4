//! HTTP JSON API.
//!
//! Thin translation layer between the wire format and the capability traits:
//! handlers decode and validate payloads, call the injected registry or
//! membership engine, and fold the result into the response envelope.
//!
//! Envelope rules: domain errors (`SegmentExists`, `SegmentNotFound`,
//! `AlreadyMember`) surface their message verbatim with HTTP 200; invalid
//! requests return 400; anything else is an opaque "internal error" with 500,
//! full detail reaching only the log.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::error;

use segmentd_storage::{MembershipEngine, SegmentRegistry};
use segmentd_types::error::StorageSnafu;
use segmentd_types::{MembershipAdd, Result, SegmentError, SegmentId, Slug, UserId};

/// Shared handler state: the injected store capabilities plus the per-request
/// deadline every store call inherits.
#[derive(Clone)]
pub struct AppState {
    /// Segment creation and deletion.
    pub registry: Arc<dyn SegmentRegistry>,
    /// Membership batches and reads.
    pub engine: Arc<dyn MembershipEngine>,
    /// Deadline applied to each store call.
    pub request_timeout: Duration,
}

/// Builds the API router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/segments", post(add_segment))
        .route("/segments/:slug", delete(remove_segment))
        .route("/user", post(change_user_segments))
        .route("/user/:user_id", get(get_user_segments))
        .route("/health", get(health))
        .with_state(state)
}

/// Response envelope shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope {
    /// `"OK"` or `"Error"`.
    pub status: &'static str,
    /// Error message, present only on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    fn ok() -> Self {
        Self { status: "OK", error: None }
    }

    fn error(message: impl Into<String>) -> Self {
        Self { status: "Error", error: Some(message.into()) }
    }
}

#[derive(Debug, Deserialize)]
struct AddSegmentRequest {
    slug: Slug,
}

#[derive(Debug, Serialize)]
struct AddSegmentResponse {
    #[serde(flatten)]
    envelope: Envelope,
    id: SegmentId,
}

#[derive(Debug, Deserialize)]
struct ChangeUserSegmentsRequest {
    user_id: UserId,
    segments_to_add: Option<Vec<MembershipAdd>>,
    segments_to_delete: Option<Vec<Slug>>,
}

#[derive(Debug, Serialize)]
struct UserSegmentsResponse {
    #[serde(flatten)]
    envelope: Envelope,
    slugs: Vec<Slug>,
}

async fn health() -> Json<Envelope> {
    Json(Envelope::ok())
}

async fn add_segment(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AddSegmentRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    match with_deadline(state.request_timeout, state.registry.add_segment(&request.slug)).await {
        Ok(id) => (
            StatusCode::OK,
            Json(AddSegmentResponse { envelope: Envelope::ok(), id }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn remove_segment(State(state): State<AppState>, Path(slug): Path<String>) -> Response {
    // Rejects the empty and overlong slugs the router would otherwise pass through.
    let slug = match Slug::parse(slug) {
        Ok(slug) => slug,
        Err(err) => return error_response(&err),
    };

    match with_deadline(state.request_timeout, state.registry.remove_segment(&slug)).await {
        Ok(()) => (StatusCode::OK, Json(Envelope::ok())).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn change_user_segments(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ChangeUserSegmentsRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    // Omitting both lists is a malformed request; present-but-empty lists are
    // a legitimate no-op.
    if request.segments_to_add.is_none() && request.segments_to_delete.is_none() {
        return invalid_request("at least one of segments_to_add, segments_to_delete is required");
    }

    let to_add = request.segments_to_add.unwrap_or_default();
    let to_delete = request.segments_to_delete.unwrap_or_default();

    let outcome = with_deadline(
        state.request_timeout,
        state.engine.change_user_segments(request.user_id, &to_add, &to_delete),
    )
    .await;

    match outcome {
        Ok(()) => (StatusCode::OK, Json(Envelope::ok())).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn get_user_segments(
    State(state): State<AppState>,
    user_id: std::result::Result<Path<UserId>, PathRejection>,
) -> Response {
    let Path(user_id) = match user_id {
        Ok(user_id) => user_id,
        Err(rejection) => return invalid_request(rejection.body_text()),
    };

    match with_deadline(state.request_timeout, state.engine.user_segments(user_id)).await {
        Ok(slugs) => (
            StatusCode::OK,
            Json(UserSegmentsResponse { envelope: Envelope::ok(), slugs }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Applies the request deadline to a store call.
///
/// A call that outlives the deadline surfaces as a storage (internal) error,
/// per the error taxonomy; the database rolls back whatever was in flight.
async fn with_deadline<T>(
    deadline: Duration,
    call: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(deadline, call).await {
        Ok(outcome) => outcome,
        Err(_) => StorageSnafu {
            message: format!("store call exceeded the {}s request deadline", deadline.as_secs()),
        }
        .fail(),
    }
}

fn invalid_request(message: impl Into<String>) -> Response {
    let err = SegmentError::InvalidRequest { message: message.into() };
    (StatusCode::BAD_REQUEST, Json(Envelope::error(err.to_string()))).into_response()
}

/// Folds a store error into the response envelope.
fn error_response(err: &SegmentError) -> Response {
    if err.is_domain() {
        return (StatusCode::OK, Json(Envelope::error(err.to_string()))).into_response();
    }

    match err {
        SegmentError::InvalidRequest { .. } => {
            (StatusCode::BAD_REQUEST, Json(Envelope::error(err.to_string()))).into_response()
        }
        _ => {
            // Full detail stays in the log; the caller sees an opaque message.
            error!(error = %err, code = %err.code(), "Request failed with internal error");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(Envelope::error("internal error")))
                .into_response()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_without_null_error() {
        let json = serde_json::to_string(&Envelope::ok()).unwrap();
        assert_eq!(json, r#"{"status":"OK"}"#);
    }

    #[test]
    fn error_envelope_carries_the_message() {
        let json = serde_json::to_string(&Envelope::error("segment exists: beta")).unwrap();
        assert_eq!(json, r#"{"status":"Error","error":"segment exists: beta"}"#);
    }

    #[test]
    fn change_request_lists_default_to_absent() {
        let request: ChangeUserSegmentsRequest =
            serde_json::from_str(r#"{"user_id":42}"#).unwrap();
        assert!(request.segments_to_add.is_none());
        assert!(request.segments_to_delete.is_none());
    }
}
