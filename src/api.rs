//! HTTP surface of the vote pipeline
//!
//! `POST /vote` casts, `GET /vote` reads the tally, `POST /vote/reset`
//! zeroes the counters. Incoming `traceparent`/`baggage` headers become the
//! parent of the publish.

use crate::pipeline::{TallyReader, VotePublisher};
use crate::telemetry::{Extractor, TextMapPropagator};
use crate::types::{Candidate, RequestMetadata, Tally};
use crate::Error;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;

/// Shared handler state
pub struct AppState {
    pub publisher: VotePublisher,
    pub tally: TallyReader,
    pub propagator: Arc<dyn TextMapPropagator>,
    /// Parent of every request span, see [`crate::service_span`]
    pub service: tracing::Span,
}

#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub candidate: i32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CastVoteResponse {
    pub event_id: String,
    pub candidate: i32,
    pub trace_id: String,
}

/// Pipeline error rendered as `{"error": ...}`
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            e if e.is_decode_failure() => StatusCode::BAD_REQUEST,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(json!({
                "error": self.0.to_string()
            })),
        )
            .into_response()
    }
}

impl Extractor for HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }
}

fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    let text = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    RequestMetadata {
        user_agent: text(header::USER_AGENT),
        host: text(header::HOST),
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/vote", get(read_tally).post(cast_vote))
        .route("/vote/reset", post(reset_votes))
        .layer(middleware::from_fn_with_state(state.clone(), enrich_request))
        .with_state(state)
}

/// Run each request inside a span under the service span
async fn enrich_request(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let span = tracing::info_span!(
        parent: &state.service,
        "http request",
        http.method = %request.method(),
        http.target = %request.uri().path(),
    );

    next.run(request).instrument(span).await
}

async fn health_check() -> &'static str {
    "OK"
}

async fn cast_vote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<CastVoteResponse>), ApiError> {
    let candidate = Candidate::try_from(request.candidate)?;
    let parent = state.propagator.extract(&headers);
    let meta = request_metadata(&headers);

    let event = state.publisher.cast_vote(candidate, &parent, &meta).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(CastVoteResponse {
            event_id: event.event_id.to_string(),
            candidate: candidate.id(),
            trace_id: event.trace_context.trace_id.to_hex(),
        }),
    ))
}

async fn read_tally(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Tally>, ApiError> {
    let parent = state.propagator.extract(&headers);
    Ok(Json(state.tally.read(&parent).await?))
}

async fn reset_votes(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let parent = state.propagator.extract(&headers);
    state
        .tally
        .reset(&parent, &request_metadata(&headers))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
