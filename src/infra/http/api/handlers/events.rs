//! Telemetry ingestion and listing handlers

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;

use crate::application::ingest::{EventKind, ViewOutcome};
use crate::domain::entities::{Feedback, ReadingAnalytics, View};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::*;
use crate::infra::http::api::state::ApiState;

use super::{session_or_header, user_agent};

fn payload<T>(kind: EventKind, body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_payload(kind, rejection.body_text()))
}

pub async fn list_feedback(State(state): State<ApiState>) -> Result<Json<Vec<Feedback>>, ApiError> {
    Ok(Json(state.ingest.list_feedback().await?))
}

pub async fn record_feedback(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Result<Json<FeedbackCreated>, ApiError> {
    let mut request = payload(EventKind::Feedback, body)?;
    request.session_id = session_or_header(request.session_id, &headers);

    let feedback = state.ingest.record_feedback(request.into()).await?;
    Ok(Json(FeedbackCreated {
        success: true,
        feedback,
    }))
}

pub async fn list_views(State(state): State<ApiState>) -> Result<Json<Vec<View>>, ApiError> {
    Ok(Json(state.ingest.list_views().await?))
}

pub async fn record_view(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ViewRequest>, JsonRejection>,
) -> Result<Json<ViewRecorded>, ApiError> {
    let mut request = payload(EventKind::View, body)?;
    request.session_id = session_or_header(request.session_id, &headers);

    let outcome = state
        .ingest
        .record_view(request.into_submission(user_agent(&headers)))
        .await?;
    let recorded = match outcome {
        ViewOutcome::Counted(view) => ViewRecorded {
            success: true,
            counted: true,
            session_id: view.session_id.to_string(),
            view: Some(view),
        },
        ViewOutcome::Duplicate { session_id } => ViewRecorded {
            success: true,
            counted: false,
            view: None,
            session_id: session_id.to_string(),
        },
    };
    Ok(Json(recorded))
}

pub async fn list_readings(
    State(state): State<ApiState>,
) -> Result<Json<Vec<ReadingAnalytics>>, ApiError> {
    Ok(Json(state.ingest.list_readings().await?))
}

pub async fn record_reading(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Result<Json<ReadingRequest>, JsonRejection>,
) -> Result<Json<ReadingRecorded>, ApiError> {
    let mut request = payload(EventKind::Reading, body)?;
    request.session_id = session_or_header(request.session_id, &headers);

    let reading = state
        .ingest
        .record_reading(request.into_submission(user_agent(&headers)))
        .await?;
    Ok(Json(ReadingRecorded {
        success: true,
        session_id: reading.session_id.to_string(),
    }))
}
