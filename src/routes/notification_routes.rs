// src/routes/notification_routes.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::{
    error::ApiError,
    middleware::staff_auth::StaffAuth,
    models::{AppState, DataResponse, Notification, NotificationFilter},
    services::dispatch::{self, DispatchError, DispatchOutcome, DispatchRequest, DispatchResponse},
};

// --------------------------
// Router
// --------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/dispatch", post(dispatch_notification))
        .route("/notifications/{notification_id}", get(get_notification))
        .route("/tests/{test_id}/notify", post(notify_test_result))
}

/// Delivered and not-connected are both answered with 200; only a provider
/// failure turns into a 500 (the failed row is still referenced in the body).
fn dispatch_reply(outcome: &DispatchOutcome) -> (StatusCode, Json<DispatchResponse>) {
    tracing::info!(
        notification_id = %outcome.notification().id,
        success = outcome.is_success(),
        "dispatch finished"
    );
    let status = match outcome {
        DispatchOutcome::ProviderFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(DispatchResponse::from(outcome)))
}

// --------------------------
// Dispatch
// --------------------------

pub async fn dispatch_notification(
    State(state): State<AppState>,
    _auth: StaffAuth,
    Json(req): Json<DispatchRequest>,
) -> Result<(StatusCode, Json<DispatchResponse>), DispatchError> {
    let outcome = dispatch::dispatch(
        state.store.as_ref(),
        state.messenger.as_ref(),
        &state.branding,
        req,
    )
    .await?;

    Ok(dispatch_reply(&outcome))
}

pub async fn notify_test_result(
    State(state): State<AppState>,
    _auth: StaffAuth,
    Path(test_id): Path<Uuid>,
) -> Result<(StatusCode, Json<DispatchResponse>), DispatchError> {
    let outcome = dispatch::notify_test_result(
        state.store.as_ref(),
        state.messenger.as_ref(),
        &state.branding,
        test_id,
    )
    .await?;

    Ok(dispatch_reply(&outcome))
}

// --------------------------
// Notification history
// --------------------------

pub async fn list_notifications(
    State(state): State<AppState>,
    _auth: StaffAuth,
    Query(filter): Query<NotificationFilter>,
) -> Result<Json<DataResponse<Vec<Notification>>>, ApiError> {
    let rows = state.store.list_notifications(&filter).await?;
    Ok(Json(DataResponse { data: rows }))
}

pub async fn get_notification(
    State(state): State<AppState>,
    _auth: StaffAuth,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<DataResponse<Notification>>, ApiError> {
    let row = state
        .store
        .notification_by_id(notification_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("NOT_FOUND", "notification not found".into()))?;

    Ok(Json(DataResponse { data: row }))
}
