use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::db::StoreError;
use crate::services::dispatch::{DispatchError, DispatchResponse};
use crate::telegram::TelegramError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_staff_key() -> Self {
        ApiError::Unauthorized("INVALID_STAFF_KEY", "Missing or invalid staff key".into())
    }

    pub fn invalid_webhook_secret() -> Self {
        ApiError::Unauthorized("INVALID_WEBHOOK_SECRET", "Webhook secret mismatch".into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::Internal(format!("db error: {e}"))
    }
}

impl From<TelegramError> for ApiError {
    fn from(e: TelegramError) -> Self {
        ApiError::BadGateway(format!("telegram error: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadGateway(msg) => (
                StatusCode::BAD_GATEWAY,
                ApiError::to_error_response("UPSTREAM", &msg),
            )
                .into_response(),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let status = match &self {
            DispatchError::PatientNotFound(_) | DispatchError::TestNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
            DispatchError::Store(e) => {
                tracing::error!(error = %e, "dispatch aborted by store failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = DispatchResponse {
            success: false,
            error: Some(self.to_string()),
            ..Default::default()
        };
        (status, Json(body)).into_response()
    }
}
