use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use crate::auth::verify_staff_key;
use crate::error::ApiError;
use crate::models::AppState;

/// Proof that the caller presented the staff key as `Authorization: Bearer <key>`.
#[derive(Debug, Clone)]
pub struct StaffAuth;

impl FromRequestParts<AppState> for StaffAuth {
    type Rejection = ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let TypedHeader(authz): TypedHeader<Authorization<Bearer>> =
                TypedHeader::from_request_parts(parts, state)
                    .await
                    .map_err(|_| ApiError::invalid_staff_key())?;

            if !verify_staff_key(authz.token(), &state.staff_key_hash) {
                tracing::warn!("rejected request with invalid staff key");
                return Err(ApiError::invalid_staff_key());
            }

            Ok(StaffAuth)
        }
    }
}

/// Header Telegram attaches when the webhook was registered with a secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Checks the webhook secret header when one is configured.
pub fn check_webhook_secret(headers: &axum::http::HeaderMap, state: &AppState) -> Result<(), ApiError> {
    let Some(expected) = state.webhook_secret.as_deref() else {
        return Ok(());
    };

    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if crate::auth::constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(ApiError::invalid_webhook_secret())
    }
}
