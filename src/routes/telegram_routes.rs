// src/routes/telegram_routes.rs

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    middleware::staff_auth::{check_webhook_secret, StaffAuth},
    models::{AppState, DataResponse},
    services::commands::CommandInterpreter,
    telegram::{BotInfo, Update},
};

// --------------------------
// Routers
// --------------------------

/// Inbound provider callback. Authenticated by the optional webhook secret.
pub fn webhook_router() -> Router<AppState> {
    Router::new().route("/telegram/webhook", post(telegram_webhook))
}

/// Staff-only bot administration.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/bot", get(bot_info))
        .route("/webhook", post(register_webhook))
}

// --------------------------
// Webhook
// --------------------------

/// Always answers 200 "OK" once the update parsed, even when the command
/// itself failed; the provider would otherwise redeliver the update.
pub async fn telegram_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = check_webhook_secret(&headers, &state) {
        tracing::warn!("webhook call with missing or wrong secret");
        return e.into_response();
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            tracing::error!(error = %e, "unparseable webhook update");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response();
        }
    };

    if let Some(message) = update.message.as_ref() {
        let interpreter = CommandInterpreter {
            store: state.store.as_ref(),
            messenger: state.messenger.as_ref(),
            branding: &state.branding,
        };
        interpreter.handle(message).await;
    } else {
        tracing::debug!(update_id = update.update_id, "update without message ignored");
    }

    (StatusCode::OK, "OK").into_response()
}

// --------------------------
// Bot admin
// --------------------------

pub async fn bot_info(
    State(state): State<AppState>,
    _auth: StaffAuth,
) -> Result<Json<DataResponse<BotInfo>>, ApiError> {
    let bot = state.messenger.get_me().await?;
    Ok(Json(DataResponse { data: bot }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterWebhookRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterWebhookData {
    pub url: String,
    pub registered: bool,
    pub secret_configured: bool,
}

pub async fn register_webhook(
    State(state): State<AppState>,
    _auth: StaffAuth,
    Json(req): Json<RegisterWebhookRequest>,
) -> Result<Json<DataResponse<RegisterWebhookData>>, ApiError> {
    let url = req
        .url
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .or(state.webhook_url.as_deref())
        .ok_or_else(|| {
            ApiError::BadRequest(
                "VALIDATION_ERROR",
                "url is required when WEBHOOK_URL is not configured".into(),
            )
        })?
        .to_string();

    if !url.starts_with("https://") {
        return Err(ApiError::BadRequest(
            "VALIDATION_ERROR",
            "webhook url must use https".into(),
        ));
    }

    let registered = state
        .messenger
        .set_webhook(&url, state.webhook_secret.as_deref())
        .await?;
    tracing::info!(%url, registered, "webhook registration requested");

    Ok(Json(DataResponse {
        data: RegisterWebhookData {
            url,
            registered,
            secret_configured: state.webhook_secret.is_some(),
        },
    }))
}
