use axum::{Json, Router, extract::State, routing::get};

use crate::models::{AppState, DataResponse};

#[derive(serde::Serialize)]
pub struct HealthData {
    pub status: &'static str,
    pub institution: String,
    pub version: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Liveness only; no store or provider round trip.
pub async fn health(State(state): State<AppState>) -> Json<DataResponse<HealthData>> {
    Json(DataResponse {
        data: HealthData {
            status: "ok",
            institution: state.branding.name.clone(),
            version: env!("CARGO_PKG_VERSION"),
        },
    })
}
