use crate::models::AppState;
use axum::Router;

pub mod health_routes;
pub mod notification_routes;
pub mod telegram_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", notification_routes::router())
        .nest("/api/v1/telegram", telegram_routes::admin_router())
        .merge(telegram_routes::webhook_router())
        .merge(health_routes::router())
        .with_state(state)
}
