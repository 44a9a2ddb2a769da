// src/services/directory.rs

use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::models::Patient;

pub async fn find_by_id(store: &dyn Store, id: Uuid) -> Result<Option<Patient>, StoreError> {
    log_lookup("id", store.patient_by_id(id).await)
}

/// Exact-match lookup on the stored phone string; the argument is not normalized.
pub async fn find_by_phone(store: &dyn Store, phone: &str) -> Result<Option<Patient>, StoreError> {
    log_lookup("phone", store.patient_by_phone(phone).await)
}

pub async fn find_by_chat(store: &dyn Store, chat_id: &str) -> Result<Option<Patient>, StoreError> {
    log_lookup("chat", store.patient_by_chat(chat_id).await)
}

fn log_lookup(
    key: &'static str,
    result: Result<Option<Patient>, StoreError>,
) -> Result<Option<Patient>, StoreError> {
    match &result {
        Ok(Some(p)) => tracing::debug!(key, patient_id = %p.id, "patient resolved"),
        Ok(None) => tracing::debug!(key, "no patient matched"),
        Err(e) => tracing::error!(key, error = %e, "patient lookup failed"),
    }
    result
}
