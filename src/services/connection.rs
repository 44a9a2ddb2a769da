// src/services/connection.rs

use serde_json::json;

use crate::db::{Store, StoreError};
use crate::models::{ChatLink, NewAuditLog, Patient};
use crate::services::record_audit;

/// Binds `patient` to a chat session. Rebinding from another session
/// overwrites the previous chat id (last write wins).
pub async fn connect(
    store: &dyn Store,
    patient: &Patient,
    chat_id: &str,
    username: Option<&str>,
) -> Result<Patient, StoreError> {
    if let Some(previous) = patient.telegram_chat_id.as_deref() {
        if previous != chat_id {
            tracing::warn!(
                patient_id = %patient.id,
                previous_chat = previous,
                chat_id,
                "rebinding patient to a new chat session"
            );
        }
    }

    let link = ChatLink {
        chat_id: chat_id.to_string(),
        username: username.map(str::to_string),
    };

    let updated = store.set_chat_link(patient.id, Some(&link)).await?;
    tracing::info!(patient_id = %updated.id, chat_id, "telegram connected");

    audit(store, "telegram_connect", patient, &updated).await;
    Ok(updated)
}

/// Clears the chat link of `patient`.
pub async fn disconnect(store: &dyn Store, patient: &Patient) -> Result<Patient, StoreError> {
    let updated = store.set_chat_link(patient.id, None).await?;
    tracing::info!(patient_id = %updated.id, "telegram disconnected");

    audit(store, "telegram_disconnect", patient, &updated).await;
    Ok(updated)
}

fn linkage(p: &Patient) -> serde_json::Value {
    json!({
        "telegram_chat_id": p.telegram_chat_id,
        "telegram_username": p.telegram_username,
        "telegram_connected": p.telegram_connected,
    })
}

async fn audit(store: &dyn Store, action: &str, before: &Patient, after: &Patient) {
    record_audit(
        store,
        NewAuditLog {
            action: action.to_string(),
            table_name: "patients".to_string(),
            record_id: Some(after.id),
            old_values: Some(linkage(before)),
            new_values: Some(linkage(after)),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{patient, MemoryStore};

    #[tokio::test]
    async fn connect_then_disconnect_keeps_flag_and_chat_in_step() {
        let store = MemoryStore::default();
        let p = patient("Almaz Tesfaye", "+251911234567");
        store.add_patient(p.clone());

        let connected = connect(&store, &p, "777", Some("almaz")).await.unwrap();
        assert!(connected.telegram_connected);
        assert_eq!(connected.telegram_chat_id.as_deref(), Some("777"));
        assert_eq!(connected.telegram_username.as_deref(), Some("almaz"));
        assert_eq!(connected.linked_chat(), Some("777"));

        let found = store.patient_by_chat("777").await.unwrap().unwrap();
        assert_eq!(found.id, p.id);

        let disconnected = disconnect(&store, &connected).await.unwrap();
        assert!(!disconnected.telegram_connected);
        assert!(disconnected.telegram_chat_id.is_none());
        assert!(disconnected.telegram_username.is_none());
        assert!(store.patient_by_chat("777").await.unwrap().is_none());

        let actions: Vec<String> = store.audit_logs().into_iter().map(|a| a.action).collect();
        assert_eq!(actions, vec!["telegram_connect", "telegram_disconnect"]);
    }

    #[tokio::test]
    async fn audit_failure_does_not_fail_connect() {
        let store = MemoryStore::default();
        let p = patient("Almaz Tesfaye", "+251911234567");
        store.add_patient(p.clone());
        store.fail_next("insert_audit_log");

        let connected = connect(&store, &p, "1", None).await.unwrap();
        assert!(connected.telegram_connected);
    }

    #[tokio::test]
    async fn store_error_propagates() {
        let store = MemoryStore::default();
        let p = patient("Almaz Tesfaye", "+251911234567");
        store.add_patient(p.clone());
        store.fail_next("set_chat_link");

        assert!(connect(&store, &p, "1", None).await.is_err());
        assert!(!store.patient(p.id).unwrap().telegram_connected);
    }
}
