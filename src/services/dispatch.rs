// src/services/dispatch.rs

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::db::{Store, StoreError};
use crate::models::{
    Branding, DeliveryUpdate, NewAuditLog, NewNotification, Notification, NotificationStatus,
    Patient,
};
use crate::phone;
use crate::services::{directory, messages, record_audit};
use crate::telegram::{Messenger, ParseMode};

pub const NOT_CONNECTED_ERROR: &str = "Patient not connected";
pub const TEST_RESULT_TYPE: &str = "test_result";

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchRequest {
    pub patient_id: Uuid,
    pub test_id: Option<Uuid>,
    pub message: String,
    pub notification_type: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Patient not found")]
    PatientNotFound(Uuid),
    #[error("Test not found")]
    TestNotFound(Uuid),
    #[error("{0}")]
    Validation(&'static str),
    #[error("{0}")]
    Store(#[from] StoreError),
}

/// Result of one dispatch call. Every variant owns the single row created.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Delivered {
        notification: Notification,
        patient_name: String,
        telegram_message_id: i64,
        normalized_phone: String,
    },
    /// Precondition failed; the row was created as failed and nothing was sent.
    NotConnected {
        notification: Notification,
        normalized_phone: String,
    },
    /// The provider rejected the message or could not be reached.
    ProviderFailed {
        notification: Notification,
        error: String,
        normalized_phone: String,
    },
}

impl DispatchOutcome {
    pub fn notification(&self) -> &Notification {
        match self {
            DispatchOutcome::Delivered { notification, .. }
            | DispatchOutcome::NotConnected { notification, .. }
            | DispatchOutcome::ProviderFailed { notification, .. } => notification,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Wire shape of the dispatch endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_phone: Option<String>,
}

impl From<&DispatchOutcome> for DispatchResponse {
    fn from(outcome: &DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Delivered {
                notification,
                patient_name,
                telegram_message_id,
                normalized_phone,
            } => DispatchResponse {
                success: true,
                notification_id: Some(notification.id),
                patient_name: Some(patient_name.clone()),
                telegram_message_id: Some(*telegram_message_id),
                error: None,
                normalized_phone: Some(normalized_phone.clone()),
            },
            DispatchOutcome::NotConnected {
                notification,
                normalized_phone,
            } => DispatchResponse {
                success: false,
                notification_id: Some(notification.id),
                error: Some(NOT_CONNECTED_ERROR.to_string()),
                normalized_phone: Some(normalized_phone.clone()),
                ..Default::default()
            },
            DispatchOutcome::ProviderFailed {
                notification,
                error,
                normalized_phone,
            } => DispatchResponse {
                success: false,
                notification_id: Some(notification.id),
                error: Some(error.clone()),
                normalized_phone: Some(normalized_phone.clone()),
                ..Default::default()
            },
        }
    }
}

/// Creates one notification for the patient and attempts a single delivery.
pub async fn dispatch(
    store: &dyn Store,
    messenger: &dyn Messenger,
    branding: &Branding,
    req: DispatchRequest,
) -> Result<DispatchOutcome, DispatchError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(DispatchError::Validation("message is required"));
    }
    let notification_type = req.notification_type.trim();
    if notification_type.is_empty() {
        return Err(DispatchError::Validation("notification_type is required"));
    }

    let patient = directory::find_by_id(store, req.patient_id)
        .await?
        .ok_or(DispatchError::PatientNotFound(req.patient_id))?;

    deliver(store, messenger, branding, &patient, req.test_id, notification_type, message).await
}

/// Builds the "results available" message for a lab test and dispatches it
/// to the test's owner.
pub async fn notify_test_result(
    store: &dyn Store,
    messenger: &dyn Messenger,
    branding: &Branding,
    test_id: Uuid,
) -> Result<DispatchOutcome, DispatchError> {
    let test = store
        .test_by_id(test_id)
        .await?
        .ok_or(DispatchError::TestNotFound(test_id))?;

    let patient = directory::find_by_id(store, test.patient_id)
        .await?
        .ok_or(DispatchError::PatientNotFound(test.patient_id))?;

    let message = messages::test_result(&patient, &test);
    deliver(
        store,
        messenger,
        branding,
        &patient,
        Some(test.id),
        TEST_RESULT_TYPE,
        &message,
    )
    .await
}

async fn deliver(
    store: &dyn Store,
    messenger: &dyn Messenger,
    branding: &Branding,
    patient: &Patient,
    test_id: Option<Uuid>,
    notification_type: &str,
    message: &str,
) -> Result<DispatchOutcome, DispatchError> {
    let normalized_phone = phone::normalize(patient.phone.as_deref().unwrap_or_default());

    let Some(chat_id) = patient.linked_chat() else {
        let notification = store
            .insert_notification(&NewNotification {
                patient_id: patient.id,
                test_id,
                notification_type: notification_type.to_string(),
                message: message.to_string(),
                status: NotificationStatus::Failed,
                error_message: Some(NOT_CONNECTED_ERROR.to_string()),
            })
            .await?;

        tracing::info!(
            patient_id = %patient.id,
            notification_id = %notification.id,
            "patient not connected; notification recorded as failed"
        );
        audit_dispatch(store, &notification).await;

        return Ok(DispatchOutcome::NotConnected {
            notification,
            normalized_phone,
        });
    };

    let pending = store
        .insert_notification(&NewNotification {
            patient_id: patient.id,
            test_id,
            notification_type: notification_type.to_string(),
            message: message.to_string(),
            status: NotificationStatus::Pending,
            error_message: None,
        })
        .await?;

    let text = messages::branded(branding, message);
    let sent = messenger
        .send_message(chat_id, &text, Some(ParseMode::Markdown))
        .await;
    let at = Utc::now();

    let outcome = match sent {
        Ok(sent) => {
            tracing::info!(
                patient_id = %patient.id,
                notification_id = %pending.id,
                telegram_message_id = sent.message_id,
                "notification delivered"
            );
            let update = DeliveryUpdate::Delivered {
                telegram_message_id: sent.message_id.to_string(),
                at,
            };
            DispatchOutcome::Delivered {
                notification: apply(store, pending, &update).await,
                patient_name: patient.full_name.clone(),
                telegram_message_id: sent.message_id,
                normalized_phone,
            }
        }
        Err(e) => {
            let error = e.to_string();
            tracing::warn!(
                patient_id = %patient.id,
                notification_id = %pending.id,
                error = %error,
                "notification delivery failed"
            );
            let update = DeliveryUpdate::Failed {
                error_message: error.clone(),
                at,
            };
            DispatchOutcome::ProviderFailed {
                notification: apply(store, pending, &update).await,
                error,
                normalized_phone,
            }
        }
    };

    audit_dispatch(store, outcome.notification()).await;
    Ok(outcome)
}

/// Records the delivery outcome. The message has already gone out (or
/// failed), so a failed write is logged and the pending row returned as is.
async fn apply(store: &dyn Store, pending: Notification, update: &DeliveryUpdate) -> Notification {
    match store.record_delivery(pending.id, update).await {
        Ok(updated) => updated,
        Err(e) => {
            tracing::error!(
                notification_id = %pending.id,
                status = update.status().as_str(),
                error = %e,
                "failed to update notification status"
            );
            pending
        }
    }
}

async fn audit_dispatch(store: &dyn Store, notification: &Notification) {
    record_audit(
        store,
        NewAuditLog {
            action: "notification_dispatch".to_string(),
            table_name: "notifications".to_string(),
            record_id: Some(notification.id),
            old_values: None,
            new_values: Some(json!({
                "patient_id": notification.patient_id,
                "test_id": notification.test_id,
                "notification_type": notification.notification_type,
                "status": notification.status,
            })),
        },
    )
    .await;
}
