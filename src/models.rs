use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::Store;
use crate::telegram::Messenger;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub messenger: Arc<dyn Messenger>,
    pub branding: Branding,
    pub staff_key_hash: String,
    pub webhook_secret: Option<String>,
    pub webhook_url: Option<String>,
}

/// Institution identity used in message headers and footers.
#[derive(Debug, Clone)]
pub struct Branding {
    pub name: String,
    pub contact: Option<String>,
}

/* -------------------------
   Records
--------------------------*/

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Patient {
    pub id: Uuid,
    /// Hospital record number shown on the dashboard.
    pub patient_id: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_username: Option<String>,
    pub telegram_connected: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    /// Chat id to deliver to, if the patient is linked.
    /// Both the flag and the id must be present.
    pub fn linked_chat(&self) -> Option<&str> {
        match (self.telegram_connected, self.telegram_chat_id.as_deref()) {
            (true, Some(chat)) if !chat.is_empty() => Some(chat),
            _ => None,
        }
    }
}

/// Chat-linkage fields written together by connect/disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatLink {
    pub chat_id: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "test_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TestStatus::Pending => "pending",
            TestStatus::InProgress => "in_progress",
            TestStatus::Completed => "completed",
            TestStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LabTest {
    pub id: Uuid,
    /// Lab reference number.
    pub test_id: String,
    pub patient_id: Uuid,
    pub test_name: String,
    pub test_type: String,
    pub status: TestStatus,
    pub result_summary: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "notification_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Retry,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationStatus::Pending => "pending",
            NotificationStatus::Sent => "sent",
            NotificationStatus::Delivered => "delivered",
            NotificationStatus::Failed => "failed",
            NotificationStatus::Retry => "retry",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, NotificationStatus::Delivered | NotificationStatus::Failed)
    }

    /// Allowed forward moves. Delivered and failed are terminal.
    pub fn can_transition_to(self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        if self.is_terminal() {
            return false;
        }
        match self {
            Pending => matches!(next, Sent | Delivered | Failed | Retry),
            Sent => matches!(next, Delivered | Failed),
            _ => matches!(next, Pending | Sent | Delivered | Failed),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub test_id: Option<Uuid>,
    pub notification_type: String,
    pub message: String,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub telegram_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Insert payload. `error_message` must be `Some` iff `status` is failed.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub patient_id: Uuid,
    pub test_id: Option<Uuid>,
    pub notification_type: String,
    pub message: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
}

/// Outcome of one delivery attempt, applied to a pending row.
#[derive(Debug, Clone)]
pub enum DeliveryUpdate {
    Delivered {
        telegram_message_id: String,
        at: DateTime<Utc>,
    },
    Failed {
        error_message: String,
        at: DateTime<Utc>,
    },
}

impl DeliveryUpdate {
    pub fn status(&self) -> NotificationStatus {
        match self {
            DeliveryUpdate::Delivered { .. } => NotificationStatus::Delivered,
            DeliveryUpdate::Failed { .. } => NotificationStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    pub patient_id: Option<Uuid>,
    pub status: Option<NotificationStatus>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewAuditLog {
    pub action: String,
    pub table_name: String,
    pub record_id: Option<Uuid>,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
}

/* -------------------------
   API DTOs
--------------------------*/

#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}
