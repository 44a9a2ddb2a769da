// Test doubles and fixtures shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::auth::hash_access_token;
use crate::db::{clamp_limit, Store, StoreError};
use crate::models::{
    AppState, Branding, ChatLink, DeliveryUpdate, LabTest, NewAuditLog, NewNotification,
    Notification, NotificationFilter, NotificationStatus, Patient, TestStatus,
};
use crate::telegram::{
    BotInfo, Chat, IncomingMessage, Messenger, ParseMode, SentMessage, TelegramError, User,
};

pub const STAFF_KEY: &str = "test-staff-key";

/* -------------------------
   Fixtures
--------------------------*/

pub fn branding() -> Branding {
    Branding {
        name: "Test Hospital".to_string(),
        contact: Some("+251-11-000-0000".to_string()),
    }
}

pub fn patient(full_name: &str, phone: &str) -> Patient {
    let now = Utc::now();
    Patient {
        id: Uuid::new_v4(),
        patient_id: "P-0001".to_string(),
        full_name: full_name.to_string(),
        phone: Some(phone.to_string()),
        telegram_chat_id: None,
        telegram_username: None,
        telegram_connected: false,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub fn lab_test(patient_id: Uuid) -> LabTest {
    let now = Utc::now();
    LabTest {
        id: Uuid::new_v4(),
        test_id: "LAB-2024-001".to_string(),
        patient_id,
        test_name: "Complete Blood Count".to_string(),
        test_type: "Hematology".to_string(),
        status: TestStatus::Completed,
        result_summary: None,
        created_at: now,
        updated_at: now,
    }
}

/// A stored notification created `age_rank` minutes after a fixed base, so
/// higher ranks are newer.
pub fn notification(patient_id: Uuid, status: NotificationStatus, age_rank: i64) -> Notification {
    let at = Utc::now() - Duration::hours(1) + Duration::minutes(age_rank);
    let delivered = status == NotificationStatus::Delivered;
    Notification {
        id: Uuid::new_v4(),
        patient_id,
        test_id: None,
        notification_type: "general".to_string(),
        message: format!("message {age_rank}"),
        status,
        retry_count: 0,
        max_retries: 3,
        error_message: (status == NotificationStatus::Failed).then(|| "boom".to_string()),
        telegram_message_id: delivered.then(|| age_rank.to_string()),
        created_at: at,
        updated_at: at,
        sent_at: Some(at),
        delivered_at: delivered.then_some(at),
    }
}

pub fn incoming(chat_id: i64, text: Option<&str>) -> IncomingMessage {
    IncomingMessage {
        message_id: 1,
        from: Some(User {
            id: chat_id,
            is_bot: false,
            first_name: "Almaz".to_string(),
            last_name: None,
            username: Some("almaz".to_string()),
        }),
        chat: Chat {
            id: chat_id,
            kind: Some("private".to_string()),
        },
        date: Utc::now().timestamp(),
        text: text.map(str::to_string),
    }
}

pub fn test_state(
    webhook_secret: Option<&str>,
) -> (AppState, Arc<MemoryStore>, Arc<RecordingMessenger>) {
    let store = Arc::new(MemoryStore::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let state = AppState {
        store: store.clone(),
        messenger: messenger.clone(),
        branding: branding(),
        staff_key_hash: hash_access_token(STAFF_KEY),
        webhook_secret: webhook_secret.map(str::to_string),
        webhook_url: Some("https://example.org/telegram/webhook".to_string()),
    };
    (state, store, messenger)
}

/* -------------------------
   In-memory store
--------------------------*/

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    patients: Vec<Patient>,
    tests: Vec<LabTest>,
    notifications: Vec<Notification>,
    audit_logs: Vec<NewAuditLog>,
    history: HashMap<Uuid, Vec<NotificationStatus>>,
    calls: HashMap<&'static str, usize>,
    fail: HashSet<&'static str>,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap()
    }

    /// Counts the call and fails it if armed with `fail_next`.
    fn enter(&self, op: &'static str) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        let mut inner = self.lock();
        *inner.calls.entry(op).or_default() += 1;
        if inner.fail.remove(op) {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        Ok(inner)
    }

    pub fn fail_next(&self, op: &'static str) {
        self.lock().fail.insert(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.lock().calls.get(op).copied().unwrap_or(0)
    }

    pub fn add_patient(&self, p: Patient) {
        self.lock().patients.push(p);
    }

    pub fn add_test(&self, t: LabTest) {
        self.lock().tests.push(t);
    }

    pub fn add_notification(&self, n: Notification) {
        let mut inner = self.lock();
        inner.history.entry(n.id).or_default().push(n.status);
        inner.notifications.push(n);
    }

    pub fn patient(&self, id: Uuid) -> Option<Patient> {
        self.lock().patients.iter().find(|p| p.id == id).cloned()
    }

    /// Insertion order.
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    pub fn audit_logs(&self) -> Vec<NewAuditLog> {
        self.lock().audit_logs.clone()
    }

    pub fn status_history(&self, id: Uuid) -> Vec<NotificationStatus> {
        self.lock().history.get(&id).cloned().unwrap_or_default()
    }
}

fn newest_first(mut rows: Vec<Notification>) -> Vec<Notification> {
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    rows
}

#[async_trait]
impl Store for MemoryStore {
    async fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let inner = self.enter("patient_by_id")?;
        Ok(inner.patients.iter().find(|p| p.id == id).cloned())
    }

    async fn patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        let inner = self.enter("patient_by_phone")?;
        Ok(inner
            .patients
            .iter()
            .filter(|p| p.phone.as_deref() == Some(phone))
            .max_by_key(|p| p.updated_at)
            .cloned())
    }

    async fn patient_by_chat(&self, chat_id: &str) -> Result<Option<Patient>, StoreError> {
        let inner = self.enter("patient_by_chat")?;
        Ok(inner
            .patients
            .iter()
            .filter(|p| p.telegram_chat_id.as_deref() == Some(chat_id))
            .max_by_key(|p| p.updated_at)
            .cloned())
    }

    async fn set_chat_link(
        &self,
        patient_id: Uuid,
        link: Option<&ChatLink>,
    ) -> Result<Patient, StoreError> {
        let mut inner = self.enter("set_chat_link")?;
        let p = inner
            .patients
            .iter_mut()
            .find(|p| p.id == patient_id)
            .ok_or(StoreError::Missing {
                entity: "patient",
                id: patient_id,
            })?;

        p.telegram_chat_id = link.map(|l| l.chat_id.clone());
        p.telegram_username = link.and_then(|l| l.username.clone());
        p.telegram_connected = link.is_some();
        p.updated_at = Utc::now();
        Ok(p.clone())
    }

    async fn test_by_id(&self, id: Uuid) -> Result<Option<LabTest>, StoreError> {
        let inner = self.enter("test_by_id")?;
        Ok(inner.tests.iter().find(|t| t.id == id).cloned())
    }

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification, StoreError> {
        let mut inner = self.enter("insert_notification")?;
        let now = Utc::now();
        let n = Notification {
            id: Uuid::new_v4(),
            patient_id: new.patient_id,
            test_id: new.test_id,
            notification_type: new.notification_type.clone(),
            message: new.message.clone(),
            status: new.status,
            retry_count: 0,
            max_retries: 3,
            error_message: new.error_message.clone(),
            telegram_message_id: None,
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
        };
        inner.history.entry(n.id).or_default().push(n.status);
        inner.notifications.push(n.clone());
        Ok(n)
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Notification, StoreError> {
        let mut inner = self.enter("record_delivery")?;
        let n = inner
            .notifications
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(StoreError::Missing {
                entity: "notification",
                id,
            })?;

        if !n.status.can_transition_to(update.status()) {
            return Err(StoreError::InvalidTransition {
                id,
                from: n.status,
                to: update.status(),
            });
        }

        match update {
            DeliveryUpdate::Delivered {
                telegram_message_id,
                at,
            } => {
                n.telegram_message_id = Some(telegram_message_id.clone());
                n.error_message = None;
                n.sent_at = Some(*at);
                n.delivered_at = Some(*at);
            }
            DeliveryUpdate::Failed { error_message, at } => {
                n.telegram_message_id = None;
                n.error_message = Some(error_message.clone());
                n.sent_at = Some(*at);
                n.delivered_at = None;
            }
        }
        n.status = update.status();
        n.updated_at = Utc::now();

        let updated = n.clone();
        inner.history.entry(id).or_default().push(updated.status);
        Ok(updated)
    }

    async fn recent_notifications(
        &self,
        patient_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let inner = self.enter("recent_notifications")?;
        let rows = inner
            .notifications
            .iter()
            .filter(|n| n.patient_id == patient_id)
            .cloned()
            .collect();
        Ok(newest_first(rows)
            .into_iter()
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn notification_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let inner = self.enter("notification_by_id")?;
        Ok(inner.notifications.iter().find(|n| n.id == id).cloned())
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError> {
        let inner = self.enter("list_notifications")?;
        let rows = inner
            .notifications
            .iter()
            .filter(|n| filter.patient_id.is_none_or(|id| n.patient_id == id))
            .filter(|n| filter.status.is_none_or(|s| n.status == s))
            .cloned()
            .collect();
        Ok(newest_first(rows)
            .into_iter()
            .take(clamp_limit(filter.limit) as usize)
            .collect())
    }

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError> {
        let mut inner = self.enter("insert_audit_log")?;
        inner.audit_logs.push(entry.clone());
        Ok(())
    }
}

/* -------------------------
   Recording messenger
--------------------------*/

#[derive(Debug, Clone)]
pub struct SentText {
    pub chat_id: String,
    pub text: String,
    pub parse_mode: Option<ParseMode>,
}

#[derive(Default)]
pub struct RecordingMessenger {
    inner: Mutex<MessengerInner>,
}

#[derive(Default)]
struct MessengerInner {
    sent: Vec<SentText>,
    attempts: usize,
    reject: Option<String>,
    next_id: Option<i64>,
    last_id: i64,
    webhooks: Vec<(String, Option<String>)>,
}

impl RecordingMessenger {
    fn lock(&self) -> MutexGuard<'_, MessengerInner> {
        self.inner.lock().unwrap()
    }

    /// The next send fails with an API error carrying `description`.
    pub fn reject_next(&self, description: &str) {
        self.lock().reject = Some(description.to_string());
    }

    pub fn next_message_id(&self, id: i64) {
        self.lock().next_id = Some(id);
    }

    /// Successful sends only.
    pub fn sent(&self) -> Vec<SentText> {
        self.lock().sent.clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn webhooks(&self) -> Vec<(String, Option<String>)> {
        self.lock().webhooks.clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn get_me(&self) -> Result<BotInfo, TelegramError> {
        Ok(BotInfo {
            id: 99,
            is_bot: true,
            first_name: "Lab Bot".to_string(),
            username: Some("lab_bot".to_string()),
        })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, TelegramError> {
        let mut inner = self.lock();
        inner.attempts += 1;

        if let Some(description) = inner.reject.take() {
            return Err(TelegramError::Api {
                code: Some(403),
                description,
            });
        }

        let id = inner.next_id.take().unwrap_or(inner.last_id + 1);
        inner.last_id = id;
        inner.sent.push(SentText {
            chat_id: chat_id.to_string(),
            text: text.to_string(),
            parse_mode,
        });

        Ok(SentMessage {
            message_id: id,
            chat: Chat {
                id: chat_id.parse().unwrap_or_default(),
                kind: Some("private".to_string()),
            },
            date: Utc::now().timestamp(),
        })
    }

    async fn set_webhook(
        &self,
        url: &str,
        secret_token: Option<&str>,
    ) -> Result<bool, TelegramError> {
        self.lock()
            .webhooks
            .push((url.to_string(), secret_token.map(str::to_string)));
        Ok(true)
    }
}
