// src/db.rs

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, QueryBuilder};
use uuid::Uuid;

use crate::models::{
    ChatLink, DeliveryUpdate, LabTest, NewAuditLog, NewNotification, Notification,
    NotificationFilter, NotificationStatus, Patient,
};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

pub async fn connect_pg(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;
    Ok(pool)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Db(#[from] sqlx::Error),
    #[error("{entity} {id} not found")]
    Missing { entity: &'static str, id: Uuid },
    #[error("notification {id} is already {} and cannot become {}", .from.as_str(), .to.as_str())]
    InvalidTransition {
        id: Uuid,
        from: NotificationStatus,
        to: NotificationStatus,
    },
}

/// Record store used by the chat protocol and the dispatcher.
///
/// Reads return `Ok(None)` for "not found" so callers can tell it apart
/// from a transport failure.
#[async_trait]
pub trait Store: Send + Sync {
    async fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError>;

    /// Exact match on the stored phone string. Most recently updated row wins.
    async fn patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError>;

    /// Exact match on the chat id. Most recently updated row wins.
    async fn patient_by_chat(&self, chat_id: &str) -> Result<Option<Patient>, StoreError>;

    /// Writes chat id, username and the connected flag in one statement.
    /// `None` clears the link.
    async fn set_chat_link(
        &self,
        patient_id: Uuid,
        link: Option<&ChatLink>,
    ) -> Result<Patient, StoreError>;

    async fn test_by_id(&self, id: Uuid) -> Result<Option<LabTest>, StoreError>;

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification, StoreError>;

    /// Applies a delivery outcome to a non-terminal notification.
    async fn record_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Notification, StoreError>;

    /// Newest first.
    async fn recent_notifications(
        &self,
        patient_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn notification_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError>;

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError>;

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError>;
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

// --------------------------
// Postgres
// --------------------------

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn patient_by_id(&self, id: Uuid) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, patient_id, full_name, phone, telegram_chat_id, telegram_username,
                   telegram_connected, is_active, created_at, updated_at
            FROM patients
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn patient_by_phone(&self, phone: &str) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, patient_id, full_name, phone, telegram_chat_id, telegram_username,
                   telegram_connected, is_active, created_at, updated_at
            FROM patients
            WHERE phone = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn patient_by_chat(&self, chat_id: &str) -> Result<Option<Patient>, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            SELECT id, patient_id, full_name, phone, telegram_chat_id, telegram_username,
                   telegram_connected, is_active, created_at, updated_at
            FROM patients
            WHERE telegram_chat_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn set_chat_link(
        &self,
        patient_id: Uuid,
        link: Option<&ChatLink>,
    ) -> Result<Patient, StoreError> {
        let row = sqlx::query_as::<_, Patient>(
            r#"
            UPDATE patients
            SET telegram_chat_id = $1,
                telegram_username = $2,
                telegram_connected = $3,
                updated_at = now()
            WHERE id = $4
            RETURNING id, patient_id, full_name, phone, telegram_chat_id, telegram_username,
                      telegram_connected, is_active, created_at, updated_at
            "#,
        )
        .bind(link.map(|l| l.chat_id.as_str()))
        .bind(link.and_then(|l| l.username.as_deref()))
        .bind(link.is_some())
        .bind(patient_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::Missing {
            entity: "patient",
            id: patient_id,
        })?;

        Ok(row)
    }

    async fn test_by_id(&self, id: Uuid) -> Result<Option<LabTest>, StoreError> {
        let row = sqlx::query_as::<_, LabTest>(
            r#"
            SELECT id, test_id, patient_id, test_name, test_type, status, result_summary,
                   created_at, updated_at
            FROM tests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert_notification(&self, new: &NewNotification) -> Result<Notification, StoreError> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications
                (patient_id, test_id, notification_type, message, status, error_message)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, patient_id, test_id, notification_type, message, status,
                      retry_count, max_retries, error_message, telegram_message_id,
                      created_at, updated_at, sent_at, delivered_at
            "#,
        )
        .bind(new.patient_id)
        .bind(new.test_id)
        .bind(&new.notification_type)
        .bind(&new.message)
        .bind(new.status)
        .bind(new.error_message.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn record_delivery(
        &self,
        id: Uuid,
        update: &DeliveryUpdate,
    ) -> Result<Notification, StoreError> {
        let (message_id, error_message, sent_at, delivered_at) = match update {
            DeliveryUpdate::Delivered {
                telegram_message_id,
                at,
            } => (Some(telegram_message_id.as_str()), None, *at, Some(*at)),
            DeliveryUpdate::Failed { error_message, at } => {
                (None, Some(error_message.as_str()), *at, None)
            }
        };

        // Terminal rows are left untouched.
        let updated = sqlx::query_as::<_, Notification>(
            r#"
            UPDATE notifications
            SET status = $2,
                telegram_message_id = $3,
                error_message = $4,
                sent_at = $5,
                delivered_at = $6,
                updated_at = now()
            WHERE id = $1
              AND status NOT IN ('delivered', 'failed')
            RETURNING id, patient_id, test_id, notification_type, message, status,
                      retry_count, max_retries, error_message, telegram_message_id,
                      created_at, updated_at, sent_at, delivered_at
            "#,
        )
        .bind(id)
        .bind(update.status())
        .bind(message_id)
        .bind(error_message)
        .bind(sent_at)
        .bind(delivered_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(row);
        }

        match self.notification_by_id(id).await? {
            Some(current) => Err(StoreError::InvalidTransition {
                id,
                from: current.status,
                to: update.status(),
            }),
            None => Err(StoreError::Missing {
                entity: "notification",
                id,
            }),
        }
    }

    async fn recent_notifications(
        &self,
        patient_id: Uuid,
        limit: i64,
    ) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, patient_id, test_id, notification_type, message, status,
                   retry_count, max_retries, error_message, telegram_message_id,
                   created_at, updated_at, sent_at, delivered_at
            FROM notifications
            WHERE patient_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(patient_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn notification_by_id(&self, id: Uuid) -> Result<Option<Notification>, StoreError> {
        let row = sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, patient_id, test_id, notification_type, message, status,
                   retry_count, max_retries, error_message, telegram_message_id,
                   created_at, updated_at, sent_at, delivered_at
            FROM notifications
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn list_notifications(
        &self,
        filter: &NotificationFilter,
    ) -> Result<Vec<Notification>, StoreError> {
        let mut qb: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            r#"
            SELECT id, patient_id, test_id, notification_type, message, status,
                   retry_count, max_retries, error_message, telegram_message_id,
                   created_at, updated_at, sent_at, delivered_at
            FROM notifications
            WHERE 1=1
            "#,
        );

        if let Some(pid) = filter.patient_id {
            qb.push(" AND patient_id = ");
            qb.push_bind(pid);
        }
        if let Some(status) = filter.status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }

        qb.push(" ORDER BY created_at DESC LIMIT ");
        qb.push_bind(clamp_limit(filter.limit));

        let rows = qb
            .build_query_as::<Notification>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn insert_audit_log(&self, entry: &NewAuditLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (action, table_name, record_id, old_values, new_values)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.action)
        .bind(&entry.table_name)
        .bind(entry.record_id)
        .bind(entry.old_values.clone())
        .bind(entry.new_values.clone())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), DEFAULT_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(10_000)), MAX_LIST_LIMIT);
        assert_eq!(clamp_limit(Some(25)), 25);
    }

    #[test]
    fn transition_error_names_both_states() {
        let e = StoreError::InvalidTransition {
            id: Uuid::nil(),
            from: NotificationStatus::Delivered,
            to: NotificationStatus::Failed,
        };
        let msg = e.to_string();
        assert!(msg.contains("delivered"));
        assert!(msg.contains("failed"));
    }
}
