pub mod commands;
pub mod connection;
pub mod directory;
pub mod dispatch;
pub mod messages;

use crate::db::Store;
use crate::models::NewAuditLog;

/// Appends an audit entry. Failures are logged, never propagated.
pub(crate) async fn record_audit(store: &dyn Store, entry: NewAuditLog) {
    if let Err(e) = store.insert_audit_log(&entry).await {
        tracing::warn!(
            action = %entry.action,
            record_id = ?entry.record_id,
            error = %e,
            "audit log write failed"
        );
    }
}
