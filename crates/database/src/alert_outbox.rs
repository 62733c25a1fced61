//! Outbox of alerts the backend has not acknowledged yet.
//!
//! A row is created when an alert create call fails. It carries everything
//! needed to replay the create, plus the latest status the device wants the
//! backend to hold.

use guardian_core::{AlertStatus, SyncStatus};
use sqlx::SqlitePool;

use crate::error::{map_unique, DatabaseError, Result};
use crate::models::OutboxAlert;

const SELECT_COLUMNS: &str = r#"
    SELECT local_id, server_id, created_at, latitude, longitude, address,
           alert_type, status, sync_status, revision
    FROM alert_outbox
"#;

/// Queue a new alert.
pub async fn insert_outbox_alert(pool: &SqlitePool, alert: &OutboxAlert) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO alert_outbox
            (local_id, server_id, created_at, latitude, longitude, address,
             alert_type, status, sync_status, revision)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&alert.local_id)
    .bind(&alert.server_id)
    .bind(alert.created_at)
    .bind(alert.latitude)
    .bind(alert.longitude)
    .bind(&alert.address)
    .bind(alert.alert_type.as_str())
    .bind(alert.status.as_str())
    .bind(alert.sync_status.as_str())
    .bind(alert.revision)
    .execute(pool)
    .await
    .map_err(map_unique("OutboxAlert", &alert.local_id))?;

    tracing::debug!(local_id = %alert.local_id, "Queued alert in outbox");
    Ok(())
}

/// Get a queued alert by its local id.
pub async fn get_outbox_alert(pool: &SqlitePool, local_id: &str) -> Result<OutboxAlert> {
    find_outbox_alert(pool, local_id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "OutboxAlert",
            id: local_id.to_string(),
        })
}

/// Get a queued alert by its local id, if present.
pub async fn find_outbox_alert(pool: &SqlitePool, local_id: &str) -> Result<Option<OutboxAlert>> {
    let alert = sqlx::query_as::<_, OutboxAlert>(&format!("{SELECT_COLUMNS} WHERE local_id = ?"))
        .bind(local_id)
        .fetch_optional(pool)
        .await?;

    Ok(alert)
}

/// Get the row tracking a backend alert id, if one exists.
pub async fn find_outbox_by_server_id(
    pool: &SqlitePool,
    server_id: &str,
) -> Result<Option<OutboxAlert>> {
    let alert = sqlx::query_as::<_, OutboxAlert>(&format!(
        "{SELECT_COLUMNS} WHERE server_id = ? ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(server_id)
    .fetch_optional(pool)
    .await?;

    Ok(alert)
}

/// Alerts waiting for upload, oldest first.
pub async fn pending_outbox_alerts(pool: &SqlitePool) -> Result<Vec<OutboxAlert>> {
    let alerts = sqlx::query_as::<_, OutboxAlert>(&format!(
        "{SELECT_COLUMNS} WHERE sync_status = 'pending' ORDER BY created_at ASC, rowid ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(alerts)
}

/// Every row in the outbox, oldest first.
pub async fn list_outbox_alerts(pool: &SqlitePool) -> Result<Vec<OutboxAlert>> {
    let alerts = sqlx::query_as::<_, OutboxAlert>(&format!(
        "{SELECT_COLUMNS} ORDER BY created_at ASC, rowid ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(alerts)
}

/// Record a new lifecycle status for a queued alert and mark it pending.
pub async fn update_outbox_status(
    pool: &SqlitePool,
    local_id: &str,
    status: AlertStatus,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE alert_outbox
        SET status = ?, sync_status = 'pending', revision = revision + 1
        WHERE local_id = ?
        "#,
    )
    .bind(status.as_str())
    .bind(local_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "OutboxAlert",
            id: local_id.to_string(),
        });
    }

    Ok(())
}

/// Store the backend id after a successful create.
///
/// The row becomes `synced` only if it is still at `revision`; otherwise it
/// stays pending so the newer status gets pushed on the next pass. Returns
/// whether the row was marked synced.
pub async fn mark_outbox_uploaded(
    pool: &SqlitePool,
    local_id: &str,
    server_id: &str,
    revision: i64,
) -> Result<bool> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE alert_outbox SET server_id = ? WHERE local_id = ?")
        .bind(server_id)
        .bind(local_id)
        .execute(&mut *tx)
        .await?;

    let synced = sqlx::query(
        "UPDATE alert_outbox SET sync_status = 'synced' WHERE local_id = ? AND revision = ?",
    )
    .bind(local_id)
    .bind(revision)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(synced.rows_affected() > 0)
}

/// Mark a row synced if it is still at `revision`.
pub async fn mark_outbox_synced_if_unchanged(
    pool: &SqlitePool,
    local_id: &str,
    revision: i64,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE alert_outbox SET sync_status = 'synced' WHERE local_id = ? AND revision = ?",
    )
    .bind(local_id)
    .bind(revision)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Mark a row failed.
pub async fn mark_outbox_failed(pool: &SqlitePool, local_id: &str) -> Result<()> {
    sqlx::query("UPDATE alert_outbox SET sync_status = 'failed' WHERE local_id = ?")
        .bind(local_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Move every failed row back to pending. Returns how many moved.
pub async fn requeue_failed_outbox(pool: &SqlitePool) -> Result<u64> {
    let result =
        sqlx::query("UPDATE alert_outbox SET sync_status = 'pending' WHERE sync_status = 'failed'")
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Delete a row by local id.
pub async fn delete_outbox_alert(pool: &SqlitePool, local_id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM alert_outbox WHERE local_id = ?")
        .bind(local_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "OutboxAlert",
            id: local_id.to_string(),
        });
    }

    Ok(())
}

/// Drop rows that are synced and in a terminal status.
///
/// An active alert stays so a later cancel or resolve can still find its
/// server id.
pub async fn purge_settled_outbox(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query(
        "DELETE FROM alert_outbox WHERE sync_status = 'synced' AND status != 'active'",
    )
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
