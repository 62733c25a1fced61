//! Location history operations.

use sqlx::SqlitePool;

use crate::error::{map_unique, Result};
use crate::models::LocationSample;

const SELECT_COLUMNS: &str =
    "SELECT id, latitude, longitude, address, timestamp, accuracy FROM location_history";

/// Insert a new location sample.
pub async fn insert_location(pool: &SqlitePool, sample: &LocationSample) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO location_history (id, latitude, longitude, address, timestamp, accuracy)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&sample.id)
    .bind(sample.latitude)
    .bind(sample.longitude)
    .bind(&sample.address)
    .bind(sample.timestamp)
    .bind(sample.accuracy)
    .execute(pool)
    .await
    .map_err(map_unique("LocationSample", &sample.id))?;

    Ok(())
}

/// Get the newest sample, if any.
pub async fn most_recent_location(pool: &SqlitePool) -> Result<Option<LocationSample>> {
    let sample = sqlx::query_as::<_, LocationSample>(&format!(
        "{SELECT_COLUMNS} ORDER BY timestamp DESC, rowid DESC LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(sample)
}

/// Get the newest `limit` samples, newest first.
pub async fn recent_locations(pool: &SqlitePool, limit: i64) -> Result<Vec<LocationSample>> {
    let samples = sqlx::query_as::<_, LocationSample>(&format!(
        "{SELECT_COLUMNS} ORDER BY timestamp DESC, rowid DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(samples)
}

/// Get samples with `start_ms <= timestamp <= end_ms`, oldest first.
pub async fn locations_in_range(
    pool: &SqlitePool,
    start_ms: i64,
    end_ms: i64,
) -> Result<Vec<LocationSample>> {
    let samples = sqlx::query_as::<_, LocationSample>(&format!(
        "{SELECT_COLUMNS} WHERE timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC, rowid ASC"
    ))
    .bind(start_ms)
    .bind(end_ms)
    .fetch_all(pool)
    .await?;

    Ok(samples)
}

/// Get every sample, oldest first.
pub async fn all_locations(pool: &SqlitePool) -> Result<Vec<LocationSample>> {
    let samples = sqlx::query_as::<_, LocationSample>(&format!(
        "{SELECT_COLUMNS} ORDER BY timestamp ASC, rowid ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(samples)
}

/// Count stored samples.
pub async fn count_locations(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM location_history")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Apply the retention policy.
///
/// Deletes samples older than `cutoff_ms`, then everything beyond the newest
/// `max_rows`. The newest sample always survives. Returns how many rows were
/// removed.
pub async fn prune_locations(pool: &SqlitePool, cutoff_ms: i64, max_rows: i64) -> Result<u64> {
    let max_rows = max_rows.max(1);
    let mut tx = pool.begin().await?;

    let aged = sqlx::query(
        r#"
        DELETE FROM location_history
        WHERE timestamp < ?
          AND id != (
              SELECT id FROM location_history
              ORDER BY timestamp DESC, rowid DESC
              LIMIT 1
          )
        "#,
    )
    .bind(cutoff_ms)
    .execute(&mut *tx)
    .await?;

    let overflow = sqlx::query(
        r#"
        DELETE FROM location_history
        WHERE id NOT IN (
            SELECT id FROM location_history
            ORDER BY timestamp DESC, rowid DESC
            LIMIT ?
        )
        "#,
    )
    .bind(max_rows)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let removed = aged.rows_affected() + overflow.rows_affected();
    if removed > 0 {
        tracing::debug!(removed = removed, "Pruned location history");
    }

    Ok(removed)
}

/// Delete every sample.
pub async fn clear_locations(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM location_history")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
