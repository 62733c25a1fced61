//! Emergency contact operations.
//!
//! Writes that touch more than one row (primary reset, id replacement, server
//! merges) run inside a single transaction so no reader observes a half-applied
//! state.

use guardian_core::SyncStatus;
use sqlx::{SqliteConnection, SqlitePool};

use crate::error::{map_unique, DatabaseError, Result};
use crate::models::EmergencyContact;

const SELECT_COLUMNS: &str =
    "SELECT id, name, phone, relationship, is_primary, sync_status, revision FROM contacts";

/// Insert a new contact.
///
/// If the contact is primary, every other contact loses the flag in the same
/// transaction.
pub async fn create_contact(pool: &SqlitePool, contact: &EmergencyContact) -> Result<()> {
    let mut tx = pool.begin().await?;

    if contact.is_primary {
        reset_primary_except(&mut tx, &contact.id).await?;
    }

    sqlx::query(
        r#"
        INSERT INTO contacts (id, name, phone, relationship, is_primary, sync_status, revision)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&contact.id)
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.relationship)
    .bind(contact.is_primary)
    .bind(contact.sync_status.as_str())
    .bind(contact.revision)
    .execute(&mut *tx)
    .await
    .map_err(map_unique("Contact", &contact.id))?;

    tx.commit().await?;
    Ok(())
}

/// Overwrite a contact's fields and bump its revision.
///
/// Returns the stored row, including the new revision.
pub async fn update_contact(
    pool: &SqlitePool,
    contact: &EmergencyContact,
) -> Result<EmergencyContact> {
    let mut tx = pool.begin().await?;

    if contact.is_primary {
        reset_primary_except(&mut tx, &contact.id).await?;
    }

    let result = sqlx::query(
        r#"
        UPDATE contacts
        SET name = ?, phone = ?, relationship = ?, is_primary = ?, sync_status = ?,
            revision = revision + 1
        WHERE id = ?
        "#,
    )
    .bind(&contact.name)
    .bind(&contact.phone)
    .bind(&contact.relationship)
    .bind(contact.is_primary)
    .bind(contact.sync_status.as_str())
    .bind(&contact.id)
    .execute(&mut *tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Contact",
            id: contact.id.clone(),
        });
    }

    let stored = fetch_contact(&mut tx, &contact.id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Contact",
            id: contact.id.clone(),
        })?;

    tx.commit().await?;
    Ok(stored)
}

/// Get a contact by ID.
pub async fn get_contact(pool: &SqlitePool, id: &str) -> Result<EmergencyContact> {
    find_contact(pool, id)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Contact",
            id: id.to_string(),
        })
}

/// Get a contact by ID, if it exists.
pub async fn find_contact(pool: &SqlitePool, id: &str) -> Result<Option<EmergencyContact>> {
    let contact = sqlx::query_as::<_, EmergencyContact>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(contact)
}

/// List all contacts, primary first, then by name.
pub async fn list_contacts(pool: &SqlitePool) -> Result<Vec<EmergencyContact>> {
    let contacts = sqlx::query_as::<_, EmergencyContact>(&format!(
        "{SELECT_COLUMNS} ORDER BY is_primary DESC, name ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// List contacts with the given sync status.
pub async fn list_contacts_by_status(
    pool: &SqlitePool,
    status: SyncStatus,
) -> Result<Vec<EmergencyContact>> {
    let contacts = sqlx::query_as::<_, EmergencyContact>(&format!(
        "{SELECT_COLUMNS} WHERE sync_status = ? ORDER BY rowid ASC"
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    Ok(contacts)
}

/// Get the primary contact, if one is marked.
pub async fn primary_contact(pool: &SqlitePool) -> Result<Option<EmergencyContact>> {
    let contact = sqlx::query_as::<_, EmergencyContact>(&format!(
        "{SELECT_COLUMNS} WHERE is_primary = 1 LIMIT 1"
    ))
    .fetch_optional(pool)
    .await?;

    Ok(contact)
}

/// Count contacts currently marked primary.
pub async fn count_primary(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM contacts WHERE is_primary = 1")
        .fetch_one(pool)
        .await?;

    Ok(count)
}

/// Delete a contact by ID.
pub async fn delete_contact(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Contact",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Set the sync status only if the contact is still at `revision`.
///
/// Returns `false` when the contact was edited or deleted in the meantime.
pub async fn set_sync_status_if_unchanged(
    pool: &SqlitePool,
    id: &str,
    revision: i64,
    status: SyncStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE contacts SET sync_status = ? WHERE id = ? AND revision = ?")
        .bind(status.as_str())
        .bind(id)
        .bind(revision)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Move every failed contact back to pending. Returns how many moved.
pub async fn requeue_failed(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("UPDATE contacts SET sync_status = 'pending' WHERE sync_status = 'failed'")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}

/// Re-key a contact under the id the server assigned.
///
/// The placeholder row is deleted and the new row inserted in one transaction,
/// keeping every other field. The new row is `synced` if the contact is still
/// at `uploaded_revision`, or stays `pending` if it was edited while the
/// upload was in flight. Returns `None` if the placeholder row is gone.
pub async fn replace_contact_id(
    pool: &SqlitePool,
    placeholder_id: &str,
    server_id: &str,
    uploaded_revision: i64,
) -> Result<Option<EmergencyContact>> {
    let mut tx = pool.begin().await?;

    let Some(current) = fetch_contact(&mut tx, placeholder_id).await? else {
        return Ok(None);
    };

    let sync_status = if current.revision == uploaded_revision {
        SyncStatus::Synced
    } else {
        SyncStatus::Pending
    };

    let replacement = EmergencyContact {
        id: server_id.to_string(),
        sync_status,
        ..current
    };

    sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(placeholder_id)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT OR REPLACE INTO contacts
            (id, name, phone, relationship, is_primary, sync_status, revision)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&replacement.id)
    .bind(&replacement.name)
    .bind(&replacement.phone)
    .bind(&replacement.relationship)
    .bind(replacement.is_primary)
    .bind(replacement.sync_status.as_str())
    .bind(replacement.revision)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    tracing::debug!(
        placeholder_id = placeholder_id,
        server_id = server_id,
        sync_status = %replacement.sync_status,
        "Replaced placeholder contact id"
    );

    Ok(Some(replacement))
}

/// Merge the server's contact list into the local table.
///
/// Server rows overwrite local rows only when the local row is `synced`;
/// unsynced local edits win. A pulled primary flag resets the other contacts
/// unless an unsynced local contact is primary, in which case the pulled flag
/// is dropped. Returns how many rows were written.
pub async fn merge_remote_contacts(
    pool: &SqlitePool,
    remote: &[EmergencyContact],
) -> Result<usize> {
    let mut tx = pool.begin().await?;

    let local_primary = sqlx::query_scalar::<_, String>(
        "SELECT id FROM contacts WHERE is_primary = 1 AND sync_status != 'synced' LIMIT 1",
    )
    .fetch_optional(&mut *tx)
    .await?;

    let mut written = 0usize;
    let mut pulled_primary: Option<String> = None;

    for contact in remote {
        let is_primary = contact.is_primary && local_primary.is_none();

        let result = sqlx::query(
            r#"
            INSERT INTO contacts (id, name, phone, relationship, is_primary, sync_status, revision)
            VALUES (?, ?, ?, ?, ?, 'synced', 0)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                phone = excluded.phone,
                relationship = excluded.relationship,
                is_primary = excluded.is_primary
            WHERE contacts.sync_status = 'synced'
            "#,
        )
        .bind(&contact.id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.relationship)
        .bind(is_primary)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            written += 1;
            if is_primary {
                pulled_primary = Some(contact.id.clone());
            }
        }
    }

    if let Some(ref id) = pulled_primary {
        reset_primary_except(&mut tx, id).await?;
    }

    tx.commit().await?;
    Ok(written)
}

async fn reset_primary_except(conn: &mut SqliteConnection, id: &str) -> Result<()> {
    sqlx::query("UPDATE contacts SET is_primary = 0 WHERE id != ? AND is_primary = 1")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn fetch_contact(conn: &mut SqliteConnection, id: &str) -> Result<Option<EmergencyContact>> {
    let contact = sqlx::query_as::<_, EmergencyContact>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(contact)
}
