use std::collections::BTreeMap;

use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use offercraft_core::activity::ActivityEvent;
use offercraft_core::domain::offer::OfferId;
use offercraft_core::tenancy::TenantId;

use super::{parse_timestamp, RepositoryError};

pub async fn append(
    conn: &mut SqliteConnection,
    event: &ActivityEvent,
) -> Result<(), RepositoryError> {
    let metadata_json = serde_json::to_string(&event.metadata)
        .map_err(|error| RepositoryError::Decode(format!("activity metadata: {error}")))?;

    sqlx::query(
        "INSERT INTO offer_activity (
            id, offer_id, tenant_id, kind, actor, description, metadata_json, occurred_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.event_id)
    .bind(&event.offer_id.0)
    .bind(&event.tenant_id.0)
    .bind(event.kind.as_str())
    .bind(&event.actor)
    .bind(&event.description)
    .bind(metadata_json)
    .bind(event.occurred_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn append_all(
    conn: &mut SqliteConnection,
    events: &[ActivityEvent],
) -> Result<(), RepositoryError> {
    for event in events {
        append(conn, event).await?;
    }
    Ok(())
}

/// Newest first; entries written in the same instant keep insertion order
/// reversed.
pub async fn list_for_offer(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    offer_id: &OfferId,
) -> Result<Vec<ActivityEvent>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, offer_id, tenant_id, kind, actor, description, metadata_json, occurred_at
         FROM offer_activity
         WHERE offer_id = ? AND tenant_id = ?
         ORDER BY occurred_at DESC, rowid DESC",
    )
    .bind(&offer_id.0)
    .bind(&tenant_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_event).collect()
}

fn row_to_event(row: &SqliteRow) -> Result<ActivityEvent, RepositoryError> {
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata: BTreeMap<String, String> = serde_json::from_str(&metadata_json)
        .map_err(|error| RepositoryError::Decode(format!("activity metadata: {error}")))?;

    Ok(ActivityEvent {
        event_id: row.try_get("id")?,
        tenant_id: TenantId(row.try_get("tenant_id")?),
        offer_id: OfferId(row.try_get("offer_id")?),
        kind: row.try_get::<String, _>("kind")?.parse()?,
        actor: row.try_get("actor")?,
        description: row.try_get("description")?,
        metadata,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
