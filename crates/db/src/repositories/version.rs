use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use offercraft_core::domain::offer::OfferId;
use offercraft_core::domain::version::{NewVersion, OfferVersion, SnapshotContent, VersionId};
use offercraft_core::tenancy::{TenantId, UserId};

use super::{parse_timestamp, RepositoryError};

/// Appends a snapshot with the next version number of its offer. The number
/// is computed by the insert itself; `UNIQUE(offer_id, version)` rejects a
/// racing writer that read the same maximum.
pub async fn append(
    conn: &mut SqliteConnection,
    version: NewVersion,
) -> Result<OfferVersion, RepositoryError> {
    let content_json = version.content.to_json()?;
    let assigned: i64 = sqlx::query(
        "INSERT INTO offer_version (
            id, offer_id, tenant_id, version, content_json, content_hash,
            status_at_capture, author_id, note, created_at
        )
        SELECT ?, ?, ?, COALESCE(MAX(version), 0) + 1, ?, ?, ?, ?, ?, ?
        FROM offer_version
        WHERE offer_id = ?
        RETURNING version",
    )
    .bind(&version.id.0)
    .bind(&version.offer_id.0)
    .bind(&version.tenant_id.0)
    .bind(content_json)
    .bind(&version.content_hash)
    .bind(version.status_at_capture.as_str())
    .bind(&version.author_id.0)
    .bind(version.note.as_deref())
    .bind(version.created_at.to_rfc3339())
    .bind(&version.offer_id.0)
    .fetch_one(&mut *conn)
    .await?
    .try_get("version")?;

    Ok(version.into_version(version_number(assigned)?))
}

/// Newest first.
pub async fn list_for_offer(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    offer_id: &OfferId,
) -> Result<Vec<OfferVersion>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, offer_id, tenant_id, version, content_json, content_hash,
                status_at_capture, author_id, note, created_at
         FROM offer_version
         WHERE offer_id = ? AND tenant_id = ?
         ORDER BY version DESC",
    )
    .bind(&offer_id.0)
    .bind(&tenant_id.0)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_version).collect()
}

pub async fn find(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    offer_id: &OfferId,
    id: &VersionId,
) -> Result<Option<OfferVersion>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, offer_id, tenant_id, version, content_json, content_hash,
                status_at_capture, author_id, note, created_at
         FROM offer_version
         WHERE id = ? AND offer_id = ? AND tenant_id = ?",
    )
    .bind(&id.0)
    .bind(&offer_id.0)
    .bind(&tenant_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_version).transpose()
}

fn row_to_version(row: &SqliteRow) -> Result<OfferVersion, RepositoryError> {
    let content_json: String = row.try_get("content_json")?;

    Ok(OfferVersion {
        id: VersionId(row.try_get("id")?),
        offer_id: OfferId(row.try_get("offer_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        version: version_number(row.try_get("version")?)?,
        content: SnapshotContent::from_json(&content_json)?,
        content_hash: row.try_get("content_hash")?,
        status_at_capture: row.try_get::<String, _>("status_at_capture")?.parse()?,
        author_id: UserId(row.try_get("author_id")?),
        note: row.try_get("note")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn version_number(value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| RepositoryError::Decode(format!("invalid version `{value}`")))
}
