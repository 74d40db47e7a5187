use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use offercraft_core::domain::offer::OfferId;
use offercraft_core::domain::signature::{Signature, SignatureId};
use offercraft_core::tenancy::TenantId;

use super::{parse_timestamp, RepositoryError};

pub async fn find_for_offer(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    offer_id: &OfferId,
) -> Result<Option<Signature>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, offer_id, tenant_id, signer_name, signer_email, payload, ip_address,
                user_agent, signed_at
         FROM offer_signature
         WHERE offer_id = ? AND tenant_id = ?",
    )
    .bind(&offer_id.0)
    .bind(&tenant_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_signature).transpose()
}

/// Fails with a unique violation when the offer already carries a signature.
pub async fn insert(
    conn: &mut SqliteConnection,
    signature: &Signature,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "INSERT INTO offer_signature (
            id, offer_id, tenant_id, signer_name, signer_email, payload, ip_address,
            user_agent, signed_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&signature.id.0)
    .bind(&signature.offer_id.0)
    .bind(&signature.tenant_id.0)
    .bind(&signature.signer_name)
    .bind(&signature.signer_email)
    .bind(&signature.payload)
    .bind(&signature.ip_address)
    .bind(signature.user_agent.as_deref())
    .bind(signature.signed_at.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn row_to_signature(row: &SqliteRow) -> Result<Signature, RepositoryError> {
    Ok(Signature {
        id: SignatureId(row.try_get("id")?),
        offer_id: OfferId(row.try_get("offer_id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        signer_name: row.try_get("signer_name")?,
        signer_email: row.try_get("signer_email")?,
        payload: row.try_get("payload")?,
        ip_address: row.try_get("ip_address")?,
        user_agent: row.try_get("user_agent")?,
        signed_at: parse_timestamp("signed_at", row.try_get("signed_at")?)?,
    })
}
