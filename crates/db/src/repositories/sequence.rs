use sqlx::{Row, SqliteConnection};

use offercraft_core::numbering::{NumberingPeriod, OfferNumber};
use offercraft_core::tenancy::TenantId;

use super::RepositoryError;

/// Increments and reads the tenant's counter for `period` in one statement,
/// so two writers can never observe the same value.
pub async fn next_value(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    period: NumberingPeriod,
) -> Result<u32, RepositoryError> {
    let value: i64 = sqlx::query(
        "INSERT INTO offer_number_sequence (tenant_id, period, last_value)
         VALUES (?, ?, 1)
         ON CONFLICT(tenant_id, period) DO UPDATE SET last_value = last_value + 1
         RETURNING last_value",
    )
    .bind(&tenant_id.0)
    .bind(period.key())
    .fetch_one(&mut *conn)
    .await?
    .try_get("last_value")?;

    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("offer number sequence overflow `{value}`")))
}

pub async fn next_offer_number(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    prefix: &str,
    period: NumberingPeriod,
) -> Result<OfferNumber, RepositoryError> {
    let sequence = next_value(conn, tenant_id, period).await?;
    Ok(OfferNumber::format(prefix, period, sequence))
}
