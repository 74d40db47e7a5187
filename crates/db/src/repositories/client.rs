use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use offercraft_core::domain::client::{Client, ClientId, ClientStatus};
use offercraft_core::tenancy::TenantId;

use super::{parse_timestamp, ClientRepository, RepositoryError};
use crate::DbPool;

pub struct SqlClientRepository {
    pool: DbPool,
}

impl SqlClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ClientRepository for SqlClientRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        find(&mut conn, tenant_id, id).await
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Client>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, company_name, email, vat_number, phone, status, created_at
             FROM client
             WHERE tenant_id = ?
             ORDER BY company_name ASC, created_at ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_client).collect()
    }

    async fn save(&self, client: Client) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO client (
                id, tenant_id, company_name, email, vat_number, phone, status, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                company_name = excluded.company_name,
                email = excluded.email,
                vat_number = excluded.vat_number,
                phone = excluded.phone,
                status = excluded.status
            WHERE client.tenant_id = excluded.tenant_id",
        )
        .bind(&client.id.0)
        .bind(&client.tenant_id.0)
        .bind(&client.company_name)
        .bind(client.email.as_deref())
        .bind(client.vat_number.as_deref())
        .bind(client.phone.as_deref())
        .bind(client.status.as_str())
        .bind(client.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Tenant-scoped lookup usable inside a running transaction.
pub async fn find(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    id: &ClientId,
) -> Result<Option<Client>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, tenant_id, company_name, email, vat_number, phone, status, created_at
         FROM client
         WHERE id = ? AND tenant_id = ?",
    )
    .bind(&id.0)
    .bind(&tenant_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(row_to_client).transpose()
}

fn row_to_client(row: &SqliteRow) -> Result<Client, RepositoryError> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw.parse::<ClientStatus>()?;

    Ok(Client {
        id: ClientId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        company_name: row.try_get("company_name")?,
        email: row.try_get("email")?,
        vat_number: row.try_get("vat_number")?,
        phone: row.try_get("phone")?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
