use sqlx::{sqlite::SqliteRow, Row};

use offercraft_core::domain::template::{OfferTemplate, TemplateId};
use offercraft_core::tenancy::TenantId;

use super::{parse_timestamp, RepositoryError, TemplateRepository};
use crate::DbPool;

pub struct SqlTemplateRepository {
    pool: DbPool,
}

impl SqlTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TemplateRepository for SqlTemplateRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &TemplateId,
    ) -> Result<Option<OfferTemplate>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, tenant_id, name, description, category, sections_json, terms,
                    validity_days, created_at
             FROM offer_template
             WHERE id = ? AND tenant_id = ?",
        )
        .bind(&id.0)
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<OfferTemplate>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, tenant_id, name, description, category, sections_json, terms,
                    validity_days, created_at
             FROM offer_template
             WHERE tenant_id = ?
             ORDER BY name ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }

    async fn save(&self, template: OfferTemplate) -> Result<(), RepositoryError> {
        let sections_json = template.sections_json()?;
        sqlx::query(
            "INSERT INTO offer_template (
                id, tenant_id, name, description, category, sections_json, terms,
                validity_days, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                sections_json = excluded.sections_json,
                terms = excluded.terms,
                validity_days = excluded.validity_days
            WHERE offer_template.tenant_id = excluded.tenant_id",
        )
        .bind(&template.id.0)
        .bind(&template.tenant_id.0)
        .bind(&template.name)
        .bind(template.description.as_deref())
        .bind(template.category.as_deref())
        .bind(sections_json)
        .bind(template.terms.as_deref())
        .bind(i64::from(template.validity_days))
        .bind(template.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Stored sections are validated again on the way out; a row edited by hand
/// into an unusable shape surfaces as a decode error.
fn row_to_template(row: &SqliteRow) -> Result<OfferTemplate, RepositoryError> {
    let sections_json: String = row.try_get("sections_json")?;
    let validity_days: i64 = row.try_get("validity_days")?;

    Ok(OfferTemplate {
        id: TemplateId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        sections: OfferTemplate::parse_sections(&sections_json)?,
        terms: row.try_get("terms")?,
        validity_days: u32::try_from(validity_days).map_err(|_| {
            RepositoryError::Decode(format!("invalid validity_days `{validity_days}`"))
        })?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
