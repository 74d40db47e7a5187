use sqlx::{sqlite::SqliteRow, Row};

use offercraft_core::domain::article_template::{
    ArticleTemplate, ArticleTemplateFilter, ArticleTemplateId,
};
use offercraft_core::tenancy::TenantId;

use super::{parse_decimal, parse_timestamp, ArticleTemplateRepository, RepositoryError};
use crate::DbPool;

const COLUMNS: &str = "id, tenant_id, name, description, category, unit, unit_price, vat_rate,
                       active, created_at, updated_at";

pub struct SqlArticleTemplateRepository {
    pool: DbPool,
}

impl SqlArticleTemplateRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ArticleTemplateRepository for SqlArticleTemplateRepository {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ArticleTemplateId,
    ) -> Result<Option<ArticleTemplate>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM offer_article_template WHERE id = ? AND tenant_id = ?"
        ))
        .bind(&id.0)
        .bind(&tenant_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_article_template).transpose()
    }

    async fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ArticleTemplateFilter,
    ) -> Result<Vec<ArticleTemplate>, RepositoryError> {
        let category = filter
            .category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty());
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
            .map(|term| format!("%{term}%"));

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS}
             FROM offer_article_template
             WHERE tenant_id = ?
               AND active = 1
               AND (? IS NULL OR category = ?)
               AND (? IS NULL OR name LIKE ? OR description LIKE ?)
             ORDER BY name ASC"
        ))
        .bind(&tenant_id.0)
        .bind(category)
        .bind(category)
        .bind(search.as_deref())
        .bind(search.as_deref())
        .bind(search.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_article_template).collect()
    }

    async fn categories(&self, tenant_id: &TenantId) -> Result<Vec<String>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category
             FROM offer_article_template
             WHERE tenant_id = ? AND active = 1 AND category IS NOT NULL
             ORDER BY category ASC",
        )
        .bind(&tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("category").map_err(RepositoryError::from))
            .collect()
    }

    async fn save(&self, template: ArticleTemplate) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO offer_article_template (
                id, tenant_id, name, description, category, unit, unit_price, vat_rate,
                active, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                category = excluded.category,
                unit = excluded.unit,
                unit_price = excluded.unit_price,
                vat_rate = excluded.vat_rate,
                active = excluded.active,
                updated_at = excluded.updated_at
            WHERE offer_article_template.tenant_id = excluded.tenant_id",
        )
        .bind(&template.id.0)
        .bind(&template.tenant_id.0)
        .bind(&template.name)
        .bind(template.description.as_deref())
        .bind(template.category.as_deref())
        .bind(&template.unit)
        .bind(template.unit_price.to_string())
        .bind(template.vat_rate.to_string())
        .bind(template.active)
        .bind(template.created_at.to_rfc3339())
        .bind(template.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_article_template(row: &SqliteRow) -> Result<ArticleTemplate, RepositoryError> {
    Ok(ArticleTemplate {
        id: ArticleTemplateId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        category: row.try_get("category")?,
        unit: row.try_get("unit")?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        vat_rate: parse_decimal("vat_rate", row.try_get("vat_rate")?)?,
        active: row.try_get("active")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}
