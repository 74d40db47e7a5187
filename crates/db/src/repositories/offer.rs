//! Offer aggregate persistence.
//!
//! Functions take a `SqliteConnection` so the service can compose them inside
//! one transaction. Every statement is scoped by `tenant_id`, directly or
//! through the owning offer row.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};

use offercraft_core::domain::client::ClientId;
use offercraft_core::domain::offer::{
    Article, ArticleDraft, ArticleId, Offer, OfferId, OfferRecord, OfferStatus, Section,
    SectionId,
};
use offercraft_core::numbering::OfferNumber;
use offercraft_core::pricing::{ArticlePricing, DocumentTotals};
use offercraft_core::tenancy::{TenantId, UserId};

use super::{
    parse_date, parse_decimal, parse_optional_timestamp, parse_timestamp, RepositoryError,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OfferFilter {
    pub status: Option<OfferStatus>,
    pub client_id: Option<ClientId>,
    /// Case-insensitive match on title or number.
    pub search: Option<String>,
}

/// Listing row; enough to render an overview without loading the tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OfferSummary {
    pub id: OfferId,
    pub number: OfferNumber,
    pub title: String,
    pub status: OfferStatus,
    pub client_id: ClientId,
    pub currency: String,
    pub total: Decimal,
    pub valid_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub async fn insert(conn: &mut SqliteConnection, offer: &Offer) -> Result<(), RepositoryError> {
    let totals = offer.totals();
    sqlx::query(
        "INSERT INTO offer (
            id, tenant_id, client_id, created_by, number, title, status, currency,
            valid_until, executive_summary, terms_and_conditions,
            subtotal, discount_total, vat_total, total, revision,
            created_at, updated_at, sent_at, viewed_at, accepted_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&offer.id.0)
    .bind(&offer.tenant_id.0)
    .bind(&offer.client_id.0)
    .bind(&offer.created_by.0)
    .bind(offer.number.as_str())
    .bind(&offer.title)
    .bind(offer.status().as_str())
    .bind(&offer.currency)
    .bind(offer.valid_until.map(|date| date.to_string()))
    .bind(offer.executive_summary.as_deref())
    .bind(offer.terms_and_conditions.as_deref())
    .bind(totals.subtotal.to_string())
    .bind(totals.discount_total.to_string())
    .bind(totals.vat_total.to_string())
    .bind(totals.total.to_string())
    .bind(revision_value(offer.revision())?)
    .bind(offer.created_at.to_rfc3339())
    .bind(offer.updated_at.to_rfc3339())
    .bind(offer.sent_at().map(|value| value.to_rfc3339()))
    .bind(offer.viewed_at().map(|value| value.to_rfc3339()))
    .bind(offer.accepted_at().map(|value| value.to_rfc3339()))
    .execute(&mut *conn)
    .await?;

    insert_sections(conn, offer).await
}

/// Writes scalar fields, totals and status, guarded by the revision the
/// offer was loaded with. On success the in-memory revision is advanced.
pub async fn update(conn: &mut SqliteConnection, offer: &mut Offer) -> Result<(), RepositoryError> {
    let totals = offer.totals().clone();
    let result = sqlx::query(
        "UPDATE offer SET
            client_id = ?,
            title = ?,
            status = ?,
            currency = ?,
            valid_until = ?,
            executive_summary = ?,
            terms_and_conditions = ?,
            subtotal = ?,
            discount_total = ?,
            vat_total = ?,
            total = ?,
            updated_at = ?,
            sent_at = ?,
            viewed_at = ?,
            accepted_at = ?,
            revision = revision + 1
         WHERE id = ? AND tenant_id = ? AND revision = ?",
    )
    .bind(&offer.client_id.0)
    .bind(&offer.title)
    .bind(offer.status().as_str())
    .bind(&offer.currency)
    .bind(offer.valid_until.map(|date| date.to_string()))
    .bind(offer.executive_summary.as_deref())
    .bind(offer.terms_and_conditions.as_deref())
    .bind(totals.subtotal.to_string())
    .bind(totals.discount_total.to_string())
    .bind(totals.vat_total.to_string())
    .bind(totals.total.to_string())
    .bind(offer.updated_at.to_rfc3339())
    .bind(offer.sent_at().map(|value| value.to_rfc3339()))
    .bind(offer.viewed_at().map(|value| value.to_rfc3339()))
    .bind(offer.accepted_at().map(|value| value.to_rfc3339()))
    .bind(&offer.id.0)
    .bind(&offer.tenant_id.0)
    .bind(revision_value(offer.revision())?)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::Stale(format!(
            "offer `{}` changed since revision {}",
            offer.id.0, offer.revision()
        )));
    }
    offer.advance_revision();
    Ok(())
}

/// Deletes the section tree of the offer and writes the current one.
/// Articles go with their sections through `ON DELETE CASCADE`.
pub async fn replace_sections(
    conn: &mut SqliteConnection,
    offer: &Offer,
) -> Result<(), RepositoryError> {
    sqlx::query(
        "DELETE FROM offer_section
         WHERE offer_id = (SELECT id FROM offer WHERE id = ? AND tenant_id = ?)",
    )
    .bind(&offer.id.0)
    .bind(&offer.tenant_id.0)
    .execute(&mut *conn)
    .await?;

    insert_sections(conn, offer).await
}

/// Takes the database write lock for the offer before anything is read, so
/// concurrent mutations of the same offer run one after the other. Returns
/// `false` when the offer does not exist in the tenant.
pub async fn lock(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    id: &OfferId,
) -> Result<bool, RepositoryError> {
    let result = sqlx::query("UPDATE offer SET revision = revision WHERE id = ? AND tenant_id = ?")
        .bind(&id.0)
        .bind(&tenant_id.0)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn load(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    id: &OfferId,
) -> Result<Option<Offer>, RepositoryError> {
    let row = sqlx::query(
        "SELECT id, tenant_id, client_id, created_by, number, title, status, currency,
                valid_until, executive_summary, terms_and_conditions,
                subtotal, discount_total, vat_total, total, revision,
                created_at, updated_at, sent_at, viewed_at, accepted_at
         FROM offer
         WHERE id = ? AND tenant_id = ?",
    )
    .bind(&id.0)
    .bind(&tenant_id.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let sections = load_sections(conn, id).await?;
    let record = row_to_record(&row, sections)?;
    Ok(Some(Offer::rehydrate(record)?))
}

pub async fn list(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    filter: &OfferFilter,
) -> Result<Vec<OfferSummary>, RepositoryError> {
    let status = filter.status.map(|status| status.as_str());
    let client_id = filter.client_id.as_ref().map(|client_id| client_id.0.as_str());
    let search = filter
        .search
        .as_deref()
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| format!("%{term}%"));

    let rows = sqlx::query(
        "SELECT id, number, title, status, client_id, currency, total, valid_until,
                created_at, updated_at
         FROM offer
         WHERE tenant_id = ?
           AND (? IS NULL OR status = ?)
           AND (? IS NULL OR client_id = ?)
           AND (? IS NULL OR title LIKE ? OR number LIKE ?)
         ORDER BY created_at DESC, number DESC",
    )
    .bind(&tenant_id.0)
    .bind(status)
    .bind(status)
    .bind(client_id)
    .bind(client_id)
    .bind(search.as_deref())
    .bind(search.as_deref())
    .bind(search.as_deref())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(row_to_summary).collect()
}

/// Ids of open offers whose validity date lies before `today`.
pub async fn overdue(
    conn: &mut SqliteConnection,
    tenant_id: &TenantId,
    today: NaiveDate,
) -> Result<Vec<OfferId>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, status FROM offer
         WHERE tenant_id = ? AND valid_until IS NOT NULL AND valid_until < ?",
    )
    .bind(&tenant_id.0)
    .bind(today.to_string())
    .fetch_all(&mut *conn)
    .await?;

    let mut ids = Vec::new();
    for row in rows {
        let status: OfferStatus = row.try_get::<String, _>("status")?.parse()?;
        if !status.is_terminal() {
            ids.push(OfferId(row.try_get("id")?));
        }
    }
    Ok(ids)
}

async fn insert_sections(
    conn: &mut SqliteConnection,
    offer: &Offer,
) -> Result<(), RepositoryError> {
    for section in offer.sections() {
        sqlx::query(
            "INSERT INTO offer_section (id, offer_id, title, description, sort_order)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&section.id.0)
        .bind(&offer.id.0)
        .bind(&section.title)
        .bind(section.description.as_deref())
        .bind(i64::from(section.sort_order))
        .execute(&mut *conn)
        .await?;

        for article in section.articles() {
            let pricing = article.pricing();
            sqlx::query(
                "INSERT INTO offer_article (
                    id, section_id, name, description, unit, quantity, unit_price,
                    vat_rate, discount_percent, discount_fixed, total, sort_order
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&article.id.0)
            .bind(&section.id.0)
            .bind(&article.name)
            .bind(article.description.as_deref())
            .bind(&article.unit)
            .bind(pricing.quantity.to_string())
            .bind(pricing.unit_price.to_string())
            .bind(pricing.vat_rate.to_string())
            .bind(pricing.discount_percent.to_string())
            .bind(pricing.discount_fixed.to_string())
            .bind(article.total().to_string())
            .bind(i64::from(article.sort_order))
            .execute(&mut *conn)
            .await?;
        }
    }
    Ok(())
}

async fn load_sections(
    conn: &mut SqliteConnection,
    offer_id: &OfferId,
) -> Result<Vec<Section>, RepositoryError> {
    let article_rows = sqlx::query(
        "SELECT a.id, a.section_id, a.name, a.description, a.unit, a.quantity, a.unit_price,
                a.vat_rate, a.discount_percent, a.discount_fixed, a.total, a.sort_order
         FROM offer_article a
         JOIN offer_section s ON s.id = a.section_id
         WHERE s.offer_id = ?
         ORDER BY a.sort_order ASC",
    )
    .bind(&offer_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut articles: HashMap<String, Vec<Article>> = HashMap::new();
    for row in &article_rows {
        let section_id: String = row.try_get("section_id")?;
        articles.entry(section_id).or_default().push(row_to_article(row)?);
    }

    let section_rows = sqlx::query(
        "SELECT id, title, description, sort_order
         FROM offer_section
         WHERE offer_id = ?
         ORDER BY sort_order ASC",
    )
    .bind(&offer_id.0)
    .fetch_all(&mut *conn)
    .await?;

    section_rows
        .iter()
        .map(|row| -> Result<Section, RepositoryError> {
            let id: String = row.try_get("id")?;
            let section_articles = articles.remove(&id).unwrap_or_default();
            Ok(Section::rehydrate(
                SectionId(id),
                row.try_get("title")?,
                row.try_get("description")?,
                sort_order(row)?,
                section_articles,
            ))
        })
        .collect()
}

fn row_to_article(row: &SqliteRow) -> Result<Article, RepositoryError> {
    let pricing = ArticlePricing {
        quantity: parse_decimal("quantity", row.try_get("quantity")?)?,
        unit_price: parse_decimal("unit_price", row.try_get("unit_price")?)?,
        vat_rate: parse_decimal("vat_rate", row.try_get("vat_rate")?)?,
        discount_percent: parse_decimal("discount_percent", row.try_get("discount_percent")?)?,
        discount_fixed: parse_decimal("discount_fixed", row.try_get("discount_fixed")?)?,
    };
    let draft = ArticleDraft {
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        unit: row.try_get("unit")?,
        pricing,
    };

    Ok(Article::rehydrate(
        ArticleId(row.try_get("id")?),
        sort_order(row)?,
        draft,
        parse_decimal("total", row.try_get("total")?)?,
    )?)
}

fn row_to_record(row: &SqliteRow, sections: Vec<Section>) -> Result<OfferRecord, RepositoryError> {
    let revision: i64 = row.try_get("revision")?;

    Ok(OfferRecord {
        id: OfferId(row.try_get("id")?),
        tenant_id: TenantId(row.try_get("tenant_id")?),
        client_id: ClientId(row.try_get("client_id")?),
        created_by: UserId(row.try_get("created_by")?),
        number: OfferNumber(row.try_get("number")?),
        title: row.try_get("title")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        currency: row.try_get("currency")?,
        valid_until: parse_date("valid_until", row.try_get("valid_until")?)?,
        executive_summary: row.try_get("executive_summary")?,
        terms_and_conditions: row.try_get("terms_and_conditions")?,
        totals: DocumentTotals {
            subtotal: parse_decimal("subtotal", row.try_get("subtotal")?)?,
            discount_total: parse_decimal("discount_total", row.try_get("discount_total")?)?,
            vat_total: parse_decimal("vat_total", row.try_get("vat_total")?)?,
            total: parse_decimal("total", row.try_get("total")?)?,
        },
        sections,
        revision: u64::try_from(revision)
            .map_err(|_| RepositoryError::Decode(format!("invalid revision `{revision}`")))?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
        sent_at: parse_optional_timestamp("sent_at", row.try_get("sent_at")?)?,
        viewed_at: parse_optional_timestamp("viewed_at", row.try_get("viewed_at")?)?,
        accepted_at: parse_optional_timestamp("accepted_at", row.try_get("accepted_at")?)?,
    })
}

fn row_to_summary(row: &SqliteRow) -> Result<OfferSummary, RepositoryError> {
    Ok(OfferSummary {
        id: OfferId(row.try_get("id")?),
        number: OfferNumber(row.try_get("number")?),
        title: row.try_get("title")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        client_id: ClientId(row.try_get("client_id")?),
        currency: row.try_get("currency")?,
        total: parse_decimal("total", row.try_get("total")?)?,
        valid_until: parse_date("valid_until", row.try_get("valid_until")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

fn sort_order(row: &SqliteRow) -> Result<u32, RepositoryError> {
    let value: i64 = row.try_get("sort_order")?;
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("invalid sort_order `{value}`")))
}

fn revision_value(revision: u64) -> Result<i64, RepositoryError> {
    i64::try_from(revision)
        .map_err(|_| RepositoryError::Decode(format!("revision {revision} out of range")))
}
