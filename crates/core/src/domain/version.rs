//! Immutable offer snapshots.
//!
//! A snapshot captures the editable content of an offer: scalar fields, the
//! computed totals and the full section/article tree. Identifiers and status
//! are not part of the content, so restoring version N and
//! snapshotting again yields content equal to version N (and the same
//! content hash).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::offer::{
    validate_currency, Article, ArticleDraft, ArticleId, Offer, OfferId, OfferStatus, Section,
    SectionId,
};
use crate::errors::DomainError;
use crate::pricing::{ArticlePricing, DocumentTotals};
use crate::tenancy::{TenantId, UserId};

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionId(pub String);

impl VersionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotScalars {
    pub title: String,
    pub currency: String,
    pub valid_until: Option<NaiveDate>,
    pub executive_summary: Option<String>,
    pub terms_and_conditions: Option<String>,
    pub subtotal: Decimal,
    pub discount_total: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotArticle {
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub discount_percent: Decimal,
    pub discount_fixed: Decimal,
    pub total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSection {
    pub title: String,
    pub description: Option<String>,
    pub articles: Vec<SnapshotArticle>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotContent {
    pub schema_version: u32,
    pub offer: SnapshotScalars,
    pub sections: Vec<SnapshotSection>,
}

impl SnapshotArticle {
    fn capture(article: &Article) -> Self {
        let pricing = article.pricing();
        Self {
            name: article.name.clone(),
            description: article.description.clone(),
            unit: article.unit.clone(),
            quantity: pricing.quantity,
            unit_price: pricing.unit_price,
            vat_rate: pricing.vat_rate,
            discount_percent: pricing.discount_percent,
            discount_fixed: pricing.discount_fixed,
            total: article.total(),
        }
    }

    fn to_draft(&self) -> ArticleDraft {
        ArticleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            pricing: ArticlePricing {
                quantity: self.quantity,
                unit_price: self.unit_price,
                vat_rate: self.vat_rate,
                discount_percent: self.discount_percent,
                discount_fixed: self.discount_fixed,
            },
        }
    }
}

impl SnapshotContent {
    pub fn capture(offer: &Offer) -> Self {
        let totals = offer.totals();
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            offer: SnapshotScalars {
                title: offer.title.clone(),
                currency: offer.currency.clone(),
                valid_until: offer.valid_until,
                executive_summary: offer.executive_summary.clone(),
                terms_and_conditions: offer.terms_and_conditions.clone(),
                subtotal: totals.subtotal,
                discount_total: totals.discount_total,
                vat_total: totals.vat_total,
                total: totals.total,
            },
            sections: offer
                .sections()
                .iter()
                .map(|section| SnapshotSection {
                    title: section.title.clone(),
                    description: section.description.clone(),
                    articles: section.articles().iter().map(SnapshotArticle::capture).collect(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(self)
            .map_err(|error| DomainError::validation("snapshot", error.to_string()))
    }

    /// Parses stored content and validates it before anything else may use it.
    pub fn from_json(raw: &str) -> Result<Self, DomainError> {
        let content: Self = serde_json::from_str(raw)
            .map_err(|error| DomainError::validation("snapshot", error.to_string()))?;
        content.build_sections()?;
        Ok(content)
    }

    /// BLAKE3 fingerprint of the canonical JSON encoding.
    pub fn content_hash(&self) -> Result<String, DomainError> {
        let json = self.to_json()?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn totals(&self) -> DocumentTotals {
        DocumentTotals {
            subtotal: self.offer.subtotal,
            discount_total: self.offer.discount_total,
            vat_total: self.offer.vat_total,
            total: self.offer.total,
        }
    }

    /// Rebuilds the section tree with fresh ids, checking that every stored
    /// total is reproduced by the calculator.
    pub fn build_sections(&self) -> Result<Vec<Section>, DomainError> {
        if self.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(DomainError::validation(
                "snapshot.schema_version",
                format!("unsupported schema version {}", self.schema_version),
            ));
        }
        validate_currency(&self.offer.currency)?;

        let mut totals = DocumentTotals::default();
        let mut sections = Vec::with_capacity(self.sections.len());
        for (section_index, section) in self.sections.iter().enumerate() {
            let articles = section
                .articles
                .iter()
                .enumerate()
                .map(|(index, article)| {
                    Article::rehydrate(
                        ArticleId::generate(),
                        index as u32,
                        article.to_draft(),
                        article.total,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let section = Section::rehydrate(
                SectionId::generate(),
                section.title.clone(),
                section.description.clone(),
                section_index as u32,
                articles,
            );
            totals.merge(section.totals());
            sections.push(section);
        }

        if totals != self.totals() {
            return Err(DomainError::validation(
                "snapshot.totals",
                format!(
                    "stored total {} differs from recomputed {}",
                    self.offer.total, totals.total
                ),
            ));
        }
        Ok(sections)
    }

    /// Writes the captured content back onto `offer`, replacing its whole
    /// section tree. Nothing changes when the content fails validation.
    pub fn apply_to(&self, offer: &mut Offer) -> Result<(), DomainError> {
        let sections = self.build_sections()?;
        offer.rename(self.offer.title.clone())?;
        offer.currency = self.offer.currency.clone();
        offer.valid_until = self.offer.valid_until;
        offer.executive_summary = self.offer.executive_summary.clone();
        offer.terms_and_conditions = self.offer.terms_and_conditions.clone();
        offer.replace_sections(sections);
        Ok(())
    }
}

/// Data needed to append a version; the store assigns the number.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewVersion {
    pub id: VersionId,
    pub offer_id: OfferId,
    pub tenant_id: TenantId,
    pub content: SnapshotContent,
    pub content_hash: String,
    pub status_at_capture: OfferStatus,
    pub author_id: UserId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl NewVersion {
    pub fn capture(
        offer: &Offer,
        author_id: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let content = SnapshotContent::capture(offer);
        let content_hash = content.content_hash()?;
        Ok(Self {
            id: VersionId::generate(),
            offer_id: offer.id.clone(),
            tenant_id: offer.tenant_id.clone(),
            content,
            content_hash,
            status_at_capture: offer.status(),
            author_id,
            note: note.map(|note| note.trim().to_string()).filter(|note| !note.is_empty()),
            created_at: now,
        })
    }

    pub fn into_version(self, version: u32) -> OfferVersion {
        OfferVersion {
            id: self.id,
            offer_id: self.offer_id,
            tenant_id: self.tenant_id,
            version,
            content: self.content,
            content_hash: self.content_hash,
            status_at_capture: self.status_at_capture,
            author_id: self.author_id,
            note: self.note,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferVersion {
    pub id: VersionId,
    pub offer_id: OfferId,
    pub tenant_id: TenantId,
    pub version: u32,
    pub content: SnapshotContent,
    pub content_hash: String,
    pub status_at_capture: OfferStatus,
    pub author_id: UserId,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn backup_note(target_version: u32) -> String {
    format!("Automatic backup before restoring version {target_version}")
}
