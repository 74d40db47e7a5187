use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::offer::{ArticleDraft, DEFAULT_UNIT};
use crate::errors::DomainError;
use crate::pricing::ArticlePricing;
use crate::tenancy::{TenantContext, TenantId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleTemplateId(pub String);

impl ArticleTemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ArticleTemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticleTemplate {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    /// Defaults to `pcs`.
    pub unit: Option<String>,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
}

impl NewArticleTemplate {
    pub fn new(name: impl Into<String>, unit_price: Decimal, vat_rate: Decimal) -> Self {
        Self {
            name: name.into(),
            description: None,
            category: None,
            unit: None,
            unit_price,
            vat_rate,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

/// Catalogue entry line items are picked from. Retired entries stay stored
/// with `active = false` and drop out of listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleTemplate {
    pub id: ArticleTemplateId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub unit: String,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing filter. `search` matches name or description, ignoring case.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArticleTemplateFilter {
    pub category: Option<String>,
    pub search: Option<String>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

struct ValidatedFields {
    name: String,
    description: Option<String>,
    category: Option<String>,
    unit: String,
    unit_price: Decimal,
    vat_rate: Decimal,
}

fn validate(draft: NewArticleTemplate) -> Result<ValidatedFields, DomainError> {
    let name = draft.name.trim().to_string();
    if name.is_empty() {
        return Err(DomainError::validation("article_template.name", "is required"));
    }
    ArticlePricing::new(Decimal::ONE, draft.unit_price, draft.vat_rate).validate()?;

    Ok(ValidatedFields {
        name,
        description: trimmed(draft.description),
        category: trimmed(draft.category),
        unit: trimmed(draft.unit).unwrap_or_else(|| DEFAULT_UNIT.to_string()),
        unit_price: draft.unit_price,
        vat_rate: draft.vat_rate,
    })
}

impl ArticleTemplate {
    pub fn create(
        ctx: &TenantContext,
        draft: NewArticleTemplate,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let fields = validate(draft)?;
        Ok(Self {
            id: ArticleTemplateId::generate(),
            tenant_id: ctx.tenant_id.clone(),
            name: fields.name,
            description: fields.description,
            category: fields.category,
            unit: fields.unit,
            unit_price: fields.unit_price,
            vat_rate: fields.vat_rate,
            active: true,
            created_at: now,
            updated_at: now,
        })
    }

    /// Replaces every editable field; id, tenant and creation time stay.
    pub fn update(
        &mut self,
        draft: NewArticleTemplate,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let fields = validate(draft)?;
        self.name = fields.name;
        self.description = fields.description;
        self.category = fields.category;
        self.unit = fields.unit;
        self.unit_price = fields.unit_price;
        self.vat_rate = fields.vat_rate;
        self.updated_at = now;
        Ok(())
    }

    pub fn retire(&mut self, now: DateTime<Utc>) {
        self.active = false;
        self.updated_at = now;
    }

    /// Line item priced from this entry, without discounts.
    pub fn to_article(&self, quantity: Decimal) -> Result<ArticleDraft, DomainError> {
        let pricing = ArticlePricing::new(quantity, self.unit_price, self.vat_rate);
        pricing.validate()?;

        let mut draft = ArticleDraft::new(self.name.clone(), pricing).with_unit(self.unit.clone());
        if let Some(description) = &self.description {
            draft = draft.with_description(description.clone());
        }
        Ok(draft)
    }
}
