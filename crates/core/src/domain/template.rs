use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::client::ClientId;
use crate::domain::offer::{build_sections, NewOffer, Offer, SectionDraft};
use crate::errors::DomainError;
use crate::tenancy::{TenantContext, TenantId};

pub const DEFAULT_VALIDITY_DAYS: u32 = 30;
pub const MAX_VALIDITY_DAYS: u32 = 365;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateId(pub String);

impl TemplateId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTemplate {
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sections: Vec<SectionDraft>,
    pub terms: Option<String>,
    pub validity_days: Option<u32>,
}

/// Reusable offer skeleton. Sections are stored as typed drafts and are
/// validated on creation and again when parsed back from storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferTemplate {
    pub id: TemplateId,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub sections: Vec<SectionDraft>,
    pub terms: Option<String>,
    pub validity_days: u32,
    pub created_at: DateTime<Utc>,
}

pub fn validate_validity_days(days: u32) -> Result<(), DomainError> {
    if !(1..=MAX_VALIDITY_DAYS).contains(&days) {
        return Err(DomainError::validation(
            "validity_days",
            format!("must be between 1 and {MAX_VALIDITY_DAYS}, got {days}"),
        ));
    }
    Ok(())
}

impl OfferTemplate {
    pub fn create(
        ctx: &TenantContext,
        draft: NewTemplate,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if draft.name.trim().is_empty() {
            return Err(DomainError::validation("template.name", "is required"));
        }
        let validity_days = draft.validity_days.unwrap_or(DEFAULT_VALIDITY_DAYS);
        validate_validity_days(validity_days)?;
        build_sections(draft.sections.clone())?;

        Ok(Self {
            id: TemplateId::generate(),
            tenant_id: ctx.tenant_id.clone(),
            name: draft.name.trim().to_string(),
            description: draft.description,
            category: draft.category,
            sections: draft.sections,
            terms: draft.terms,
            validity_days,
            created_at: now,
        })
    }

    /// Template capturing the content of an existing offer.
    pub fn from_offer(
        ctx: &TenantContext,
        offer: &Offer,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Self::create(
            ctx,
            NewTemplate {
                name: name.into(),
                description: offer.executive_summary.clone(),
                category: None,
                sections: offer.sections().iter().map(|section| section.to_draft()).collect(),
                terms: offer.terms_and_conditions.clone(),
                validity_days: None,
            },
            now,
        )
    }

    pub fn sections_json(&self) -> Result<String, DomainError> {
        serde_json::to_string(&self.sections)
            .map_err(|error| DomainError::validation("template.sections", error.to_string()))
    }

    pub fn parse_sections(raw: &str) -> Result<Vec<SectionDraft>, DomainError> {
        let sections: Vec<SectionDraft> = serde_json::from_str(raw)
            .map_err(|error| DomainError::validation("template.sections", error.to_string()))?;
        build_sections(sections.clone())?;
        Ok(sections)
    }

    pub fn valid_until(&self, today: NaiveDate) -> Result<NaiveDate, DomainError> {
        today.checked_add_days(Days::new(u64::from(self.validity_days))).ok_or_else(|| {
            DomainError::validation("validity_days", "validity date is out of range")
        })
    }

    /// Offer input derived from the template. The title defaults to the
    /// template name.
    pub fn instantiate(
        &self,
        client_id: ClientId,
        title: Option<String>,
        currency: impl Into<String>,
        today: NaiveDate,
    ) -> Result<NewOffer, DomainError> {
        Ok(NewOffer {
            client_id,
            title: title.unwrap_or_else(|| self.name.clone()),
            currency: currency.into(),
            valid_until: Some(self.valid_until(today)?),
            executive_summary: self.description.clone(),
            terms_and_conditions: self.terms.clone(),
            sections: self.sections.clone(),
        })
    }
}
