use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::client::ClientId;
use crate::errors::DomainError;
use crate::numbering::OfferNumber;
use crate::pricing::{calculate_line, ArticlePricing, DocumentTotals, LineBreakdown};
use crate::tenancy::{TenantContext, TenantId, UserId};

pub const DEFAULT_UNIT: &str = "pcs";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectionId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(pub String);

impl OfferId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl SectionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl ArticleId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    Draft,
    PendingApproval,
    Sent,
    Viewed,
    Accepted,
    Rejected,
    Won,
    Lost,
    Expired,
}

impl OfferStatus {
    pub const ALL: [OfferStatus; 9] = [
        Self::Draft,
        Self::PendingApproval,
        Self::Sent,
        Self::Viewed,
        Self::Accepted,
        Self::Rejected,
        Self::Won,
        Self::Lost,
        Self::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::Sent => "SENT",
            Self::Viewed => "VIEWED",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Won => "WON",
            Self::Lost => "LOST",
            Self::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Rejected | Self::Won | Self::Lost | Self::Expired)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OfferStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| DomainError::validation("status", format!("unknown status `{value}`")))
    }
}

/// Editable fields of an article. The computed amounts are never part of a
/// draft; they are always derived from `pricing`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub pricing: ArticlePricing,
}

impl ArticleDraft {
    pub fn new(name: impl Into<String>, pricing: ArticlePricing) -> Self {
        Self { name: name.into(), description: None, unit: DEFAULT_UNIT.to_string(), pricing }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("article.name", "is required"));
        }
        if self.unit.trim().is_empty() {
            return Err(DomainError::validation("article.unit", "is required"));
        }
        self.pricing.validate()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Article {
    pub id: ArticleId,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub sort_order: u32,
    pricing: ArticlePricing,
    breakdown: LineBreakdown,
}

impl Article {
    pub fn new(id: ArticleId, sort_order: u32, draft: ArticleDraft) -> Result<Self, DomainError> {
        draft.validate()?;
        let breakdown = calculate_line(&draft.pricing)?;
        Ok(Self {
            id,
            name: draft.name,
            description: draft.description,
            unit: draft.unit,
            sort_order,
            pricing: draft.pricing,
            breakdown,
        })
    }

    /// Rebuilds a persisted article, refusing a stored total that the
    /// calculator does not reproduce.
    pub fn rehydrate(
        id: ArticleId,
        sort_order: u32,
        draft: ArticleDraft,
        stored_total: Decimal,
    ) -> Result<Self, DomainError> {
        let article = Self::new(id, sort_order, draft)?;
        if article.total() != stored_total {
            return Err(DomainError::validation(
                "article.total",
                format!(
                    "stored total {stored_total} of article `{}` differs from recomputed {}",
                    article.id.0,
                    article.total()
                ),
            ));
        }
        Ok(article)
    }

    pub fn pricing(&self) -> &ArticlePricing {
        &self.pricing
    }

    pub fn breakdown(&self) -> &LineBreakdown {
        &self.breakdown
    }

    pub fn total(&self) -> Decimal {
        self.breakdown.total
    }

    pub fn to_draft(&self) -> ArticleDraft {
        ArticleDraft {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            pricing: self.pricing.clone(),
        }
    }

    fn apply(&mut self, draft: ArticleDraft) -> Result<(), DomainError> {
        draft.validate()?;
        let breakdown = calculate_line(&draft.pricing)?;
        self.name = draft.name;
        self.description = draft.description;
        self.unit = draft.unit;
        self.pricing = draft.pricing;
        self.breakdown = breakdown;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionDraft {
    pub title: String,
    pub description: Option<String>,
    pub articles: Vec<ArticleDraft>,
}

impl SectionDraft {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), description: None, articles: Vec::new() }
    }

    pub fn with_article(mut self, article: ArticleDraft) -> Self {
        self.articles.push(article);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Section {
    pub id: SectionId,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: u32,
    articles: Vec<Article>,
    totals: DocumentTotals,
}

impl Section {
    pub fn from_draft(
        id: SectionId,
        sort_order: u32,
        draft: SectionDraft,
    ) -> Result<Self, DomainError> {
        if draft.title.trim().is_empty() {
            return Err(DomainError::validation("section.title", "is required"));
        }
        let articles = draft
            .articles
            .into_iter()
            .enumerate()
            .map(|(index, article)| Article::new(ArticleId::generate(), index as u32, article))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::rehydrate(id, draft.title, draft.description, sort_order, articles))
    }

    /// Assembles a section from persisted articles, ordered by their sort key.
    pub fn rehydrate(
        id: SectionId,
        title: String,
        description: Option<String>,
        sort_order: u32,
        mut articles: Vec<Article>,
    ) -> Self {
        articles.sort_by_key(|article| article.sort_order);
        let totals = DocumentTotals::default();
        let mut section = Self { id, title, description, sort_order, articles, totals };
        section.recompute();
        section
    }

    pub fn articles(&self) -> &[Article] {
        &self.articles
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn to_draft(&self) -> SectionDraft {
        SectionDraft {
            title: self.title.clone(),
            description: self.description.clone(),
            articles: self.articles.iter().map(Article::to_draft).collect(),
        }
    }

    fn recompute(&mut self) {
        for (index, article) in self.articles.iter_mut().enumerate() {
            article.sort_order = index as u32;
        }
        self.totals = DocumentTotals::from_lines(self.articles.iter().map(Article::breakdown));
    }
}

/// Input for creating an offer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOffer {
    pub client_id: ClientId,
    pub title: String,
    pub currency: String,
    pub valid_until: Option<NaiveDate>,
    pub executive_summary: Option<String>,
    pub terms_and_conditions: Option<String>,
    pub sections: Vec<SectionDraft>,
}

/// Every persisted column of an offer, used to rebuild the aggregate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferRecord {
    pub id: OfferId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub created_by: UserId,
    pub number: OfferNumber,
    pub title: String,
    pub status: OfferStatus,
    pub currency: String,
    pub valid_until: Option<NaiveDate>,
    pub executive_summary: Option<String>,
    pub terms_and_conditions: Option<String>,
    pub totals: DocumentTotals,
    pub sections: Vec<Section>,
    pub revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
}

/// Offer aggregate root.
///
/// Sections, articles and totals are only reachable through methods that
/// recompute the totals, and the status only changes through
/// [`crate::lifecycle`]. The serialized form is the complete read model
/// consumed by document export.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Offer {
    pub id: OfferId,
    pub tenant_id: TenantId,
    pub client_id: ClientId,
    pub created_by: UserId,
    pub number: OfferNumber,
    pub title: String,
    pub currency: String,
    pub valid_until: Option<NaiveDate>,
    pub executive_summary: Option<String>,
    pub terms_and_conditions: Option<String>,
    pub(crate) status: OfferStatus,
    sections: Vec<Section>,
    totals: DocumentTotals,
    revision: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub(crate) sent_at: Option<DateTime<Utc>>,
    pub(crate) viewed_at: Option<DateTime<Utc>>,
    pub(crate) accepted_at: Option<DateTime<Utc>>,
}

pub fn validate_currency(currency: &str) -> Result<(), DomainError> {
    if currency.len() != 3 || !currency.bytes().all(|byte| byte.is_ascii_uppercase()) {
        return Err(DomainError::validation(
            "currency",
            format!("must be a three letter ISO-4217 code, got `{currency}`"),
        ));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), DomainError> {
    if title.trim().is_empty() {
        return Err(DomainError::validation("title", "is required"));
    }
    Ok(())
}

pub(crate) fn build_sections(drafts: Vec<SectionDraft>) -> Result<Vec<Section>, DomainError> {
    drafts
        .into_iter()
        .enumerate()
        .map(|(index, draft)| Section::from_draft(SectionId::generate(), index as u32, draft))
        .collect()
}

impl Offer {
    pub fn create(
        ctx: &TenantContext,
        number: OfferNumber,
        draft: NewOffer,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        validate_title(&draft.title)?;
        validate_currency(&draft.currency)?;
        let sections = build_sections(draft.sections)?;

        let mut offer = Self {
            id: OfferId::generate(),
            tenant_id: ctx.tenant_id.clone(),
            client_id: draft.client_id,
            created_by: ctx.user_id.clone(),
            number,
            title: draft.title,
            currency: draft.currency,
            valid_until: draft.valid_until,
            executive_summary: draft.executive_summary,
            terms_and_conditions: draft.terms_and_conditions,
            status: OfferStatus::Draft,
            sections,
            totals: DocumentTotals::default(),
            revision: 0,
            created_at: now,
            updated_at: now,
            sent_at: None,
            viewed_at: None,
            accepted_at: None,
        };
        offer.recompute_totals();
        Ok(offer)
    }

    pub fn rehydrate(record: OfferRecord) -> Result<Self, DomainError> {
        let mut sections = record.sections;
        sections.sort_by_key(|section| section.sort_order);

        let mut offer = Self {
            id: record.id,
            tenant_id: record.tenant_id,
            client_id: record.client_id,
            created_by: record.created_by,
            number: record.number,
            title: record.title,
            currency: record.currency,
            valid_until: record.valid_until,
            executive_summary: record.executive_summary,
            terms_and_conditions: record.terms_and_conditions,
            status: record.status,
            sections,
            totals: DocumentTotals::default(),
            revision: record.revision,
            created_at: record.created_at,
            updated_at: record.updated_at,
            sent_at: record.sent_at,
            viewed_at: record.viewed_at,
            accepted_at: record.accepted_at,
        };
        offer.recompute_totals();

        if offer.totals != record.totals {
            return Err(DomainError::validation(
                "totals",
                format!(
                    "stored totals of offer `{}` ({}) differ from recomputed ({})",
                    offer.id.0, record.totals.total, offer.totals.total
                ),
            ));
        }
        Ok(offer)
    }

    /// Copies the content into a fresh draft with a new number.
    pub fn duplicate(
        &self,
        ctx: &TenantContext,
        number: OfferNumber,
        title: Option<String>,
        client_id: Option<ClientId>,
        valid_until: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        let draft = NewOffer {
            client_id: client_id.unwrap_or_else(|| self.client_id.clone()),
            title: title.unwrap_or_else(|| format!("{} (Copy)", self.title)),
            currency: self.currency.clone(),
            valid_until,
            executive_summary: self.executive_summary.clone(),
            terms_and_conditions: self.terms_and_conditions.clone(),
            sections: self.sections.iter().map(Section::to_draft).collect(),
        };
        Self::create(ctx, number, draft, now)
    }

    pub fn status(&self) -> OfferStatus {
        self.status
    }

    /// Storage revision this offer was loaded at; guards optimistic saves.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Called by the store after a guarded write succeeded.
    pub fn advance_revision(&mut self) {
        self.revision += 1;
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn totals(&self) -> &DocumentTotals {
        &self.totals
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.sent_at
    }

    pub fn viewed_at(&self) -> Option<DateTime<Utc>> {
        self.viewed_at
    }

    pub fn accepted_at(&self) -> Option<DateTime<Utc>> {
        self.accepted_at
    }

    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|section| &section.id == id)
    }

    pub fn article(&self, id: &ArticleId) -> Option<&Article> {
        self.sections.iter().flat_map(|section| section.articles.iter()).find(|a| &a.id == id)
    }

    pub fn articles(&self) -> impl Iterator<Item = &Article> {
        self.sections.iter().flat_map(|section| section.articles.iter())
    }

    pub fn rename(&mut self, title: impl Into<String>) -> Result<(), DomainError> {
        let title = title.into();
        validate_title(&title)?;
        self.title = title;
        Ok(())
    }

    pub fn add_section(&mut self, draft: SectionDraft) -> Result<SectionId, DomainError> {
        let section =
            Section::from_draft(SectionId::generate(), self.sections.len() as u32, draft)?;
        let id = section.id.clone();
        self.sections.push(section);
        self.recompute_totals();
        Ok(id)
    }

    pub fn remove_section(&mut self, id: &SectionId) -> Result<(), DomainError> {
        let index = self.section_index(id)?;
        self.sections.remove(index);
        self.recompute_totals();
        Ok(())
    }

    pub fn add_article(
        &mut self,
        section_id: &SectionId,
        draft: ArticleDraft,
    ) -> Result<ArticleId, DomainError> {
        let index = self.section_index(section_id)?;
        let section = &mut self.sections[index];
        let article = Article::new(ArticleId::generate(), section.articles.len() as u32, draft)?;
        let id = article.id.clone();
        section.articles.push(article);
        self.recompute_totals();
        Ok(id)
    }

    pub fn update_article(
        &mut self,
        id: &ArticleId,
        draft: ArticleDraft,
    ) -> Result<(), DomainError> {
        let article = self
            .sections
            .iter_mut()
            .flat_map(|section| section.articles.iter_mut())
            .find(|article| &article.id == id)
            .ok_or_else(|| DomainError::UnknownMember { entity: "article", id: id.0.clone() })?;
        article.apply(draft)?;
        self.recompute_totals();
        Ok(())
    }

    pub fn remove_article(&mut self, id: &ArticleId) -> Result<(), DomainError> {
        let (section_index, article_index) = self
            .sections
            .iter()
            .enumerate()
            .find_map(|(section_index, section)| {
                section
                    .articles
                    .iter()
                    .position(|article| &article.id == id)
                    .map(|article_index| (section_index, article_index))
            })
            .ok_or_else(|| DomainError::UnknownMember { entity: "article", id: id.0.clone() })?;
        self.sections[section_index].articles.remove(article_index);
        self.recompute_totals();
        Ok(())
    }

    /// Recomputes section and document totals from the articles. Running it
    /// twice in a row yields the same totals.
    pub fn recompute_totals(&mut self) -> &DocumentTotals {
        let mut totals = DocumentTotals::default();
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.sort_order = index as u32;
            section.recompute();
            totals.merge(&section.totals);
        }
        self.totals = totals;
        &self.totals
    }

    /// True when the validity date lies before `today` and the offer has not
    /// reached a terminal status yet.
    pub fn is_past_deadline(&self, today: NaiveDate) -> bool {
        !self.status.is_terminal() && self.valid_until.is_some_and(|deadline| deadline < today)
    }

    /// Replaces the whole section tree. The caller must have validated the
    /// new sections.
    pub(crate) fn replace_sections(&mut self, sections: Vec<Section>) {
        self.sections = sections;
        self.recompute_totals();
    }

    fn section_index(&self, id: &SectionId) -> Result<usize, DomainError> {
        self.sections
            .iter()
            .position(|section| &section.id == id)
            .ok_or_else(|| DomainError::UnknownMember { entity: "section", id: id.0.clone() })
    }
}
