use chrono::{Days, NaiveDate};
use serde::Serialize;
use sqlx::SqliteConnection;
use tracing::info;

use offercraft_core::activity::{ActivityEvent, ActivityKind};
use offercraft_core::domain::client::{Client, ClientId};
use offercraft_core::domain::offer::{NewOffer, Offer, OfferId};
use offercraft_core::domain::signature::Signature;
use offercraft_core::domain::template::TemplateId;
use offercraft_core::errors::ApplicationError;
use offercraft_core::numbering::{NumberingPeriod, OfferNumber};
use offercraft_core::tenancy::{TenantContext, TenantId};

use super::{commit, OfferService};
use crate::repositories::{
    activity as activity_repo, client as client_repo, offer as offer_repo, sequence,
    signature as signature_repo, OfferFilter, OfferSummary, TemplateRepository,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DuplicateOffer {
    pub title: Option<String>,
    pub client_id: Option<ClientId>,
    pub valid_until: Option<NaiveDate>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferFromTemplate {
    pub client_id: ClientId,
    pub title: Option<String>,
    pub currency: Option<String>,
}

/// Self-contained read model handed to document renderers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OfferDocument {
    pub offer: Offer,
    pub client: Client,
    pub signature: Option<Signature>,
}

impl OfferService {
    /// Creates a draft with the next number of the current month. A missing
    /// currency or validity date falls back to the configured defaults.
    pub async fn create_offer(
        &self,
        ctx: &TenantContext,
        mut draft: NewOffer,
    ) -> Result<Offer, ApplicationError> {
        self.require_client(&ctx.tenant_id, &draft.client_id).await?;
        if draft.currency.trim().is_empty() {
            draft.currency = self.settings.default_currency.clone();
        }
        if draft.valid_until.is_none() {
            draft.valid_until = self
                .today()
                .checked_add_days(Days::new(u64::from(self.settings.default_validity_days)));
        }

        let mut tx = self.begin().await?;
        let offer = self.insert_new_offer(&mut tx, ctx, draft, "Offer created", &[]).await?;
        commit(tx).await?;
        Ok(offer)
    }

    pub async fn create_offer_from_template(
        &self,
        ctx: &TenantContext,
        template_id: &TemplateId,
        request: OfferFromTemplate,
    ) -> Result<Offer, ApplicationError> {
        let template = self
            .templates
            .find_by_id(&ctx.tenant_id, template_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("template", template_id.0.clone()))?;
        self.require_client(&ctx.tenant_id, &request.client_id).await?;

        let currency =
            request.currency.unwrap_or_else(|| self.settings.default_currency.clone());
        let draft =
            template.instantiate(request.client_id, request.title, currency, self.today())?;

        let mut tx = self.begin().await?;
        let offer = self
            .insert_new_offer(
                &mut tx,
                ctx,
                draft,
                &format!("Offer created from template {}", template.name),
                &[("template_id", template.id.0.clone())],
            )
            .await?;
        commit(tx).await?;
        Ok(offer)
    }

    pub async fn get_offer(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<Offer, ApplicationError> {
        let mut tx = self.begin().await?;
        let offer = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        commit(tx).await?;
        Ok(offer)
    }

    /// Newest first. Overdue offers of the tenant are expired before the
    /// listing is read.
    pub async fn list_offers(
        &self,
        ctx: &TenantContext,
        filter: &OfferFilter,
    ) -> Result<Vec<OfferSummary>, ApplicationError> {
        let overdue = {
            let mut conn = self.connection().await?;
            offer_repo::overdue(&mut conn, &ctx.tenant_id, self.today()).await?
        };
        for id in &overdue {
            let mut tx = self.begin().await?;
            self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
            commit(tx).await?;
        }

        let mut conn = self.connection().await?;
        Ok(offer_repo::list(&mut conn, &ctx.tenant_id, filter).await?)
    }

    /// Persists edits made to a loaded offer. The write is refused with a
    /// conflict when the offer changed since it was loaded.
    pub async fn update_offer(
        &self,
        ctx: &TenantContext,
        mut offer: Offer,
    ) -> Result<Offer, ApplicationError> {
        Self::ensure_tenant(ctx, &offer)?;
        self.require_client(&ctx.tenant_id, &offer.client_id).await?;

        let mut tx = self.begin().await?;
        if !offer_repo::lock(&mut tx, &ctx.tenant_id, &offer.id).await? {
            return Err(ApplicationError::not_found("offer", offer.id.0.clone()));
        }
        offer.recompute_totals();
        offer.updated_at = self.now();
        offer_repo::update(&mut tx, &mut offer).await?;
        offer_repo::replace_sections(&mut tx, &offer).await?;
        commit(tx).await?;

        info!(
            event_name = "offer.updated",
            tenant_id = %offer.tenant_id,
            offer_id = %offer.id,
            revision = offer.revision(),
            total = %offer.totals().total,
            "offer updated"
        );
        Ok(offer)
    }

    /// Copies an offer into a new draft. The source gets a `DUPLICATED`
    /// entry, the copy a `CREATED` entry.
    pub async fn duplicate_offer(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        request: DuplicateOffer,
    ) -> Result<Offer, ApplicationError> {
        if let Some(client_id) = &request.client_id {
            self.require_client(&ctx.tenant_id, client_id).await?;
        }

        let mut tx = self.begin().await?;
        let source = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        let number = self.next_number(&mut tx, ctx).await?;
        let now = self.now();
        let copy = source.duplicate(
            ctx,
            number,
            request.title,
            request.client_id,
            request.valid_until,
            now,
        )?;
        offer_repo::insert(&mut tx, &copy).await?;

        self.record_activity(
            &mut tx,
            ActivityEvent::new(
                source.tenant_id.clone(),
                source.id.clone(),
                ActivityKind::Duplicated,
                ctx.actor(),
                format!("Offer duplicated as {}", copy.number),
                now,
            )
            .with_metadata("duplicate_id", copy.id.0.clone()),
        )
        .await?;
        self.record_activity(
            &mut tx,
            ActivityEvent::new(
                copy.tenant_id.clone(),
                copy.id.clone(),
                ActivityKind::Created,
                ctx.actor(),
                format!("Offer created as duplicate of {}", source.number),
                now,
            )
            .with_metadata("original_id", source.id.0.clone()),
        )
        .await?;
        commit(tx).await?;

        info!(
            event_name = "offer.duplicated",
            tenant_id = %ctx.tenant_id,
            offer_id = %copy.id,
            source_offer_id = %source.id,
            number = %copy.number,
            "offer duplicated"
        );
        Ok(copy)
    }

    pub async fn list_activity(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<Vec<ActivityEvent>, ApplicationError> {
        let mut conn = self.connection().await?;
        self.read_offer(&mut conn, &ctx.tenant_id, id).await?;
        Ok(activity_repo::list_for_offer(&mut conn, &ctx.tenant_id, id).await?)
    }

    /// Offer, client and signature in one document.
    pub async fn export_offer(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<OfferDocument, ApplicationError> {
        let offer = self.get_offer(ctx, id).await?;
        let mut conn = self.connection().await?;
        let client = client_repo::find(&mut conn, &ctx.tenant_id, &offer.client_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("client", offer.client_id.0.clone()))?;
        let signature = signature_repo::find_for_offer(&mut conn, &ctx.tenant_id, id).await?;
        Ok(OfferDocument { offer, client, signature })
    }

    /// Plain read without locking or expiry.
    pub(super) async fn read_offer(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &TenantId,
        id: &OfferId,
    ) -> Result<Offer, ApplicationError> {
        offer_repo::load(conn, tenant_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("offer", id.0.clone()))
    }

    async fn next_number(
        &self,
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
    ) -> Result<OfferNumber, ApplicationError> {
        Ok(sequence::next_offer_number(
            conn,
            &ctx.tenant_id,
            &self.settings.number_prefix,
            NumberingPeriod::from_date(self.today()),
        )
        .await?)
    }

    /// Numbers, validates and stores a new offer. The sequence increment is
    /// the first write of the transaction.
    async fn insert_new_offer(
        &self,
        conn: &mut SqliteConnection,
        ctx: &TenantContext,
        draft: NewOffer,
        description: &str,
        metadata: &[(&str, String)],
    ) -> Result<Offer, ApplicationError> {
        let number = self.next_number(conn, ctx).await?;
        let now = self.now();
        let offer = Offer::create(ctx, number, draft, now)?;
        offer_repo::insert(conn, &offer).await?;

        let event = metadata.iter().fold(
            ActivityEvent::new(
                offer.tenant_id.clone(),
                offer.id.clone(),
                ActivityKind::Created,
                ctx.actor(),
                description,
                now,
            )
            .with_metadata("number", offer.number.to_string()),
            |event, (key, value)| event.with_metadata(*key, value.clone()),
        );
        self.record_activity(conn, event).await?;

        info!(
            event_name = "offer.created",
            tenant_id = %offer.tenant_id,
            offer_id = %offer.id,
            number = %offer.number,
            total = %offer.totals().total,
            "offer created"
        );
        Ok(offer)
    }
}
