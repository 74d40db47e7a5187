use rust_decimal::Decimal;
use tracing::info;

use offercraft_core::domain::article_template::{
    ArticleTemplate, ArticleTemplateFilter, ArticleTemplateId, NewArticleTemplate,
};
use offercraft_core::domain::client::{Client, ClientId, NewClient};
use offercraft_core::domain::offer::{ArticleDraft, OfferId};
use offercraft_core::domain::template::{NewTemplate, OfferTemplate};
use offercraft_core::errors::ApplicationError;
use offercraft_core::tenancy::TenantContext;

use super::OfferService;
use crate::repositories::{ArticleTemplateRepository, ClientRepository, TemplateRepository};

impl OfferService {
    pub async fn create_client(
        &self,
        ctx: &TenantContext,
        draft: NewClient,
    ) -> Result<Client, ApplicationError> {
        let client = Client::create(ctx, draft, self.now())?;
        self.clients.save(client.clone()).await?;
        info!(
            event_name = "client.created",
            tenant_id = %client.tenant_id,
            client_id = %client.id,
            "client created"
        );
        Ok(client)
    }

    pub async fn get_client(
        &self,
        ctx: &TenantContext,
        id: &ClientId,
    ) -> Result<Client, ApplicationError> {
        self.require_client(&ctx.tenant_id, id).await
    }

    pub async fn list_clients(&self, ctx: &TenantContext) -> Result<Vec<Client>, ApplicationError> {
        Ok(self.clients.list(&ctx.tenant_id).await?)
    }

    pub async fn create_template(
        &self,
        ctx: &TenantContext,
        draft: NewTemplate,
    ) -> Result<OfferTemplate, ApplicationError> {
        let template = OfferTemplate::create(ctx, draft, self.now())?;
        self.templates.save(template.clone()).await?;
        info!(
            event_name = "template.created",
            tenant_id = %template.tenant_id,
            template_id = %template.id.0,
            "offer template created"
        );
        Ok(template)
    }

    /// Template holding the current content of an offer.
    pub async fn create_template_from_offer(
        &self,
        ctx: &TenantContext,
        offer_id: &OfferId,
        name: &str,
    ) -> Result<OfferTemplate, ApplicationError> {
        let offer = {
            let mut conn = self.connection().await?;
            self.read_offer(&mut conn, &ctx.tenant_id, offer_id).await?
        };
        let template = OfferTemplate::from_offer(ctx, &offer, name, self.now())?;
        self.templates.save(template.clone()).await?;
        Ok(template)
    }

    pub async fn list_templates(
        &self,
        ctx: &TenantContext,
    ) -> Result<Vec<OfferTemplate>, ApplicationError> {
        Ok(self.templates.list(&ctx.tenant_id).await?)
    }

    pub async fn create_article_template(
        &self,
        ctx: &TenantContext,
        draft: NewArticleTemplate,
    ) -> Result<ArticleTemplate, ApplicationError> {
        let template = ArticleTemplate::create(ctx, draft, self.now())?;
        self.article_templates.save(template.clone()).await?;
        info!(
            event_name = "article_template.created",
            tenant_id = %template.tenant_id,
            article_template_id = %template.id,
            "article template created"
        );
        Ok(template)
    }

    pub async fn get_article_template(
        &self,
        ctx: &TenantContext,
        id: &ArticleTemplateId,
    ) -> Result<ArticleTemplate, ApplicationError> {
        self.article_templates
            .find_by_id(&ctx.tenant_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("article_template", id.0.clone()))
    }

    /// Active catalogue entries, narrowed by category and search term.
    pub async fn list_article_templates(
        &self,
        ctx: &TenantContext,
        filter: &ArticleTemplateFilter,
    ) -> Result<Vec<ArticleTemplate>, ApplicationError> {
        Ok(self.article_templates.list(&ctx.tenant_id, filter).await?)
    }

    pub async fn article_template_categories(
        &self,
        ctx: &TenantContext,
    ) -> Result<Vec<String>, ApplicationError> {
        Ok(self.article_templates.categories(&ctx.tenant_id).await?)
    }

    pub async fn update_article_template(
        &self,
        ctx: &TenantContext,
        id: &ArticleTemplateId,
        draft: NewArticleTemplate,
    ) -> Result<ArticleTemplate, ApplicationError> {
        let mut template = self.get_article_template(ctx, id).await?;
        template.update(draft, self.now())?;
        self.article_templates.save(template.clone()).await?;
        info!(
            event_name = "article_template.updated",
            tenant_id = %template.tenant_id,
            article_template_id = %template.id,
            "article template updated"
        );
        Ok(template)
    }

    /// Hides the entry from listings; offers that already used it keep
    /// their copied lines.
    pub async fn deactivate_article_template(
        &self,
        ctx: &TenantContext,
        id: &ArticleTemplateId,
    ) -> Result<(), ApplicationError> {
        let mut template = self.get_article_template(ctx, id).await?;
        if !template.active {
            return Ok(());
        }
        template.retire(self.now());
        self.article_templates.save(template).await?;
        info!(
            event_name = "article_template.deactivated",
            tenant_id = %ctx.tenant_id,
            article_template_id = %id,
            "article template deactivated"
        );
        Ok(())
    }

    /// Line item priced from an active catalogue entry, ready for a section draft.
    pub async fn article_from_template(
        &self,
        ctx: &TenantContext,
        id: &ArticleTemplateId,
        quantity: Decimal,
    ) -> Result<ArticleDraft, ApplicationError> {
        let template = self.get_article_template(ctx, id).await?;
        if !template.active {
            return Err(ApplicationError::not_found("article_template", id.0.clone()));
        }
        Ok(template.to_article(quantity)?)
    }
}
