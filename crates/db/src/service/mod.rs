//! Transactional offer operations.
//!
//! Every mutation of one offer runs in a single transaction that starts by
//! taking the write lock for that offer, re-reads it, applies the domain
//! change and writes the aggregate together with its activity entries.
//! Notifications leave the process only after the commit.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Sqlite, SqliteConnection, Transaction};

use offercraft_core::activity::{ActivityEvent, InMemoryActivitySink, SYSTEM_ACTOR};
use offercraft_core::config::AppConfig;
use offercraft_core::domain::client::{Client, ClientId};
use offercraft_core::domain::offer::{Offer, OfferId};
use offercraft_core::errors::ApplicationError;
use offercraft_core::lifecycle::{record_transition, refresh_expiry, TransitionOutcome};
use offercraft_core::notify::{NotificationRenderer, Notifier};
use offercraft_core::numbering::DEFAULT_NUMBER_PREFIX;
use offercraft_core::share::ShareLinkSigner;
use offercraft_core::tenancy::{TenantContext, TenantId};

use crate::repositories::{
    activity as activity_repo, offer as offer_repo, ClientRepository, RepositoryError,
    SqlArticleTemplateRepository, SqlClientRepository, SqlTemplateRepository,
};
use crate::DbPool;

mod catalog;
mod delivery;
mod offers;
mod versions;

pub use delivery::{SendOffer, SendReceipt, SignedOffer};
pub use offers::{DuplicateOffer, OfferDocument, OfferFromTemplate};
pub use versions::RestoredOffer;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OfferSettings {
    pub default_currency: String,
    pub default_validity_days: u32,
    pub number_prefix: String,
    /// Company name used in notifications.
    pub sender_name: String,
    pub notifications_enabled: bool,
}

impl OfferSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_currency: config.offers.default_currency.clone(),
            default_validity_days: config.offers.default_validity_days,
            number_prefix: config.offers.number_prefix.clone(),
            sender_name: config.notifications.sender_name.clone(),
            notifications_enabled: config.notifications.enabled,
        }
    }
}

impl Default for OfferSettings {
    fn default() -> Self {
        Self {
            default_currency: "EUR".to_string(),
            default_validity_days: 30,
            number_prefix: DEFAULT_NUMBER_PREFIX.to_string(),
            sender_name: "OfferCraft".to_string(),
            notifications_enabled: true,
        }
    }
}

pub struct OfferService {
    pool: DbPool,
    settings: OfferSettings,
    clients: SqlClientRepository,
    templates: SqlTemplateRepository,
    article_templates: SqlArticleTemplateRepository,
    renderer: NotificationRenderer,
    signer: ShareLinkSigner,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl OfferService {
    pub fn new(
        pool: DbPool,
        settings: OfferSettings,
        signer: ShareLinkSigner,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            clients: SqlClientRepository::new(pool.clone()),
            templates: SqlTemplateRepository::new(pool.clone()),
            article_templates: SqlArticleTemplateRepository::new(pool.clone()),
            pool,
            settings,
            renderer: NotificationRenderer::default(),
            signer,
            notifier,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(
        pool: DbPool,
        config: &AppConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ApplicationError> {
        let renderer = NotificationRenderer::new(
            &config.notifications.subject_template,
            &config.notifications.body_template,
        )?;
        let signer = ShareLinkSigner::new(
            config.sharing.base_url.clone(),
            config.sharing.link_secret.clone(),
        );
        Ok(Self::new(pool, OfferSettings::from_config(config), signer, notifier)
            .with_renderer(renderer))
    }

    pub fn with_renderer(mut self, renderer: NotificationRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &OfferSettings {
        &self.settings
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, ApplicationError> {
        self.pool.begin().await.map_err(database_error)
    }

    async fn connection(
        &self,
    ) -> Result<sqlx::pool::PoolConnection<Sqlite>, ApplicationError> {
        self.pool.acquire().await.map_err(database_error)
    }

    async fn require_client(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Client, ApplicationError> {
        self.clients
            .find_by_id(tenant_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("client", id.0.clone()))
    }

    /// Locks and loads an offer for a mutation, expiring it first when its
    /// validity date has passed.
    async fn load_for_update(
        &self,
        conn: &mut SqliteConnection,
        tenant_id: &TenantId,
        id: &OfferId,
    ) -> Result<Offer, ApplicationError> {
        if !offer_repo::lock(conn, tenant_id, id).await? {
            return Err(ApplicationError::not_found("offer", id.0.clone()));
        }
        let mut offer = offer_repo::load(conn, tenant_id, id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("offer", id.0.clone()))?;
        self.expire_if_overdue(conn, &mut offer).await?;
        Ok(offer)
    }

    async fn expire_if_overdue(
        &self,
        conn: &mut SqliteConnection,
        offer: &mut Offer,
    ) -> Result<bool, ApplicationError> {
        let now = self.now();
        let Some(outcome) = refresh_expiry(offer, now.date_naive(), now) else {
            return Ok(false);
        };
        self.persist_transition(conn, offer, &outcome, SYSTEM_ACTOR, &[]).await?;
        Ok(true)
    }

    /// Writes a status change and its activity entry.
    async fn persist_transition(
        &self,
        conn: &mut SqliteConnection,
        offer: &mut Offer,
        outcome: &TransitionOutcome,
        actor: &str,
        metadata: &[(&str, String)],
    ) -> Result<(), ApplicationError> {
        offer_repo::update(conn, offer).await?;

        let sink = InMemoryActivitySink::default();
        record_transition(offer, outcome, actor, &sink, self.now());
        let events: Vec<ActivityEvent> = sink
            .drain()
            .into_iter()
            .map(|event| {
                metadata
                    .iter()
                    .fold(event, |event, (key, value)| event.with_metadata(*key, value.clone()))
            })
            .collect();
        activity_repo::append_all(conn, &events).await?;
        Ok(())
    }

    async fn record_activity(
        &self,
        conn: &mut SqliteConnection,
        event: ActivityEvent,
    ) -> Result<(), ApplicationError> {
        activity_repo::append(conn, &event).await?;
        Ok(())
    }

    fn ensure_tenant(ctx: &TenantContext, offer: &Offer) -> Result<(), ApplicationError> {
        if offer.tenant_id != ctx.tenant_id {
            return Err(ApplicationError::not_found("offer", offer.id.0.clone()));
        }
        Ok(())
    }
}

pub(crate) fn database_error(error: sqlx::Error) -> ApplicationError {
    RepositoryError::from(error).into()
}

async fn commit(tx: Transaction<'static, Sqlite>) -> Result<(), ApplicationError> {
    tx.commit().await.map_err(database_error)
}
