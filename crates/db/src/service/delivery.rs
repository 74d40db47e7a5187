use serde::Serialize;
use tracing::{info, warn};

use offercraft_core::activity::PUBLIC_LINK_ACTOR;
use offercraft_core::domain::offer::{Offer, OfferId, OfferStatus};
use offercraft_core::domain::signature::{
    RequestProvenance, Signature, SignatureInput, SignatureStatus,
};
use offercraft_core::errors::{ApplicationError, DomainError};
use offercraft_core::lifecycle::{accept_signature, LifecycleEngine, LifecycleEvent};
use offercraft_core::notify::{NotificationVariables, OfferNotification};
use offercraft_core::share::ShareClaims;
use offercraft_core::tenancy::TenantContext;

use super::{commit, OfferService};
use crate::repositories::{client as client_repo, signature as signature_repo};

/// Optional overrides of a send. Subject and message are Tera templates over
/// the same variables as the configured ones.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SendOffer {
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    pub offer: Offer,
    pub recipient: String,
    pub share_link: String,
    /// False when delivery was disabled or failed; the offer stays sent.
    pub delivered: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedOffer {
    pub offer: Offer,
    pub signature: Signature,
}

impl OfferService {
    pub async fn submit_for_approval(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<Offer, ApplicationError> {
        self.apply_event(ctx, id, LifecycleEvent::SubmitForApproval).await
    }

    pub async fn return_to_draft(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<Offer, ApplicationError> {
        self.apply_event(ctx, id, LifecycleEvent::ReturnToDraft).await
    }

    /// Signed public link of an offer.
    pub async fn share_link(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<String, ApplicationError> {
        let mut conn = self.connection().await?;
        self.read_offer(&mut conn, &ctx.tenant_id, id).await?;
        Ok(self.signer.link(&ctx.tenant_id, id)?)
    }

    /// Moves a draft (or an approved offer) to SENT and hands the rendered
    /// notification to the notifier once the transition is committed.
    pub async fn send_offer(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        request: SendOffer,
    ) -> Result<SendReceipt, ApplicationError> {
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        let client = client_repo::find(&mut tx, &ctx.tenant_id, &offer.client_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("client", offer.client_id.0.clone()))?;

        let recipient = request
            .recipient
            .map(|recipient| recipient.trim().to_string())
            .filter(|recipient| !recipient.is_empty())
            .or_else(|| client.email.clone())
            .ok_or_else(|| {
                DomainError::validation("recipient", "no recipient given and client has no email")
            })?;
        if !recipient.contains('@') {
            return Err(DomainError::validation(
                "recipient",
                format!("`{recipient}` is not an email address"),
            )
            .into());
        }

        let share_link = self.signer.link(&ctx.tenant_id, id)?;
        let now = self.now();
        let outcome = LifecycleEngine
            .apply(&mut offer, LifecycleEvent::Send, now)?
            .ok_or_else(|| DomainError::InvalidTransition {
                from: offer.status(),
                to: OfferStatus::Sent,
            })?;

        let variables = NotificationVariables::for_offer(
            &offer,
            client.company_name.clone(),
            self.settings.sender_name.clone(),
            share_link.clone(),
        );
        let (subject, body) = self.renderer.render(
            &variables,
            request.subject.as_deref(),
            request.message.as_deref(),
        )?;

        self.persist_transition(
            &mut tx,
            &mut offer,
            &outcome,
            &ctx.actor(),
            &[("recipient", recipient.clone())],
        )
        .await?;
        commit(tx).await?;

        let notification = OfferNotification {
            tenant_id: offer.tenant_id.clone(),
            offer_id: offer.id.clone(),
            recipient: recipient.clone(),
            subject,
            body,
            share_link: share_link.clone(),
        };
        let delivered = self.dispatch(&notification).await;

        Ok(SendReceipt { offer, recipient, share_link, delivered })
    }

    /// First open of the public link moves SENT to VIEWED; later opens change
    /// nothing.
    pub async fn view_offer(&self, token: &str) -> Result<Offer, ApplicationError> {
        let claims = self.verify_token(token)?;
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &claims.tenant_id, &claims.offer_id).await?;

        if let Some(outcome) = LifecycleEngine.apply(&mut offer, LifecycleEvent::View, self.now())?
        {
            self.persist_transition(&mut tx, &mut offer, &outcome, PUBLIC_LINK_ACTOR, &[]).await?;
        }
        commit(tx).await?;
        Ok(offer)
    }

    /// Records the one signature an offer may carry and accepts the offer.
    /// A second signature is a conflict regardless of the offer status.
    pub async fn sign_offer(
        &self,
        token: &str,
        input: SignatureInput,
        provenance: RequestProvenance,
    ) -> Result<SignedOffer, ApplicationError> {
        let claims = self.verify_token(token)?;
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &claims.tenant_id, &claims.offer_id).await?;

        if signature_repo::find_for_offer(&mut tx, &claims.tenant_id, &offer.id).await?.is_some() {
            return Err(ApplicationError::Conflict(format!(
                "offer `{}` has already been signed",
                offer.id.0
            )));
        }

        let now = self.now();
        let signature = Signature::capture(&offer, input, provenance, now)?;
        let outcome = accept_signature(&mut offer, &signature, now)?;
        signature_repo::insert(&mut tx, &signature).await?;
        self.persist_transition(
            &mut tx,
            &mut offer,
            &outcome,
            PUBLIC_LINK_ACTOR,
            &[
                ("signer_name", signature.signer_name.clone()),
                ("signer_email", signature.signer_email.clone()),
                ("ip_address", signature.ip_address.clone()),
            ],
        )
        .await?;
        commit(tx).await?;

        info!(
            event_name = "offer.signed",
            tenant_id = %offer.tenant_id,
            offer_id = %offer.id,
            signature_id = %signature.id.0,
            "offer signed"
        );
        Ok(SignedOffer { offer, signature })
    }

    /// Client declines the offer through the public link.
    pub async fn reject_offer(
        &self,
        token: &str,
        reason: Option<String>,
    ) -> Result<Offer, ApplicationError> {
        let claims = self.verify_token(token)?;
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &claims.tenant_id, &claims.offer_id).await?;

        let outcome = LifecycleEngine
            .apply(&mut offer, LifecycleEvent::Reject, self.now())?
            .ok_or_else(|| DomainError::InvalidTransition {
                from: offer.status(),
                to: OfferStatus::Rejected,
            })?;
        let metadata: Vec<(&str, String)> = reason
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .map(|reason| vec![("reason", reason)])
            .unwrap_or_default();
        self.persist_transition(&mut tx, &mut offer, &outcome, PUBLIC_LINK_ACTOR, &metadata)
            .await?;
        commit(tx).await?;
        Ok(offer)
    }

    /// Whether the offer behind a public link has been signed. Only offers
    /// that were sent can be asked.
    pub async fn signature_status(&self, token: &str) -> Result<SignatureStatus, ApplicationError> {
        let claims = self.verify_token(token)?;
        let mut conn = self.connection().await?;
        let offer = self.read_offer(&mut conn, &claims.tenant_id, &claims.offer_id).await?;

        let status = offer.status();
        if !matches!(status, OfferStatus::Sent | OfferStatus::Viewed | OfferStatus::Accepted) {
            return Err(DomainError::InvalidTransition { from: status, to: OfferStatus::Accepted }
                .into());
        }

        let signature =
            signature_repo::find_for_offer(&mut conn, &claims.tenant_id, &claims.offer_id).await?;
        Ok(SignatureStatus::from(signature.as_ref()))
    }

    async fn apply_event(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        event: LifecycleEvent,
    ) -> Result<Offer, ApplicationError> {
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        if let Some(outcome) = LifecycleEngine.apply(&mut offer, event, self.now())? {
            self.persist_transition(&mut tx, &mut offer, &outcome, &ctx.actor(), &[]).await?;
        }
        commit(tx).await?;
        Ok(offer)
    }

    fn verify_token(&self, token: &str) -> Result<ShareClaims, ApplicationError> {
        Ok(self.signer.verify(token)?)
    }

    async fn dispatch(&self, notification: &OfferNotification) -> bool {
        if !self.settings.notifications_enabled {
            info!(
                event_name = "offer.notification_skipped",
                tenant_id = %notification.tenant_id,
                offer_id = %notification.offer_id,
                "notifications disabled, offer sent without email"
            );
            return false;
        }

        match self.notifier.deliver(notification).await {
            Ok(receipt) => {
                info!(
                    event_name = "offer.notification_sent",
                    tenant_id = %notification.tenant_id,
                    offer_id = %notification.offer_id,
                    message_id = %receipt.message_id,
                    "offer notification delivered"
                );
                true
            }
            Err(error) => {
                warn!(
                    event_name = "offer.notification_failed",
                    tenant_id = %notification.tenant_id,
                    offer_id = %notification.offer_id,
                    error = %error,
                    "offer notification failed; offer remains sent"
                );
                false
            }
        }
    }
}
