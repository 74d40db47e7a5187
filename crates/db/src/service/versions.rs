use serde::Serialize;
use tracing::info;

use offercraft_core::activity::{ActivityEvent, ActivityKind};
use offercraft_core::domain::offer::{Offer, OfferId};
use offercraft_core::domain::version::{backup_note, NewVersion, OfferVersion, VersionId};
use offercraft_core::errors::ApplicationError;
use offercraft_core::tenancy::TenantContext;

use super::{commit, OfferService};
use crate::repositories::{offer as offer_repo, version as version_repo};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RestoredOffer {
    pub offer: Offer,
    pub restored_version: u32,
    /// Snapshot of the state that was replaced.
    pub backup: OfferVersion,
}

impl OfferService {
    pub async fn create_snapshot(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        note: Option<String>,
    ) -> Result<OfferVersion, ApplicationError> {
        let mut tx = self.begin().await?;
        let offer = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        let now = self.now();
        let snapshot = NewVersion::capture(&offer, ctx.user_id.clone(), note, now)?;
        let version = version_repo::append(&mut tx, snapshot).await?;

        self.record_activity(
            &mut tx,
            ActivityEvent::new(
                offer.tenant_id.clone(),
                offer.id.clone(),
                ActivityKind::VersionCreated,
                ctx.actor(),
                format!("Version {} created", version.version),
                now,
            )
            .with_metadata("version", version.version.to_string())
            .with_metadata("content_hash", version.content_hash.clone()),
        )
        .await?;
        commit(tx).await?;

        info!(
            event_name = "offer.snapshot_created",
            tenant_id = %offer.tenant_id,
            offer_id = %offer.id,
            version = version.version,
            content_hash = %version.content_hash,
            "offer snapshot created"
        );
        Ok(version)
    }

    /// Newest first.
    pub async fn list_snapshots(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
    ) -> Result<Vec<OfferVersion>, ApplicationError> {
        let mut conn = self.connection().await?;
        self.read_offer(&mut conn, &ctx.tenant_id, id).await?;
        Ok(version_repo::list_for_offer(&mut conn, &ctx.tenant_id, id).await?)
    }

    pub async fn get_snapshot(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        version_id: &VersionId,
    ) -> Result<OfferVersion, ApplicationError> {
        let mut conn = self.connection().await?;
        version_repo::find(&mut conn, &ctx.tenant_id, id, version_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("version", version_id.0.clone()))
    }

    /// Replaces the offer content with a snapshot. The current state is saved
    /// as a new version first; backup, tree replacement, scalar restore and
    /// the `RESTORED` entry commit together or not at all.
    pub async fn restore_snapshot(
        &self,
        ctx: &TenantContext,
        id: &OfferId,
        version_id: &VersionId,
    ) -> Result<RestoredOffer, ApplicationError> {
        let mut tx = self.begin().await?;
        let mut offer = self.load_for_update(&mut tx, &ctx.tenant_id, id).await?;
        let target = version_repo::find(&mut tx, &ctx.tenant_id, id, version_id)
            .await?
            .ok_or_else(|| ApplicationError::not_found("version", version_id.0.clone()))?;

        let now = self.now();
        let backup = version_repo::append(
            &mut tx,
            NewVersion::capture(
                &offer,
                ctx.user_id.clone(),
                Some(backup_note(target.version)),
                now,
            )?,
        )
        .await?;

        target.content.apply_to(&mut offer)?;
        offer.updated_at = now;
        offer_repo::update(&mut tx, &mut offer).await?;
        offer_repo::replace_sections(&mut tx, &offer).await?;

        self.record_activity(
            &mut tx,
            ActivityEvent::new(
                offer.tenant_id.clone(),
                offer.id.clone(),
                ActivityKind::Restored,
                ctx.actor(),
                format!("Offer restored to version {}", target.version),
                now,
            )
            .with_metadata("restored_version", target.version.to_string())
            .with_metadata("backup_version", backup.version.to_string()),
        )
        .await?;
        commit(tx).await?;

        info!(
            event_name = "offer.restored",
            tenant_id = %offer.tenant_id,
            offer_id = %offer.id,
            restored_version = target.version,
            backup_version = backup.version,
            "offer restored from snapshot"
        );
        Ok(RestoredOffer { offer, restored_version: target.version, backup })
    }
}
