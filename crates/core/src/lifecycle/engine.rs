use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::activity::{ActivityEvent, ActivityKind, ActivitySink};
use crate::domain::offer::{Offer, OfferStatus};
use crate::domain::signature::Signature;
use crate::errors::DomainError;
use crate::lifecycle::states::{can_transition, LifecycleEvent, TransitionOutcome};

/// Applies status changes to an offer through the transition table.
#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    /// Returns `Ok(None)` for a repeated view, which changes nothing.
    pub fn apply(
        &self,
        offer: &mut Offer,
        event: LifecycleEvent,
        now: DateTime<Utc>,
    ) -> Result<Option<TransitionOutcome>, DomainError> {
        if event == LifecycleEvent::View
            && matches!(offer.status, OfferStatus::Viewed | OfferStatus::Accepted)
        {
            return Ok(None);
        }

        let activity = match event {
            LifecycleEvent::Send => Some(ActivityKind::Sent),
            LifecycleEvent::View => Some(ActivityKind::Viewed),
            LifecycleEvent::Reject => Some(ActivityKind::Rejected),
            LifecycleEvent::SubmitForApproval | LifecycleEvent::ReturnToDraft => None,
        };
        transition(offer, event.target(), activity, now).map(Some)
    }

    pub fn apply_with_activity<S>(
        &self,
        offer: &mut Offer,
        event: LifecycleEvent,
        actor: &str,
        sink: &S,
        now: DateTime<Utc>,
    ) -> Result<Option<TransitionOutcome>, DomainError>
    where
        S: ActivitySink,
    {
        let outcome = self.apply(offer, event, now)?;
        if let Some(outcome) = &outcome {
            record_transition(offer, outcome, actor, sink, now);
        }
        Ok(outcome)
    }
}

/// Moves a Sent or Viewed offer to Accepted. This is the only way into
/// Accepted.
pub fn accept_signature(
    offer: &mut Offer,
    signature: &Signature,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    if signature.offer_id != offer.id {
        return Err(DomainError::validation(
            "signature.offer_id",
            format!("signature belongs to offer `{}`", signature.offer_id.0),
        ));
    }
    transition(offer, OfferStatus::Accepted, Some(ActivityKind::Signed), now)
}

/// Expires an open offer whose validity date lies before `today`.
pub fn refresh_expiry(
    offer: &mut Offer,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> Option<TransitionOutcome> {
    if !offer.is_past_deadline(today) {
        return None;
    }
    transition(offer, OfferStatus::Expired, Some(ActivityKind::Expired), now).ok()
}

/// Emits the activity entry of a transition (if it has one) and logs it.
pub fn record_transition<S>(
    offer: &Offer,
    outcome: &TransitionOutcome,
    actor: &str,
    sink: &S,
    now: DateTime<Utc>,
) where
    S: ActivitySink,
{
    info!(
        event_name = "offer.transition_applied",
        tenant_id = %offer.tenant_id,
        offer_id = %offer.id,
        from = %outcome.from,
        to = %outcome.to,
        actor = %actor,
        "offer status changed"
    );

    if let Some(kind) = outcome.activity {
        sink.emit(
            ActivityEvent::new(
                offer.tenant_id.clone(),
                offer.id.clone(),
                kind,
                actor,
                describe(kind, outcome),
                now,
            )
            .with_metadata("from", outcome.from.as_str())
            .with_metadata("to", outcome.to.as_str()),
        );
    }
}

fn describe(kind: ActivityKind, outcome: &TransitionOutcome) -> String {
    match kind {
        ActivityKind::Sent => "Offer sent to client".to_string(),
        ActivityKind::Viewed => "Offer viewed by client".to_string(),
        ActivityKind::Signed => "Offer signed and accepted".to_string(),
        ActivityKind::Rejected => "Offer rejected by client".to_string(),
        ActivityKind::Expired => "Offer expired".to_string(),
        _ => format!("Offer moved from {} to {}", outcome.from, outcome.to),
    }
}

fn transition(
    offer: &mut Offer,
    to: OfferStatus,
    activity: Option<ActivityKind>,
    now: DateTime<Utc>,
) -> Result<TransitionOutcome, DomainError> {
    let from = offer.status;
    if !can_transition(from, to) {
        return Err(DomainError::InvalidTransition { from, to });
    }

    offer.status = to;
    offer.updated_at = now;
    match to {
        OfferStatus::Sent => offer.sent_at = Some(now),
        OfferStatus::Viewed => offer.viewed_at = Some(now),
        OfferStatus::Accepted => offer.accepted_at = Some(now),
        _ => {}
    }

    Ok(TransitionOutcome { from, to, activity })
}
