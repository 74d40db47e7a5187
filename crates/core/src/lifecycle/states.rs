use serde::{Deserialize, Serialize};

use crate::activity::ActivityKind;
use crate::domain::offer::OfferStatus;

/// Status changes a caller may request directly. Acceptance and expiry are
/// not in this list: acceptance only happens through a signature and expiry
/// only through the validity date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    SubmitForApproval,
    ReturnToDraft,
    Send,
    View,
    Reject,
}

impl LifecycleEvent {
    pub fn target(&self) -> OfferStatus {
        match self {
            Self::SubmitForApproval => OfferStatus::PendingApproval,
            Self::ReturnToDraft => OfferStatus::Draft,
            Self::Send => OfferStatus::Sent,
            Self::View => OfferStatus::Viewed,
            Self::Reject => OfferStatus::Rejected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: OfferStatus,
    pub to: OfferStatus,
    pub activity: Option<ActivityKind>,
}

/// The transition table. Terminal statuses have no outgoing edges.
pub fn allowed_targets(from: OfferStatus) -> &'static [OfferStatus] {
    use OfferStatus::{
        Accepted, Draft, Expired, Lost, PendingApproval, Rejected, Sent, Viewed, Won,
    };

    match from {
        Draft => &[PendingApproval, Sent, Expired],
        PendingApproval => &[Draft, Sent, Expired],
        Sent => &[Viewed, Accepted, Rejected, Expired],
        Viewed => &[Accepted, Rejected, Expired],
        Accepted | Rejected | Won | Lost | Expired => &[],
    }
}

pub fn can_transition(from: OfferStatus, to: OfferStatus) -> bool {
    allowed_targets(from).contains(&to)
}
