pub mod engine;
pub mod states;

pub use engine::{accept_signature, record_transition, refresh_expiry, LifecycleEngine};
pub use states::{allowed_targets, can_transition, LifecycleEvent, TransitionOutcome};
