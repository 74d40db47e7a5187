pub mod activity;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod numbering;
pub mod pricing;
pub mod share;
pub mod tenancy;

pub use activity::{ActivityEvent, ActivityKind, ActivitySink, InMemoryActivitySink};
pub use domain::article_template::{
    ArticleTemplate, ArticleTemplateFilter, ArticleTemplateId, NewArticleTemplate,
};
pub use domain::client::{Client, ClientId, ClientStatus, NewClient};
pub use domain::offer::{
    Article, ArticleDraft, ArticleId, NewOffer, Offer, OfferId, OfferRecord, OfferStatus, Section,
    SectionDraft, SectionId,
};
pub use domain::signature::{
    RequestProvenance, Signature, SignatureId, SignatureInput, SignatureStatus,
};
pub use domain::template::{NewTemplate, OfferTemplate, TemplateId};
pub use domain::version::{NewVersion, OfferVersion, SnapshotContent, VersionId};
pub use errors::{ApplicationError, DomainError, ErrorKind, InterfaceError};
pub use lifecycle::{LifecycleEngine, LifecycleEvent, TransitionOutcome};
pub use notify::{Notifier, NotificationRenderer, OfferNotification};
pub use numbering::{NumberingPeriod, OfferNumber};
pub use pricing::{calculate_line, ArticlePricing, DocumentTotals, LineBreakdown};
pub use share::{ShareClaims, ShareLinkSigner};
pub use tenancy::{Role, TenantContext, TenantId, UserId};
