pub mod connection;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, connect_with_config, connect_with_settings, DbPool};
pub use repositories::{OfferFilter, OfferSummary, RepositoryError};
pub use service::{
    Clock, DuplicateOffer, FixedClock, OfferDocument, OfferFromTemplate, OfferService,
    OfferSettings, RestoredOffer, SendOffer, SendReceipt, SignedOffer, SystemClock,
};
