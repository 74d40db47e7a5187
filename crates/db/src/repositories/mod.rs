use async_trait::async_trait;
use thiserror::Error;

use offercraft_core::domain::article_template::{
    ArticleTemplate, ArticleTemplateFilter, ArticleTemplateId,
};
use offercraft_core::domain::client::{Client, ClientId};
use offercraft_core::domain::template::{OfferTemplate, TemplateId};
use offercraft_core::errors::{ApplicationError, DomainError};
use offercraft_core::tenancy::TenantId;

pub mod activity;
pub mod article_template;
pub mod client;
pub mod offer;
pub mod sequence;
pub mod signature;
pub mod template;
pub mod version;

pub use article_template::SqlArticleTemplateRepository;
pub use client::SqlClientRepository;
pub use offer::{OfferFilter, OfferSummary};
pub use template::SqlTemplateRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("stale write: {0}")]
    Stale(String),
}

impl From<DomainError> for RepositoryError {
    fn from(error: DomainError) -> Self {
        Self::Decode(error.to_string())
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                ApplicationError::Conflict(db.message().to_string())
            }
            RepositoryError::Stale(message) => ApplicationError::Conflict(message),
            RepositoryError::Database(error) => ApplicationError::Persistence(error.to_string()),
            RepositoryError::Decode(message) => ApplicationError::Persistence(message),
        }
    }
}

#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ClientId,
    ) -> Result<Option<Client>, RepositoryError>;
    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<Client>, RepositoryError>;
    async fn save(&self, client: Client) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait TemplateRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &TemplateId,
    ) -> Result<Option<OfferTemplate>, RepositoryError>;
    async fn list(&self, tenant_id: &TenantId) -> Result<Vec<OfferTemplate>, RepositoryError>;
    async fn save(&self, template: OfferTemplate) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ArticleTemplateRepository: Send + Sync {
    async fn find_by_id(
        &self,
        tenant_id: &TenantId,
        id: &ArticleTemplateId,
    ) -> Result<Option<ArticleTemplate>, RepositoryError>;
    /// Active entries only, ordered by name.
    async fn list(
        &self,
        tenant_id: &TenantId,
        filter: &ArticleTemplateFilter,
    ) -> Result<Vec<ArticleTemplate>, RepositoryError>;
    async fn categories(&self, tenant_id: &TenantId) -> Result<Vec<String>, RepositoryError>;
    async fn save(&self, template: ArticleTemplate) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(
    column: &str,
    value: String,
) -> Result<chrono::DateTime<chrono::Utc>, RepositoryError> {
    chrono::DateTime::parse_from_rfc3339(&value)
        .map(|timestamp| timestamp.with_timezone(&chrono::Utc))
        .map_err(|error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        })
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<chrono::DateTime<chrono::Utc>>, RepositoryError> {
    value.map(|value| parse_timestamp(column, value)).transpose()
}

pub(crate) fn parse_decimal(
    column: &str,
    value: String,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    value.parse().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<chrono::NaiveDate>, RepositoryError> {
    value
        .map(|value| {
            value.parse().map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{value}` ({error})"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use offercraft_core::errors::{ApplicationError, DomainError, ErrorKind};

    use super::RepositoryError;

    #[test]
    fn repository_errors_map_to_application_kinds() {
        let stale: ApplicationError = RepositoryError::Stale("offer `o-1`".to_string()).into();
        assert_eq!(stale.kind(), ErrorKind::Conflict);

        let decode: ApplicationError = RepositoryError::Decode("bad row".to_string()).into();
        assert_eq!(decode.kind(), ErrorKind::Persistence);

        let domain: RepositoryError = DomainError::validation("totals", "mismatch").into();
        assert!(matches!(domain, RepositoryError::Decode(message) if message.contains("totals")));
    }
}
