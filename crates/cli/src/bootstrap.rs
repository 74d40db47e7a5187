use std::sync::Arc;

use offercraft_core::config::{AppConfig, ConfigError, LoadOptions};
use offercraft_core::errors::ApplicationError;
use offercraft_core::notify::LogNotifier;
use offercraft_db::{connect_with_config, migrations, DbPool, OfferService};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub offers: OfferService,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("offer service setup failed: {0}")]
    Service(#[from] ApplicationError),
}

impl BootstrapError {
    /// Error class and exit code reported by commands that bootstrap.
    pub fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
            Self::Service(_) => ("service_init", 5),
        }
    }
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

/// Connects, applies pending migrations and wires the offer service with a
/// log-backed notifier.
pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let notifier = Arc::new(LogNotifier::new(config.notifications.sender_name.clone()));
    let offers = OfferService::from_config(db_pool.clone(), &config, notifier)?;

    Ok(Application { config, db_pool, offers })
}

#[cfg(test)]
mod tests {
    use offercraft_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use offercraft_core::tenancy::{Role, TenantContext};
    use offercraft_db::OfferFilter;

    use super::{bootstrap, bootstrap_with_config, BootstrapError};

    fn in_memory_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.database.max_connections = 1;
        config.sharing.link_secret = "bootstrap-test-secret-0001".to_string().into();
        config
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_service() {
        let app = bootstrap_with_config(in_memory_config()).await.expect("bootstrap");
        let ctx = TenantContext::new("tenant-a", "user-1", Role::Manager);

        let offers =
            app.offers.list_offers(&ctx, &OfferFilter::default()).await.expect("list offers");
        assert!(offers.is_empty());
        assert_eq!(app.offers.settings().number_prefix, app.config.offers.number_prefix);
    }

    #[tokio::test]
    async fn broken_notification_template_fails_service_setup() {
        let mut config = in_memory_config();
        config.notifications.subject_template = "{{ offerNumber".to_string();

        let error = bootstrap_with_config(config).await.err().expect("template error");
        assert!(matches!(error, BootstrapError::Service(_)));
        assert_eq!(error.classify(), ("service_init", 5));
    }

    #[tokio::test]
    async fn invalid_overrides_are_reported_as_config_errors() {
        let options = LoadOptions {
            config_path: Some("does-not-exist.toml".into()),
            require_file: false,
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                link_secret: Some("bootstrap-test-secret-0001".to_string()),
                ..ConfigOverrides::default()
            },
        };

        let error = bootstrap(options).await.err().expect("config error");
        assert_eq!(error.classify().0, "config_validation");
    }
}
