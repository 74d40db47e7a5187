use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::offer::validate_currency;
use crate::domain::template::{validate_validity_days, DEFAULT_VALIDITY_DAYS};
use crate::notify::{NotificationRenderer, DEFAULT_BODY_TEMPLATE, DEFAULT_SUBJECT_TEMPLATE};
use crate::numbering::DEFAULT_NUMBER_PREFIX;

pub const DEFAULT_CONFIG_FILE: &str = "offercraft.toml";
pub const MIN_LINK_SECRET_LEN: usize = 16;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub offers: OffersConfig,
    pub sharing: SharingConfig,
    pub notifications: NotificationsConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OffersConfig {
    pub default_currency: String,
    pub default_validity_days: u32,
    pub number_prefix: String,
}

#[derive(Clone, Debug)]
pub struct SharingConfig {
    pub base_url: String,
    pub link_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct NotificationsConfig {
    pub enabled: bool,
    pub sender_name: String,
    pub subject_template: String,
    pub body_template: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub default_currency: Option<String>,
    pub sharing_base_url: Option<String>,
    pub link_secret: Option<String>,
    pub notifications_enabled: Option<bool>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://offercraft.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            offers: OffersConfig {
                default_currency: "EUR".to_string(),
                default_validity_days: DEFAULT_VALIDITY_DAYS,
                number_prefix: DEFAULT_NUMBER_PREFIX.to_string(),
            },
            sharing: SharingConfig {
                base_url: "http://localhost:3000".to_string(),
                link_secret: String::new().into(),
            },
            notifications: NotificationsConfig {
                enabled: true,
                sender_name: "OfferCraft".to_string(),
                subject_template: DEFAULT_SUBJECT_TEMPLATE.to_string(),
                body_template: DEFAULT_BODY_TEMPLATE.to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(offers) = patch.offers {
            if let Some(default_currency) = offers.default_currency {
                self.offers.default_currency = default_currency;
            }
            if let Some(default_validity_days) = offers.default_validity_days {
                self.offers.default_validity_days = default_validity_days;
            }
            if let Some(number_prefix) = offers.number_prefix {
                self.offers.number_prefix = number_prefix;
            }
        }

        if let Some(sharing) = patch.sharing {
            if let Some(base_url) = sharing.base_url {
                self.sharing.base_url = base_url;
            }
            if let Some(link_secret) = sharing.link_secret {
                self.sharing.link_secret = secret_value(link_secret);
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(enabled) = notifications.enabled {
                self.notifications.enabled = enabled;
            }
            if let Some(sender_name) = notifications.sender_name {
                self.notifications.sender_name = sender_name;
            }
            if let Some(subject_template) = notifications.subject_template {
                self.notifications.subject_template = subject_template;
            }
            if let Some(body_template) = notifications.body_template {
                self.notifications.body_template = body_template;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("OFFERCRAFT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("OFFERCRAFT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("OFFERCRAFT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("OFFERCRAFT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("OFFERCRAFT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OFFERCRAFT_OFFERS_DEFAULT_CURRENCY") {
            self.offers.default_currency = value;
        }
        if let Some(value) = read_env("OFFERCRAFT_OFFERS_DEFAULT_VALIDITY_DAYS") {
            self.offers.default_validity_days =
                parse_u32("OFFERCRAFT_OFFERS_DEFAULT_VALIDITY_DAYS", &value)?;
        }
        if let Some(value) = read_env("OFFERCRAFT_OFFERS_NUMBER_PREFIX") {
            self.offers.number_prefix = value;
        }

        if let Some(value) = read_env("OFFERCRAFT_SHARING_BASE_URL") {
            self.sharing.base_url = value;
        }
        if let Some(value) = read_env("OFFERCRAFT_SHARING_LINK_SECRET") {
            self.sharing.link_secret = secret_value(value);
        }

        if let Some(value) = read_env("OFFERCRAFT_NOTIFICATIONS_ENABLED") {
            self.notifications.enabled = parse_bool("OFFERCRAFT_NOTIFICATIONS_ENABLED", &value)?;
        }
        if let Some(value) = read_env("OFFERCRAFT_NOTIFICATIONS_SENDER_NAME") {
            self.notifications.sender_name = value;
        }

        let log_level =
            read_env("OFFERCRAFT_LOGGING_LEVEL").or_else(|| read_env("OFFERCRAFT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OFFERCRAFT_LOGGING_FORMAT").or_else(|| read_env("OFFERCRAFT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(default_currency) = overrides.default_currency {
            self.offers.default_currency = default_currency;
        }
        if let Some(base_url) = overrides.sharing_base_url {
            self.sharing.base_url = base_url;
        }
        if let Some(link_secret) = overrides.link_secret {
            self.sharing.link_secret = secret_value(link_secret);
        }
        if let Some(enabled) = overrides.notifications_enabled {
            self.notifications.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_offers(&self.offers)?;
        validate_sharing(&self.sharing)?;
        validate_notifications(&self.notifications)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_offers(offers: &OffersConfig) -> Result<(), ConfigError> {
    validate_currency(&offers.default_currency).map_err(|_| {
        ConfigError::Validation(format!(
            "offers.default_currency must be a three letter ISO-4217 code, got `{}`",
            offers.default_currency
        ))
    })?;

    validate_validity_days(offers.default_validity_days).map_err(|_| {
        ConfigError::Validation("offers.default_validity_days must be in range 1..=365".to_string())
    })?;

    let prefix = offers.number_prefix.trim();
    if prefix.is_empty() || !prefix.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        return Err(ConfigError::Validation(
            "offers.number_prefix must be a non-empty alphanumeric string".to_string(),
        ));
    }

    Ok(())
}

fn validate_sharing(sharing: &SharingConfig) -> Result<(), ConfigError> {
    let base_url = sharing.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "sharing.base_url must start with http:// or https://".to_string(),
        ));
    }

    let secret = sharing.link_secret.expose_secret();
    if secret.is_empty() {
        return Err(ConfigError::Validation(
            "sharing.link_secret is required. Set OFFERCRAFT_SHARING_LINK_SECRET or \
             [sharing].link_secret"
                .to_string(),
        ));
    }
    if secret.chars().count() < MIN_LINK_SECRET_LEN {
        return Err(ConfigError::Validation(format!(
            "sharing.link_secret must be at least {MIN_LINK_SECRET_LEN} characters long"
        )));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationsConfig) -> Result<(), ConfigError> {
    if notifications.sender_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "notifications.sender_name must not be empty".to_string(),
        ));
    }

    NotificationRenderer::new(&notifications.subject_template, &notifications.body_template)
        .map_err(|error| ConfigError::Validation(error.to_string()))?;

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    offers: Option<OffersPatch>,
    sharing: Option<SharingPatch>,
    notifications: Option<NotificationsPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OffersPatch {
    default_currency: Option<String>,
    default_validity_days: Option<u32>,
    number_prefix: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SharingPatch {
    base_url: Option<String>,
    link_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    enabled: Option<bool>,
    sender_name: Option<String>,
    subject_template: Option<String>,
    body_template: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
