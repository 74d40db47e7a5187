use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use offercraft_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in effective_values(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(format!("- {key} = {value} (source: {source})"));
    }

    lines.join("\n")
}

type ConfigField = (&'static str, String, &'static [&'static str]);

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> ConfigField {
    (key, value, env_keys)
}

fn effective_values(config: &AppConfig) -> Vec<ConfigField> {
    let link_secret = redact_secret(config.sharing.link_secret.expose_secret());

    vec![
        field("database.url", config.database.url.clone(), &["OFFERCRAFT_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["OFFERCRAFT_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["OFFERCRAFT_DATABASE_TIMEOUT_SECS"],
        ),
        field(
            "offers.default_currency",
            config.offers.default_currency.clone(),
            &["OFFERCRAFT_OFFERS_DEFAULT_CURRENCY"],
        ),
        field(
            "offers.default_validity_days",
            config.offers.default_validity_days.to_string(),
            &["OFFERCRAFT_OFFERS_DEFAULT_VALIDITY_DAYS"],
        ),
        field(
            "offers.number_prefix",
            config.offers.number_prefix.clone(),
            &["OFFERCRAFT_OFFERS_NUMBER_PREFIX"],
        ),
        field(
            "sharing.base_url",
            config.sharing.base_url.clone(),
            &["OFFERCRAFT_SHARING_BASE_URL"],
        ),
        field("sharing.link_secret", link_secret, &["OFFERCRAFT_SHARING_LINK_SECRET"]),
        field(
            "notifications.enabled",
            config.notifications.enabled.to_string(),
            &["OFFERCRAFT_NOTIFICATIONS_ENABLED"],
        ),
        field(
            "notifications.sender_name",
            config.notifications.sender_name.clone(),
            &["OFFERCRAFT_NOTIFICATIONS_SENDER_NAME"],
        ),
        field(
            "notifications.subject_template",
            first_line(&config.notifications.subject_template),
            &[],
        ),
        field("notifications.body_template", first_line(&config.notifications.body_template), &[]),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["OFFERCRAFT_LOGGING_LEVEL", "OFFERCRAFT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["OFFERCRAFT_LOGGING_FORMAT", "OFFERCRAFT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if config_file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = config_file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn first_line(template: &str) -> String {
    let line = template.lines().next().unwrap_or_default();
    if template.lines().count() > 1 {
        format!("{line} …")
    } else {
        line.to_string()
    }
}

/// Keeps the first four characters so operators can tell secrets apart.
fn redact_secret(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let visible: String = trimmed.chars().take(4).collect();
    format!("{visible}***")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, first_line, redact_secret};

    #[test]
    fn secrets_keep_only_a_short_prefix() {
        assert_eq!(redact_secret("s3cr3t-link-secret-value"), "s3cr***");
        assert_eq!(redact_secret("   "), "<empty>");
    }

    #[test]
    fn nested_keys_are_found_in_the_file_document() {
        let doc: Value = "[sharing]\nbase_url = \"https://offers.example.test\"\n"
            .parse()
            .expect("toml");
        assert!(contains_path(&doc, "sharing.base_url"));
        assert!(!contains_path(&doc, "sharing.link_secret"));
        assert!(!contains_path(&doc, "database.url"));
    }

    #[test]
    fn multi_line_templates_are_abbreviated() {
        assert_eq!(first_line("Dear {{ clientName }},\n\nbody"), "Dear {{ clientName }}, …");
        assert_eq!(first_line("Offer {{ offerNumber }}"), "Offer {{ offerNumber }}");
    }
}
