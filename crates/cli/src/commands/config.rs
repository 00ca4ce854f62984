use std::env;
use std::fs;
use std::path::Path;

use concierge_core::config::{resolve_config_path, AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// Renders the effective configuration with the layer each value came from.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = config_file_path.as_deref().and_then(load_config_file_doc);
    let sources = SourceLookup { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let entries: Vec<(&str, String)> = vec![
        ("database.url", config.database.url.clone()),
        ("database.max_connections", config.database.max_connections.to_string()),
        ("database.timeout_secs", config.database.timeout_secs.to_string()),
        ("server.bind_address", config.server.bind_address.clone()),
        ("server.port", config.server.port.to_string()),
        ("nlu.base_url", unset_or(config.nlu.base_url.as_deref())),
        ("nlu.bot_name", config.nlu.bot_name.clone()),
        ("nlu.bot_alias", config.nlu.bot_alias.clone()),
        ("nlu.api_key", redact_secret(config.nlu.api_key.as_ref())),
        ("dialog.intent_name", config.dialog.intent_name.clone()),
        ("dialog.timezone", config.dialog.timezone.clone()),
        ("dialog.supported_location", config.dialog.supported_location.clone()),
        ("dialog.supported_cuisines", config.dialog.supported_cuisines.join(",")),
        ("queue.name", config.queue.name.clone()),
        ("queue.max_receive_count", config.queue.max_receive_count.to_string()),
        ("search.backend", format!("{:?}", config.search.backend)),
        ("search.base_url", unset_or(config.search.base_url.as_deref())),
        ("search.index", config.search.index.clone()),
        ("search.password", redact_secret(config.search.password.as_ref())),
        ("notification.backend", format!("{:?}", config.notification.backend)),
        ("notification.webhook_url", unset_or(config.notification.webhook_url.as_deref())),
        ("notification.auth_token", redact_secret(config.notification.auth_token.as_ref())),
        ("notification.topic", config.notification.topic.clone()),
        ("worker.enabled", config.worker.enabled.to_string()),
        ("worker.poll_interval_secs", config.worker.poll_interval_secs.to_string()),
        ("logging.level", config.logging.level.clone()),
        ("logging.format", format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        entries.into_iter().map(|(key, value)| render_line(key, &value, sources.source_of(key))),
    );
    lines.join("\n")
}

struct SourceLookup<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl SourceLookup<'_> {
    fn source_of(&self, key_path: &str) -> String {
        let env_key = env_key_for(key_path);
        if env::var_os(&env_key).is_some() {
            return format!("env ({env_key})");
        }

        if self.doc.is_some_and(|doc| contains_path(doc, key_path)) {
            let file_path = self
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }

        "default".to_string()
    }
}

fn env_key_for(key_path: &str) -> String {
    format!("CONCIERGE_{}", key_path.replace('.', "_").to_ascii_uppercase())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn unset_or(value: Option<&str>) -> String {
    value.unwrap_or("<unset>").to_string()
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret {
        None => "<unset>".to_string(),
        Some(secret) if secret.expose_secret().trim().is_empty() => "<empty>".to_string(),
        Some(_) => "<redacted>".to_string(),
    }
}
