use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::reservation::DINING_SUGGESTION_INTENT;
use crate::flows::DEFAULT_CONFIRMATION_MESSAGE;
use crate::ports::DequeueOptions;
use crate::recommendation::RecommendationSettings;
use crate::validation::{ValidationRules, DEFAULT_SUPPORTED_CUISINES};

pub const DEFAULT_CONFIG_FILE: &str = "concierge.toml";
pub const NESTED_CONFIG_FILE: &str = "config/concierge.toml";
/// Restaurant columns the database search backend can match on.
pub const DATABASE_MATCH_FIELDS: [&str; 2] = ["categories", "name"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub nlu: NluConfig,
    pub dialog: DialogConfig,
    pub queue: QueueConfig,
    pub search: SearchConfig,
    pub notification: NotificationConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NluConfig {
    pub base_url: Option<String>,
    pub bot_name: String,
    pub bot_alias: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DialogConfig {
    pub intent_name: String,
    pub timezone: String,
    pub supported_location: String,
    pub supported_cuisines: Vec<String>,
    pub suggested_cuisine: String,
    pub confirmation_message: String,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub name: String,
    pub visibility_timeout_secs: u64,
    pub wait_time_secs: u64,
    pub max_messages: u32,
    pub max_receive_count: u32,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub backend: SearchBackend,
    pub base_url: Option<String>,
    pub index: String,
    pub match_field: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub result_window: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub backend: NotificationBackend,
    pub webhook_url: Option<String>,
    pub auth_token: Option<SecretString>,
    pub topic: String,
    pub subject: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub recommendation_count: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchBackend {
    Database,
    Opensearch,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationBackend {
    Log,
    Webhook,
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
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub search_backend: Option<SearchBackend>,
    pub notification_backend: Option<NotificationBackend>,
    pub worker_enabled: Option<bool>,
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
                url: "sqlite://concierge.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            nlu: NluConfig {
                base_url: None,
                bot_name: "AI_Concierge".to_string(),
                bot_alias: "test".to_string(),
                api_key: None,
                timeout_secs: 10,
            },
            dialog: DialogConfig {
                intent_name: DINING_SUGGESTION_INTENT.to_string(),
                timezone: "America/New_York".to_string(),
                supported_location: "manhattan".to_string(),
                supported_cuisines: DEFAULT_SUPPORTED_CUISINES
                    .iter()
                    .map(|cuisine| (*cuisine).to_string())
                    .collect(),
                suggested_cuisine: "Italian".to_string(),
                confirmation_message: DEFAULT_CONFIRMATION_MESSAGE.to_string(),
            },
            queue: QueueConfig {
                name: "reservations".to_string(),
                visibility_timeout_secs: 10,
                wait_time_secs: 0,
                max_messages: 1,
                max_receive_count: 5,
            },
            search: SearchConfig {
                backend: SearchBackend::Database,
                base_url: None,
                index: "restaurants".to_string(),
                match_field: "categories".to_string(),
                username: None,
                password: None,
                result_window: 200,
                timeout_secs: 10,
            },
            notification: NotificationConfig {
                backend: NotificationBackend::Log,
                webhook_url: None,
                auth_token: None,
                topic: "restaurantRecommendation".to_string(),
                subject: "Restaurant Recommendation".to_string(),
                timeout_secs: 10,
            },
            worker: WorkerConfig { enabled: true, poll_interval_secs: 5, recommendation_count: 3 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for SearchBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "opensearch" => Ok(Self::Opensearch),
            other => Err(ConfigError::Validation(format!(
                "unsupported search backend `{other}` (expected database|opensearch)"
            ))),
        }
    }
}

impl std::str::FromStr for NotificationBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "log" => Ok(Self::Log),
            "webhook" => Ok(Self::Webhook),
            other => Err(ConfigError::Validation(format!(
                "unsupported notification backend `{other}` (expected log|webhook)"
            ))),
        }
    }
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

impl DialogConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.timezone.trim().parse::<Tz>().map_err(|_| {
            ConfigError::Validation(format!(
                "dialog.timezone `{}` is not an IANA timezone name (e.g. America/New_York)",
                self.timezone
            ))
        })
    }

    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules {
            supported_location: self.supported_location.trim().to_string(),
            supported_cuisines: self
                .supported_cuisines
                .iter()
                .map(|cuisine| cuisine.trim().to_ascii_lowercase())
                .collect(),
            suggested_cuisine: self.suggested_cuisine.clone(),
        }
    }
}

impl QueueConfig {
    pub fn dequeue_options(&self) -> DequeueOptions {
        DequeueOptions {
            max_messages: self.max_messages,
            wait: Duration::from_secs(self.wait_time_secs),
            visibility_timeout: Duration::from_secs(self.visibility_timeout_secs),
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

    pub fn recommendation_settings(&self) -> RecommendationSettings {
        RecommendationSettings {
            match_field: self.search.match_field.trim().to_string(),
            result_window: self.search.result_window,
            recommendation_count: self.worker.recommendation_count,
            topic: self.notification.topic.clone(),
            subject: self.notification.subject.clone(),
            dequeue: self.queue.dequeue_options(),
        }
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

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(nlu) = patch.nlu {
            if let Some(base_url) = nlu.base_url {
                self.nlu.base_url = Some(base_url);
            }
            if let Some(bot_name) = nlu.bot_name {
                self.nlu.bot_name = bot_name;
            }
            if let Some(bot_alias) = nlu.bot_alias {
                self.nlu.bot_alias = bot_alias;
            }
            if let Some(nlu_api_key_value) = nlu.api_key {
                self.nlu.api_key = Some(secret_value(nlu_api_key_value));
            }
            if let Some(timeout_secs) = nlu.timeout_secs {
                self.nlu.timeout_secs = timeout_secs;
            }
        }

        if let Some(dialog) = patch.dialog {
            if let Some(intent_name) = dialog.intent_name {
                self.dialog.intent_name = intent_name;
            }
            if let Some(timezone) = dialog.timezone {
                self.dialog.timezone = timezone;
            }
            if let Some(supported_location) = dialog.supported_location {
                self.dialog.supported_location = supported_location;
            }
            if let Some(supported_cuisines) = dialog.supported_cuisines {
                self.dialog.supported_cuisines = supported_cuisines;
            }
            if let Some(suggested_cuisine) = dialog.suggested_cuisine {
                self.dialog.suggested_cuisine = suggested_cuisine;
            }
            if let Some(confirmation_message) = dialog.confirmation_message {
                self.dialog.confirmation_message = confirmation_message;
            }
        }

        if let Some(queue) = patch.queue {
            if let Some(name) = queue.name {
                self.queue.name = name;
            }
            if let Some(visibility_timeout_secs) = queue.visibility_timeout_secs {
                self.queue.visibility_timeout_secs = visibility_timeout_secs;
            }
            if let Some(wait_time_secs) = queue.wait_time_secs {
                self.queue.wait_time_secs = wait_time_secs;
            }
            if let Some(max_messages) = queue.max_messages {
                self.queue.max_messages = max_messages;
            }
            if let Some(max_receive_count) = queue.max_receive_count {
                self.queue.max_receive_count = max_receive_count;
            }
        }

        if let Some(search) = patch.search {
            if let Some(backend) = search.backend {
                self.search.backend = backend;
            }
            if let Some(base_url) = search.base_url {
                self.search.base_url = Some(base_url);
            }
            if let Some(index) = search.index {
                self.search.index = index;
            }
            if let Some(match_field) = search.match_field {
                self.search.match_field = match_field;
            }
            if let Some(username) = search.username {
                self.search.username = Some(username);
            }
            if let Some(search_password_value) = search.password {
                self.search.password = Some(secret_value(search_password_value));
            }
            if let Some(result_window) = search.result_window {
                self.search.result_window = result_window;
            }
            if let Some(timeout_secs) = search.timeout_secs {
                self.search.timeout_secs = timeout_secs;
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(backend) = notification.backend {
                self.notification.backend = backend;
            }
            if let Some(webhook_url) = notification.webhook_url {
                self.notification.webhook_url = Some(webhook_url);
            }
            if let Some(auth_token_value) = notification.auth_token {
                self.notification.auth_token = Some(secret_value(auth_token_value));
            }
            if let Some(topic) = notification.topic {
                self.notification.topic = topic;
            }
            if let Some(subject) = notification.subject {
                self.notification.subject = subject;
            }
            if let Some(timeout_secs) = notification.timeout_secs {
                self.notification.timeout_secs = timeout_secs;
            }
        }

        if let Some(worker) = patch.worker {
            if let Some(enabled) = worker.enabled {
                self.worker.enabled = enabled;
            }
            if let Some(poll_interval_secs) = worker.poll_interval_secs {
                self.worker.poll_interval_secs = poll_interval_secs;
            }
            if let Some(recommendation_count) = worker.recommendation_count {
                self.worker.recommendation_count = recommendation_count;
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
        if let Some(value) = read_env("CONCIERGE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("CONCIERGE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("CONCIERGE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_PORT") {
            self.server.port = parse_u16("CONCIERGE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CONCIERGE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_NLU_BASE_URL") {
            self.nlu.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_NLU_BOT_NAME") {
            self.nlu.bot_name = value;
        }
        if let Some(value) = read_env("CONCIERGE_NLU_BOT_ALIAS") {
            self.nlu.bot_alias = value;
        }
        if let Some(value) = read_env("CONCIERGE_NLU_API_KEY") {
            self.nlu.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONCIERGE_NLU_TIMEOUT_SECS") {
            self.nlu.timeout_secs = parse_u64("CONCIERGE_NLU_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_DIALOG_INTENT_NAME") {
            self.dialog.intent_name = value;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOG_TIMEZONE") {
            self.dialog.timezone = value;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOG_SUPPORTED_LOCATION") {
            self.dialog.supported_location = value;
        }
        if let Some(value) = read_env("CONCIERGE_DIALOG_SUPPORTED_CUISINES") {
            self.dialog.supported_cuisines = parse_list(&value);
        }

        if let Some(value) = read_env("CONCIERGE_QUEUE_NAME") {
            self.queue.name = value;
        }
        if let Some(value) = read_env("CONCIERGE_QUEUE_VISIBILITY_TIMEOUT_SECS") {
            self.queue.visibility_timeout_secs =
                parse_u64("CONCIERGE_QUEUE_VISIBILITY_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_QUEUE_WAIT_TIME_SECS") {
            self.queue.wait_time_secs = parse_u64("CONCIERGE_QUEUE_WAIT_TIME_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_QUEUE_MAX_MESSAGES") {
            self.queue.max_messages = parse_u32("CONCIERGE_QUEUE_MAX_MESSAGES", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_QUEUE_MAX_RECEIVE_COUNT") {
            self.queue.max_receive_count =
                parse_u32("CONCIERGE_QUEUE_MAX_RECEIVE_COUNT", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_SEARCH_BACKEND") {
            self.search.backend = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_BASE_URL") {
            self.search.base_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_INDEX") {
            self.search.index = value;
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_USERNAME") {
            self.search.username = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_PASSWORD") {
            self.search.password = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONCIERGE_SEARCH_RESULT_WINDOW") {
            self.search.result_window = parse_u32("CONCIERGE_SEARCH_RESULT_WINDOW", &value)?;
        }

        if let Some(value) = read_env("CONCIERGE_NOTIFICATION_BACKEND") {
            self.notification.backend = value.parse()?;
        }
        if let Some(value) = read_env("CONCIERGE_NOTIFICATION_WEBHOOK_URL") {
            self.notification.webhook_url = Some(value);
        }
        if let Some(value) = read_env("CONCIERGE_NOTIFICATION_AUTH_TOKEN") {
            self.notification.auth_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("CONCIERGE_NOTIFICATION_TOPIC") {
            self.notification.topic = value;
        }

        if let Some(value) = read_env("CONCIERGE_WORKER_ENABLED") {
            self.worker.enabled = parse_bool("CONCIERGE_WORKER_ENABLED", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_WORKER_POLL_INTERVAL_SECS") {
            self.worker.poll_interval_secs =
                parse_u64("CONCIERGE_WORKER_POLL_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("CONCIERGE_WORKER_RECOMMENDATION_COUNT") {
            self.worker.recommendation_count =
                parse_u32("CONCIERGE_WORKER_RECOMMENDATION_COUNT", &value)? as usize;
        }

        let log_level =
            read_env("CONCIERGE_LOGGING_LEVEL").or_else(|| read_env("CONCIERGE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CONCIERGE_LOGGING_FORMAT").or_else(|| read_env("CONCIERGE_LOG_FORMAT"));
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
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(search_backend) = overrides.search_backend {
            self.search.backend = search_backend;
        }
        if let Some(notification_backend) = overrides.notification_backend {
            self.notification.backend = notification_backend;
        }
        if let Some(worker_enabled) = overrides.worker_enabled {
            self.worker.enabled = worker_enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_nlu(&self.nlu)?;
        validate_dialog(&self.dialog)?;
        validate_queue(&self.queue)?;
        validate_search(&self.search)?;
        validate_notification(&self.notification)?;
        validate_worker(&self.worker)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
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

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_nlu(nlu: &NluConfig) -> Result<(), ConfigError> {
    if let Some(base_url) = &nlu.base_url {
        validate_http_url("nlu.base_url", base_url)?;
    }
    if nlu.bot_name.trim().is_empty() || nlu.bot_alias.trim().is_empty() {
        return Err(ConfigError::Validation(
            "nlu.bot_name and nlu.bot_alias must not be empty".to_string(),
        ));
    }
    validate_timeout("nlu.timeout_secs", nlu.timeout_secs)
}

fn validate_dialog(dialog: &DialogConfig) -> Result<(), ConfigError> {
    if dialog.intent_name.trim().is_empty() {
        return Err(ConfigError::Validation("dialog.intent_name must not be empty".to_string()));
    }
    dialog.timezone()?;
    if dialog.supported_location.trim().is_empty() {
        return Err(ConfigError::Validation(
            "dialog.supported_location must not be empty".to_string(),
        ));
    }
    if dialog.supported_cuisines.iter().all(|cuisine| cuisine.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "dialog.supported_cuisines must list at least one cuisine".to_string(),
        ));
    }
    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ConfigError> {
    if queue.name.trim().is_empty() {
        return Err(ConfigError::Validation("queue.name must not be empty".to_string()));
    }
    if !(1..=10).contains(&queue.max_messages) {
        return Err(ConfigError::Validation(
            "queue.max_messages must be in range 1..=10".to_string(),
        ));
    }
    if queue.wait_time_secs > 20 {
        return Err(ConfigError::Validation(
            "queue.wait_time_secs must be in range 0..=20".to_string(),
        ));
    }
    if queue.visibility_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "queue.visibility_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if queue.max_receive_count == 0 {
        return Err(ConfigError::Validation(
            "queue.max_receive_count must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.match_field.trim().is_empty() {
        return Err(ConfigError::Validation("search.match_field must not be empty".to_string()));
    }
    if search.result_window == 0 {
        return Err(ConfigError::Validation(
            "search.result_window must be greater than zero".to_string(),
        ));
    }
    validate_timeout("search.timeout_secs", search.timeout_secs)?;

    if search.backend == SearchBackend::Database
        && !DATABASE_MATCH_FIELDS.contains(&search.match_field.trim())
    {
        return Err(ConfigError::Validation(format!(
            "search.match_field `{}` is not searchable with the database backend (expected {}); \
             use the opensearch backend for other fields",
            search.match_field,
            DATABASE_MATCH_FIELDS.join("|")
        )));
    }

    if search.backend == SearchBackend::Opensearch {
        let Some(base_url) = &search.base_url else {
            return Err(ConfigError::Validation(
                "search.base_url is required for the opensearch backend".to_string(),
            ));
        };
        validate_http_url("search.base_url", base_url)?;
        if search.index.trim().is_empty() {
            return Err(ConfigError::Validation(
                "search.index is required for the opensearch backend".to_string(),
            ));
        }
        if search.username.is_some() != search.password.is_some() {
            return Err(ConfigError::Validation(
                "search.username and search.password must be set together".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_notification(notification: &NotificationConfig) -> Result<(), ConfigError> {
    if notification.topic.trim().is_empty() {
        return Err(ConfigError::Validation("notification.topic must not be empty".to_string()));
    }
    validate_timeout("notification.timeout_secs", notification.timeout_secs)?;

    if notification.backend == NotificationBackend::Webhook {
        let Some(webhook_url) = &notification.webhook_url else {
            return Err(ConfigError::Validation(
                "notification.webhook_url is required for the webhook backend".to_string(),
            ));
        };
        validate_http_url("notification.webhook_url", webhook_url)?;
        let blank_token = notification
            .auth_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(false);
        if blank_token {
            return Err(ConfigError::Validation(
                "notification.auth_token must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_worker(worker: &WorkerConfig) -> Result<(), ConfigError> {
    if worker.poll_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "worker.poll_interval_secs must be greater than zero".to_string(),
        ));
    }
    if worker.recommendation_count == 0 {
        return Err(ConfigError::Validation(
            "worker.recommendation_count must be greater than zero".to_string(),
        ));
    }
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

fn validate_timeout(key: &str, timeout_secs: u64) -> Result<(), ConfigError> {
    if timeout_secs == 0 || timeout_secs > 300 {
        return Err(ConfigError::Validation(format!("{key} must be in range 1..=300")));
    }
    Ok(())
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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
    server: Option<ServerPatch>,
    nlu: Option<NluPatch>,
    dialog: Option<DialogPatch>,
    queue: Option<QueuePatch>,
    search: Option<SearchPatch>,
    notification: Option<NotificationPatch>,
    worker: Option<WorkerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NluPatch {
    base_url: Option<String>,
    bot_name: Option<String>,
    bot_alias: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DialogPatch {
    intent_name: Option<String>,
    timezone: Option<String>,
    supported_location: Option<String>,
    supported_cuisines: Option<Vec<String>>,
    suggested_cuisine: Option<String>,
    confirmation_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct QueuePatch {
    name: Option<String>,
    visibility_timeout_secs: Option<u64>,
    wait_time_secs: Option<u64>,
    max_messages: Option<u32>,
    max_receive_count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    backend: Option<SearchBackend>,
    base_url: Option<String>,
    index: Option<String>,
    match_field: Option<String>,
    username: Option<String>,
    password: Option<String>,
    result_window: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    backend: Option<NotificationBackend>,
    webhook_url: Option<String>,
    auth_token: Option<String>,
    topic: Option<String>,
    subject: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerPatch {
    enabled: Option<bool>,
    poll_interval_secs: Option<u64>,
    recommendation_count: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, NotificationBackend,
        SearchBackend,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_match_the_dining_deployment() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.nlu.bot_name == "AI_Concierge", "default bot name")?;
        ensure(config.nlu.bot_alias == "test", "default bot alias")?;
        ensure(config.dialog.timezone == "America/New_York", "default timezone")?;
        ensure(config.dialog.supported_cuisines.len() == 7, "seven supported cuisines")?;
        ensure(config.search.result_window == 200, "search window of 200")?;
        ensure(config.worker.recommendation_count == 3, "three recommendations")?;
        ensure(config.notification.topic == "restaurantRecommendation", "default topic")?;

        let settings = config.recommendation_settings();
        ensure(settings.match_field == "categories", "match on categories")?;
        ensure(
            settings.dequeue.visibility_timeout == Duration::from_secs(10),
            "ten second visibility timeout",
        )?;
        ensure(settings.dequeue.wait == Duration::ZERO, "no long poll by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CONCIERGE_SEARCH_PASSWORD", "hunter2");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[search]
backend = "opensearch"
base_url = "https://search.example.com"
username = "admin"
password = "${TEST_CONCIERGE_SEARCH_PASSWORD}"

[dialog]
supported_cuisines = ["thai", "korean"]
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.search.backend == SearchBackend::Opensearch, "backend from file")?;
            ensure(
                config.search.password.as_ref().map(|p| p.expose_secret() == "hunter2")
                    == Some(true),
                "password should be interpolated from the environment",
            )?;
            ensure(
                config.dialog.validation_rules().supported_cuisines
                    == vec!["thai".to_string(), "korean".to_string()],
                "cuisines should come from the file",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CONCIERGE_SEARCH_PASSWORD"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_LOG_LEVEL", "warn");
        env::set_var("CONCIERGE_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_LOG_LEVEL", "CONCIERGE_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("CONCIERGE_QUEUE_MAX_MESSAGES", "4");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("concierge.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[queue]
max_messages = 2
wait_time_secs = 5

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    notification_backend: Some(NotificationBackend::Log),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.queue.max_messages == 4, "env max_messages should win over file")?;
            ensure(config.queue.wait_time_secs == 5, "file wait time should win over default")?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_DATABASE_URL", "CONCIERGE_QUEUE_MAX_MESSAGES"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_NOTIFICATION_BACKEND", "webhook");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("notification.webhook_url")
            );
            ensure(has_message, "validation failure should mention notification.webhook_url")
        })();

        clear_vars(&["CONCIERGE_NOTIFICATION_BACKEND"]);
        result
    }

    #[test]
    fn database_backend_rejects_unsearchable_match_field() -> Result<(), String> {
        let mut config = AppConfig::default();
        config.search.match_field = "cuisine".to_string();

        let error =
            config.validate().err().ok_or_else(|| "expected match field rejection".to_string())?;
        ensure(
            matches!(error, ConfigError::Validation(ref message)
                if message.contains("search.match_field") && message.contains("categories|name")),
            "validation failure should name search.match_field and the supported fields",
        )?;

        config.search.match_field = "name".to_string();
        ensure(config.validate().is_ok(), "name is a supported database match field")?;

        config.search.match_field = "cuisine".to_string();
        config.search.backend = SearchBackend::Opensearch;
        config.search.base_url = Some("http://localhost:9200".to_string());
        ensure(config.validate().is_ok(), "opensearch accepts arbitrary match fields")
    }

    #[test]
    fn unknown_timezones_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_DIALOG_TIMEZONE", "Mars/Olympus_Mons");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected timezone validation failure".to_string())?;
            ensure(
                matches!(error, ConfigError::Validation(ref message) if message.contains("dialog.timezone")),
                "validation failure should mention dialog.timezone",
            )
        })();

        clear_vars(&["CONCIERGE_DIALOG_TIMEZONE"]);
        result
    }

    #[test]
    fn invalid_numeric_env_values_are_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_SERVER_PORT", "eighty");

        let result = (|| -> Result<(), String> {
            let error = AppConfig::load(LoadOptions::default())
                .err()
                .ok_or_else(|| "expected env override failure".to_string())?;
            ensure(
                matches!(error, ConfigError::InvalidEnvOverride { ref key, .. } if key == "CONCIERGE_SERVER_PORT"),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["CONCIERGE_SERVER_PORT"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CONCIERGE_NLU_API_KEY", "nlu-secret-value");
        env::set_var("CONCIERGE_NOTIFICATION_AUTH_TOKEN", "notify-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("nlu-secret-value"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("notify-secret-value"),
                "debug output should not contain auth token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["CONCIERGE_NLU_API_KEY", "CONCIERGE_NOTIFICATION_AUTH_TOKEN"]);
        result
    }
}
