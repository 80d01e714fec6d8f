use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub notification: NotificationConfig,
    pub retention: RetentionConfig,
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

#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    pub tokens: Vec<TokenGrant>,
}

/// A bearer token and the identity it stands for.
#[derive(Clone, Debug)]
pub struct TokenGrant {
    pub token: SecretString,
    pub idir: String,
    pub roles: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub frontend_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
    pub deleted_retention_days: u32,
    pub file_retention_days: u32,
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
    pub server_port: Option<u16>,
    pub auth_tokens: Option<Vec<TokenGrant>>,
    pub notification_enabled: Option<bool>,
    pub notification_endpoint: Option<String>,
    pub retention_enabled: Option<bool>,
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
                url: "sqlite://reimburse.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            auth: AuthConfig::default(),
            notification: NotificationConfig {
                enabled: false,
                endpoint: None,
                api_key: None,
                frontend_url: "http://localhost:3000".to_string(),
                timeout_secs: 10,
            },
            retention: RetentionConfig {
                enabled: true,
                sweep_interval_secs: 86_400,
                deleted_retention_days: 30,
                file_retention_days: 90,
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("reimburse.toml"));
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

        if let Some(auth) = patch.auth {
            if let Some(tokens) = auth.tokens {
                self.auth.tokens = tokens
                    .into_iter()
                    .map(|grant| TokenGrant {
                        token: secret_value(grant.token), // ubs:ignore
                        idir: grant.idir,
                        roles: grant.roles,
                    })
                    .collect();
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(enabled) = notification.enabled {
                self.notification.enabled = enabled;
            }
            if let Some(endpoint) = notification.endpoint {
                self.notification.endpoint = Some(endpoint);
            }
            if let Some(api_key) = notification.api_key {
                self.notification.api_key = Some(secret_value(api_key)); // ubs:ignore
            }
            if let Some(frontend_url) = notification.frontend_url {
                self.notification.frontend_url = frontend_url;
            }
            if let Some(timeout_secs) = notification.timeout_secs {
                self.notification.timeout_secs = timeout_secs;
            }
        }

        if let Some(retention) = patch.retention {
            if let Some(enabled) = retention.enabled {
                self.retention.enabled = enabled;
            }
            if let Some(sweep_interval_secs) = retention.sweep_interval_secs {
                self.retention.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(deleted_retention_days) = retention.deleted_retention_days {
                self.retention.deleted_retention_days = deleted_retention_days;
            }
            if let Some(file_retention_days) = retention.file_retention_days {
                self.retention.file_retention_days = file_retention_days;
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
        if let Some(value) = read_env("REIMBURSE_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REIMBURSE_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("REIMBURSE_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REIMBURSE_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REIMBURSE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("REIMBURSE_SERVER_PORT") {
            self.server.port = parse_u16("REIMBURSE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("REIMBURSE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("REIMBURSE_NOTIFICATION_ENABLED") {
            self.notification.enabled = parse_bool("REIMBURSE_NOTIFICATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_NOTIFICATION_ENDPOINT") {
            self.notification.endpoint = Some(value);
        }
        if let Some(value) = read_env("REIMBURSE_NOTIFICATION_API_KEY") {
            self.notification.api_key = Some(secret_value(value)); // ubs:ignore
        }
        if let Some(value) = read_env("REIMBURSE_NOTIFICATION_FRONTEND_URL") {
            self.notification.frontend_url = value;
        }
        if let Some(value) = read_env("REIMBURSE_NOTIFICATION_TIMEOUT_SECS") {
            self.notification.timeout_secs =
                parse_u64("REIMBURSE_NOTIFICATION_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REIMBURSE_RETENTION_ENABLED") {
            self.retention.enabled = parse_bool("REIMBURSE_RETENTION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_RETENTION_SWEEP_INTERVAL_SECS") {
            self.retention.sweep_interval_secs =
                parse_u64("REIMBURSE_RETENTION_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_RETENTION_DELETED_RETENTION_DAYS") {
            self.retention.deleted_retention_days =
                parse_u32("REIMBURSE_RETENTION_DELETED_RETENTION_DAYS", &value)?;
        }
        if let Some(value) = read_env("REIMBURSE_RETENTION_FILE_RETENTION_DAYS") {
            self.retention.file_retention_days =
                parse_u32("REIMBURSE_RETENTION_FILE_RETENTION_DAYS", &value)?;
        }

        let log_level =
            read_env("REIMBURSE_LOGGING_LEVEL").or_else(|| read_env("REIMBURSE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REIMBURSE_LOGGING_FORMAT").or_else(|| read_env("REIMBURSE_LOG_FORMAT"));
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
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(tokens) = overrides.auth_tokens {
            self.auth.tokens = tokens;
        }
        if let Some(enabled) = overrides.notification_enabled {
            self.notification.enabled = enabled;
        }
        if let Some(endpoint) = overrides.notification_endpoint {
            self.notification.endpoint = Some(endpoint);
        }
        if let Some(enabled) = overrides.retention_enabled {
            self.retention.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_notification(&self.notification)?;
        validate_retention(&self.retention)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("reimburse.toml"), PathBuf::from("config/reimburse.toml")]
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

fn validate_auth(auth: &AuthConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (index, grant) in auth.tokens.iter().enumerate() {
        let token = grant.token.expose_secret(); // ubs:ignore
        if token.trim().is_empty() {
            return Err(ConfigError::Validation(format!("auth.tokens[{index}].token is required")));
        }
        if grant.idir.trim().is_empty() {
            return Err(ConfigError::Validation(format!("auth.tokens[{index}].idir is required")));
        }
        if !seen.insert(token) {
            return Err(ConfigError::Validation(format!(
                "auth.tokens[{index}].token duplicates an earlier grant"
            )));
        }
    }

    Ok(())
}

fn validate_notification(notification: &NotificationConfig) -> Result<(), ConfigError> {
    if notification.enabled {
        let endpoint = notification.endpoint.as_deref().map(str::trim).unwrap_or_default();
        if endpoint.is_empty() {
            return Err(ConfigError::Validation(
                "notification.endpoint is required when notification.enabled is true".to_string(),
            ));
        }
        if !is_http_url(endpoint) {
            return Err(ConfigError::Validation(
                "notification.endpoint must start with http:// or https://".to_string(),
            ));
        }
    }

    if !is_http_url(&notification.frontend_url) {
        return Err(ConfigError::Validation(
            "notification.frontend_url must start with http:// or https://".to_string(),
        ));
    }

    if notification.timeout_secs == 0 || notification.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "notification.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_retention(retention: &RetentionConfig) -> Result<(), ConfigError> {
    if retention.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "retention.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    if retention.deleted_retention_days == 0 || retention.file_retention_days == 0 {
        return Err(ConfigError::Validation(
            "retention.deleted_retention_days and retention.file_retention_days must be greater than zero"
                .to_string(),
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
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
    auth: Option<AuthPatch>,
    notification: Option<NotificationPatch>,
    retention: Option<RetentionPatch>,
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
struct AuthPatch {
    tokens: Option<Vec<TokenGrantPatch>>,
}

#[derive(Debug, Deserialize)]
struct TokenGrantPatch {
    token: String,
    idir: String,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    enabled: Option<bool>,
    endpoint: Option<String>,
    api_key: Option<String>,
    frontend_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RetentionPatch {
    enabled: Option<bool>,
    sweep_interval_secs: Option<u64>,
    deleted_retention_days: Option<u32>,
    file_retention_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
