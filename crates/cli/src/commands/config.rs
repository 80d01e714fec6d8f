use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use reimburse_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{load_options, CommandResult};

pub fn run(config_path: Option<&Path>) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let source = SourceResolver::new(config_path);
    CommandResult { exit_code: 0, output: render(&config, &source) }
}

fn render(config: &AppConfig, source: &SourceResolver) -> String {
    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_key: Option<&str>| {
        lines.push(format!("- {key} = {value} (source: {})", source.describe(key, env_key)));
    };

    push("database.url", &config.database.url, Some("REIMBURSE_DATABASE_URL"));
    push(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        Some("REIMBURSE_DATABASE_MAX_CONNECTIONS"),
    );
    push(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        Some("REIMBURSE_DATABASE_TIMEOUT_SECS"),
    );

    push("server.bind_address", &config.server.bind_address, Some("REIMBURSE_SERVER_BIND_ADDRESS"));
    push("server.port", &config.server.port.to_string(), Some("REIMBURSE_SERVER_PORT"));
    push(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        Some("REIMBURSE_SERVER_GRACEFUL_SHUTDOWN_SECS"),
    );

    let grants: Vec<String> = config
        .auth
        .tokens
        .iter()
        .map(|grant| {
            let roles =
                if grant.roles.is_empty() { "-".to_string() } else { grant.roles.join("+") };
            format!("{}[{}]:{}", grant.idir, roles, redact_token(grant.token.expose_secret()))
        })
        .collect();
    let grants = if grants.is_empty() { "<none>".to_string() } else { grants.join(", ") };
    push("auth.tokens", &grants, None);

    push(
        "notification.enabled",
        &config.notification.enabled.to_string(),
        Some("REIMBURSE_NOTIFICATION_ENABLED"),
    );
    push(
        "notification.endpoint",
        config.notification.endpoint.as_deref().unwrap_or("<unset>"),
        Some("REIMBURSE_NOTIFICATION_ENDPOINT"),
    );
    let api_key = if config.notification.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("notification.api_key", api_key, Some("REIMBURSE_NOTIFICATION_API_KEY"));
    push(
        "notification.frontend_url",
        &config.notification.frontend_url,
        Some("REIMBURSE_NOTIFICATION_FRONTEND_URL"),
    );

    push(
        "retention.enabled",
        &config.retention.enabled.to_string(),
        Some("REIMBURSE_RETENTION_ENABLED"),
    );
    push(
        "retention.sweep_interval_secs",
        &config.retention.sweep_interval_secs.to_string(),
        Some("REIMBURSE_RETENTION_SWEEP_INTERVAL_SECS"),
    );
    push(
        "retention.deleted_retention_days",
        &config.retention.deleted_retention_days.to_string(),
        Some("REIMBURSE_RETENTION_DELETED_RETENTION_DAYS"),
    );
    push(
        "retention.file_retention_days",
        &config.retention.file_retention_days.to_string(),
        Some("REIMBURSE_RETENTION_FILE_RETENTION_DAYS"),
    );

    push("logging.level", &config.logging.level, Some("REIMBURSE_LOGGING_LEVEL"));
    push(
        "logging.format",
        &format!("{:?}", config.logging.format),
        Some("REIMBURSE_LOGGING_FORMAT"),
    );

    lines.join("\n")
}

struct SourceResolver {
    path: Option<PathBuf>,
    doc: Option<Value>,
}

impl SourceResolver {
    fn new(explicit: Option<&Path>) -> Self {
        let path = explicit.map(Path::to_path_buf).or_else(detect_config_path);
        let doc = path.as_deref().and_then(load_config_file_doc);
        Self { path, doc }
    }

    fn describe(&self, key_path: &str, env_key: Option<&str>) -> String {
        if let Some(env_key) = env_key {
            if env::var(env_key).map(|value| !value.trim().is_empty()).unwrap_or(false) {
                return format!("env ({env_key})");
            }
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_deref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("reimburse.toml"), PathBuf::from("config/reimburse.toml")]
        .into_iter()
        .find(|path| path.exists())
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

/// Keeps the last four characters so operators can tell grants apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    let count = trimmed.chars().count();
    if count == 0 {
        return "<empty>".to_string();
    }
    if count <= 8 {
        return "<redacted>".to_string();
    }

    let tail: String = trimmed.chars().skip(count - 4).collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn short_tokens_are_fully_redacted() {
        assert_eq!(redact_token("abc"), "<redacted>");
        assert_eq!(redact_token("  "), "<empty>");
    }

    #[test]
    fn long_tokens_keep_only_a_short_tail() {
        assert_eq!(redact_token("forms-service-0123456789"), "***6789");
    }
}
