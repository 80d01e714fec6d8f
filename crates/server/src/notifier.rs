use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use reimburse_core::config::NotificationConfig;
use reimburse_core::notify::{NotificationDispatcher, NotificationError, StateChangeNotice};

/// Posts each notice as JSON to the configured notification endpoint.
pub struct WebhookDispatcher {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl WebhookDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| NotificationError::Client(error.to_string()))?;
        Ok(Self { client, endpoint: endpoint.into(), api_key })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn dispatch(&self, notice: StateChangeNotice) -> Result<(), NotificationError> {
        let mut request = self.client.post(&self.endpoint).json(&notice);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|error| NotificationError::Delivery(error.to_string()))?;
        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "notification endpoint returned {}",
                response.status()
            )));
        }

        info!(
            event_name = "notification.delivered",
            request_id = %notice.request_id,
            state = %notice.state,
            "state change notice delivered"
        );
        Ok(())
    }
}

/// Stand-in used when notifications are disabled; notices only reach the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn dispatch(&self, notice: StateChangeNotice) -> Result<(), NotificationError> {
        info!(
            event_name = "notification.skipped",
            request_id = %notice.request_id,
            state = %notice.state,
            state_change_url = %notice.state_change_url,
            "notifications disabled; state change notice not sent"
        );
        Ok(())
    }
}

pub fn build_dispatcher(
    config: &NotificationConfig,
) -> Result<Arc<dyn NotificationDispatcher>, NotificationError> {
    match (config.enabled, config.endpoint.as_deref()) {
        (true, Some(endpoint)) => Ok(Arc::new(WebhookDispatcher::new(
            endpoint,
            config.api_key.clone(),
            Duration::from_secs(config.timeout_secs),
        )?)),
        (true, None) => {
            Err(NotificationError::Client("notification endpoint is not configured".to_string()))
        }
        (false, _) => Ok(Arc::new(LoggingDispatcher)),
    }
}

#[cfg(test)]
mod tests {
    use reimburse_core::config::AppConfig;

    use super::build_dispatcher;

    #[test]
    fn disabled_notifications_build_a_logging_dispatcher() {
        let config = AppConfig::default();
        assert!(build_dispatcher(&config.notification).is_ok());
    }

    #[test]
    fn enabled_notifications_require_an_endpoint() {
        let mut config = AppConfig::default().notification;
        config.enabled = true;
        config.endpoint = None;
        assert!(build_dispatcher(&config).is_err());

        config.endpoint = Some("http://127.0.0.1:9/notify".to_string());
        assert!(build_dispatcher(&config).is_ok());
    }
}
