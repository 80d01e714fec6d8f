use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use reimburse_core::config::RetentionConfig;
use reimburse_core::retention::RetentionPolicy;
use reimburse_db::repositories::RequestRepository;
use reimburse_db::run_sweep;

use crate::audit::TracingAuditSink;

/// Starts the periodic retention sweep. Returns `None` when retention is disabled.
pub fn spawn(
    repository: Arc<dyn RequestRepository>,
    config: &RetentionConfig,
) -> Option<JoinHandle<()>> {
    if !config.enabled {
        info!(
            event_name = "system.retention.disabled",
            correlation_id = "bootstrap",
            "retention sweep disabled by configuration"
        );
        return None;
    }

    let policy = RetentionPolicy::from_config(config);
    let period = Duration::from_secs(config.sweep_interval_secs);
    info!(
        event_name = "system.retention.start",
        correlation_id = "bootstrap",
        interval_secs = config.sweep_interval_secs,
        "retention sweep scheduled"
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let correlation_id = format!("retention-{}", Uuid::new_v4());
            let result = run_sweep(
                repository.as_ref(),
                &policy,
                Utc::now(),
                &TracingAuditSink,
                &correlation_id,
            )
            .await;
            if let Err(err) = result {
                error!(
                    event_name = "retention.sweep_failed",
                    correlation_id = %correlation_id,
                    error = %err,
                    "retention sweep failed"
                );
            }
        }
    }))
}
