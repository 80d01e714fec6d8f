use std::path::Path;

use chrono::Utc;
use reimburse_core::audit::{AuditEvent, InMemoryAuditSink};
use reimburse_core::retention::RetentionPolicy;
use reimburse_db::repositories::SqlRequestRepository;
use reimburse_db::{connect_with_settings, migrations, run_sweep, SweepReport};
use serde::Serialize;

use crate::commands::{prepare, CommandResult};

const CORRELATION_ID: &str = "cli-purge";

#[derive(Debug, Serialize)]
struct PurgeDetails {
    #[serde(flatten)]
    report: SweepReport,
    audit: Vec<AuditEvent>,
}

/// Runs a single retention sweep regardless of `retention.enabled`; the flag only governs
/// the server's background schedule.
pub fn run(config_path: Option<&Path>) -> CommandResult {
    let (config, runtime) = match prepare("purge", config_path) {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let policy = RetentionPolicy::from_config(&config.retention);
    let audit = InMemoryAuditSink::default();

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let repository = SqlRequestRepository::new(pool.clone());
        let report = run_sweep(&repository, &policy, Utc::now(), &audit, CORRELATION_ID)
            .await
            .map_err(|error| ("retention", error.to_string(), 6u8))?;
        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(report)
    });

    match result {
        Ok(report) => CommandResult::success_with(
            "purge",
            format!(
                "purged attachment content from {} request(s); removed {} expired deleted request(s)",
                report.files_purged, report.records_deleted
            ),
            Some(PurgeDetails { report, audit: audit.events() }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("purge", error_class, message, exit_code)
        }
    }
}
