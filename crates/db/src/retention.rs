use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use reimburse_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use reimburse_core::retention::RetentionPolicy;

use crate::repositories::{RepositoryError, RequestRepository};

const SWEEP_ACTOR: &str = "retention";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub files_purged: u64,
    pub records_deleted: u64,
}

/// One retention pass: strip attachment content, then hard-delete expired `Deleted` records.
/// The outcome is recorded on `audit` either way.
pub async fn run_sweep(
    repo: &dyn RequestRepository,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
    audit: &dyn AuditSink,
    correlation_id: &str,
) -> Result<SweepReport, RepositoryError> {
    let context = AuditContext::new(None, correlation_id, SWEEP_ACTOR);

    let result = sweep(repo, policy, now).await;
    match &result {
        Ok(report) => {
            info!(
                event_name = "retention.sweep_completed",
                correlation_id,
                files_purged = report.files_purged,
                records_deleted = report.records_deleted,
                "retention sweep completed"
            );
            audit.emit(
                AuditEvent::new(
                    &context,
                    "retention.sweep_completed",
                    AuditCategory::Retention,
                    AuditOutcome::Success,
                )
                .with_metadata("files_purged", report.files_purged.to_string())
                .with_metadata("records_deleted", report.records_deleted.to_string()),
            );
        }
        Err(error) => audit.emit(
            AuditEvent::new(
                &context,
                "retention.sweep_failed",
                AuditCategory::Retention,
                AuditOutcome::Failed,
            )
            .with_metadata("error", error.to_string()),
        ),
    }

    result
}

async fn sweep(
    repo: &dyn RequestRepository,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<SweepReport, RepositoryError> {
    let files_purged = repo.purge_file_content(policy, now).await?;
    let records_deleted = repo.delete_expired(policy, now).await?;
    Ok(SweepReport { files_purged, records_deleted })
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};

    use reimburse_core::audit::{AuditCategory, AuditOutcome, InMemoryAuditSink};
    use reimburse_core::domain::request::{RequestId, RequestQuery, RequestRecord};
    use reimburse_core::retention::RetentionPolicy;

    use super::{run_sweep, SweepReport};
    use crate::repositories::{
        InMemoryRequestRepository, RepositoryError, RequestRepository, UpdateOutcome,
    };

    struct BrokenStore;

    #[async_trait]
    impl RequestRepository for BrokenStore {
        async fn insert(&self, _record: RequestRecord) -> Result<(), RepositoryError> {
            Ok(())
        }

        async fn find_by_id(
            &self,
            _id: &RequestId,
        ) -> Result<Option<RequestRecord>, RepositoryError> {
            Ok(None)
        }

        async fn list(&self, _query: &RequestQuery) -> Result<Vec<RequestRecord>, RepositoryError> {
            Ok(Vec::new())
        }

        async fn update(&self, _record: RequestRecord) -> Result<UpdateOutcome, RepositoryError> {
            Ok(UpdateOutcome::Missing)
        }

        async fn purge_file_content(
            &self,
            _policy: &RetentionPolicy,
            _now: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            Err(RepositoryError::Decode("purchases_json: unexpected end".to_string()))
        }

        async fn delete_expired(
            &self,
            _policy: &RetentionPolicy,
            _now: DateTime<Utc>,
        ) -> Result<u64, RepositoryError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn completed_sweep_is_audited_with_counts() {
        let sink = InMemoryAuditSink::default();
        let repo = InMemoryRequestRepository::default();

        let report = run_sweep(&repo, &RetentionPolicy::default(), Utc::now(), &sink, "sweep-1")
            .await
            .expect("sweep");

        assert_eq!(report, SweepReport::default());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "retention.sweep_completed");
        assert_eq!(events[0].category, AuditCategory::Retention);
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[0].correlation_id, "sweep-1");
        assert_eq!(events[0].metadata.get("files_purged").map(String::as_str), Some("0"));
    }

    #[tokio::test]
    async fn failed_sweep_is_audited_as_failed() {
        let sink = InMemoryAuditSink::default();

        let result =
            run_sweep(&BrokenStore, &RetentionPolicy::default(), Utc::now(), &sink, "sweep-2")
                .await;

        assert!(matches!(result, Err(RepositoryError::Decode(_))));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "retention.sweep_failed");
        assert_eq!(events[0].outcome, AuditOutcome::Failed);
    }
}
