use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use reimburse_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use reimburse_core::domain::request::{
    NewRequest, RequestId, RequestListing, RequestQuery, RequestRecord, RequestUpdate,
};
use reimburse_core::errors::ApplicationError;
use reimburse_core::intake::{check_submission, check_update};
use reimburse_core::lifecycle::{can_mutate, Caller, LifecycleEngine};
use reimburse_core::notify::{NotificationDispatcher, StateChangeNotice};
use reimburse_db::repositories::{RepositoryError, RequestRepository, UpdateOutcome};

/// Orchestrates the four request operations over the store, the lifecycle engine and the
/// notification dispatcher.
pub struct RequestService {
    repository: Arc<dyn RequestRepository>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    audit: Arc<dyn AuditSink>,
    engine: LifecycleEngine,
    frontend_url: String,
}

impl RequestService {
    pub fn new(
        repository: Arc<dyn RequestRepository>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        audit: Arc<dyn AuditSink>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            dispatcher,
            audit,
            engine: LifecycleEngine::new(),
            frontend_url: frontend_url.into(),
        }
    }

    pub async fn create(
        &self,
        caller: &Caller,
        submission: NewRequest,
        correlation_id: &str,
    ) -> Result<RequestRecord, ApplicationError> {
        check_submission(&submission)?;
        authorize(caller, &submission.idir)?;

        let record = RequestRecord::from_submission(submission, Utc::now());
        self.repository.insert(record.clone()).await.map_err(|error| match error {
            RepositoryError::Duplicate(id) => ApplicationError::Conflict(id),
            other => persistence(other),
        })?;

        let context = AuditContext::new(Some(record.id.clone()), correlation_id, &caller.idir);
        self.audit.emit(
            AuditEvent::new(
                &context,
                "request.created",
                AuditCategory::Intake,
                AuditOutcome::Success,
            )
            .with_metadata("state", record.state.as_str()),
        );

        Ok(record)
    }

    /// An unscoped listing spans every requestor and is therefore admin-only.
    pub async fn list(
        &self,
        caller: &Caller,
        query: RequestQuery,
        minimal: bool,
    ) -> Result<RequestListing, ApplicationError> {
        match query.idir.as_deref() {
            Some(idir) => authorize(caller, idir)?,
            None if caller.is_admin() => {}
            None => {
                return Err(ApplicationError::Forbidden {
                    caller: caller.idir.clone(),
                    owner: "*".to_string(),
                })
            }
        }

        let records = self.repository.list(&query).await.map_err(persistence)?;
        if records.is_empty() {
            return Err(ApplicationError::NotFound(
                "no requests were submitted in the requested range".to_string(),
            ));
        }

        Ok(if minimal {
            RequestListing::Minimal(records.iter().map(RequestRecord::summary).collect())
        } else {
            RequestListing::Full(records)
        })
    }

    pub async fn get(
        &self,
        caller: &Caller,
        raw_id: &str,
    ) -> Result<RequestRecord, ApplicationError> {
        let id = RequestId::parse(raw_id)?;
        let record = self.find(&id).await?;
        authorize(caller, &record.idir)?;
        Ok(record)
    }

    /// Validates the update, applies the lifecycle transition and persists it with a
    /// compare-and-swap on the record revision. The transition is audited only after the
    /// store has accepted or refused it.
    pub async fn update(
        &self,
        caller: &Caller,
        raw_id: &str,
        update: RequestUpdate,
        correlation_id: &str,
    ) -> Result<RequestRecord, ApplicationError> {
        let id = RequestId::parse(raw_id)?;
        check_update(&update)?;
        let update = update.validate()?;

        let existing = self.find(&id).await?;
        let context = AuditContext::new(Some(id.clone()), correlation_id, &caller.idir);
        if let Err(error) = authorize(caller, &existing.idir) {
            self.audit.emit(
                AuditEvent::new(
                    &context,
                    "request.update_rejected",
                    AuditCategory::Access,
                    AuditOutcome::Rejected,
                )
                .with_metadata("owner", existing.idir.clone()),
            );
            return Err(error);
        }

        let plan = self.engine.plan(&existing, update, caller, Utc::now());
        let state_changed = plan.state_changed();

        let (reason, error) = match self.repository.update(plan.record.clone()).await {
            Ok(UpdateOutcome::Applied(persisted)) => {
                let event = plan.transition_event(&context, caller, AuditOutcome::Success, None);
                self.audit.emit(event);
                if state_changed {
                    self.notify(&persisted, correlation_id);
                }
                return Ok(persisted);
            }
            Ok(UpdateOutcome::Stale) => ("conflict", ApplicationError::Conflict(id.0.clone())),
            Ok(UpdateOutcome::Missing) => {
                ("not_found", ApplicationError::NotFound(format!("request {id}")))
            }
            Err(error) => ("persistence", persistence(error)),
        };

        let event = plan.transition_event(&context, caller, AuditOutcome::Failed, Some(reason));
        self.audit.emit(event);
        Err(error)
    }

    async fn find(&self, id: &RequestId) -> Result<RequestRecord, ApplicationError> {
        self.repository
            .find_by_id(id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| ApplicationError::NotFound(format!("request {id}")))
    }

    /// Fire-and-forget: delivery runs on its own task and never affects the caller.
    fn notify(&self, record: &RequestRecord, correlation_id: &str) {
        let Some(notice) = StateChangeNotice::for_record(record, &self.frontend_url) else {
            debug!(
                event_name = "notification.no_recipient",
                correlation_id,
                request_id = %record.id,
                "request has no email address; skipping state change notice"
            );
            return;
        };

        let dispatcher = Arc::clone(&self.dispatcher);
        let correlation_id = correlation_id.to_string();
        tokio::spawn(async move {
            let request_id = notice.request_id.clone();
            if let Err(error) = dispatcher.dispatch(notice).await {
                warn!(
                    event_name = "notification.failed",
                    correlation_id = %correlation_id,
                    request_id = %request_id,
                    error = %error,
                    "state change notice could not be delivered"
                );
            }
        });
    }
}

fn authorize(caller: &Caller, owner_idir: &str) -> Result<(), ApplicationError> {
    if can_mutate(caller, owner_idir) {
        Ok(())
    } else {
        Err(ApplicationError::Forbidden {
            caller: caller.idir.clone(),
            owner: owner_idir.to_string(),
        })
    }
}

fn persistence(error: RepositoryError) -> ApplicationError {
    ApplicationError::Persistence(error.to_string())
}
