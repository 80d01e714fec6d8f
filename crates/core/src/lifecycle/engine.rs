use chrono::{DateTime, Utc};

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use crate::domain::request::{stored_instant, RequestRecord, RequestState, ValidatedUpdate};
use crate::lifecycle::authorization::Caller;
use crate::lifecycle::completeness::{first_gap, CompletenessGap};

/// Decides the state a request moves to after a mutation.
///
/// Admins set the state verbatim (or keep the current one when they propose nothing).
/// For everyone else the proposal is ignored and completeness decides: an incomplete
/// request always lands in `Incomplete`, a complete one recovers from `Incomplete` to
/// `Submitted`, and any other complete request keeps its state.
pub fn compute_next_state(
    existing: RequestState,
    proposed: Option<RequestState>,
    is_admin: bool,
    complete: bool,
) -> RequestState {
    if is_admin {
        return proposed.unwrap_or(existing);
    }

    match (complete, existing) {
        (true, RequestState::Incomplete) => RequestState::Submitted,
        (true, unchanged) => unchanged,
        (false, _) => RequestState::Incomplete,
    }
}

/// Result of planning an update: the merged record to persist and the transition it implies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatePlan {
    pub record: RequestRecord,
    pub from: RequestState,
    pub to: RequestState,
    pub proposed: Option<RequestState>,
    pub gap: Option<CompletenessGap>,
}

impl UpdatePlan {
    pub fn state_changed(&self) -> bool {
        self.from != self.to
    }

    pub fn is_complete(&self) -> bool {
        self.gap.is_none()
    }

    /// Audit record for this transition once the store has accepted or refused it.
    /// `Success` yields `request.transition_applied`; any other outcome yields
    /// `request.transition_failed` carrying `reason`.
    pub fn transition_event(
        &self,
        context: &AuditContext,
        caller: &Caller,
        outcome: AuditOutcome,
        reason: Option<&str>,
    ) -> AuditEvent {
        let event_type = match outcome {
            AuditOutcome::Success => "request.transition_applied",
            AuditOutcome::Rejected | AuditOutcome::Failed => "request.transition_failed",
        };
        let mut event = AuditEvent::new(context, event_type, AuditCategory::Lifecycle, outcome)
            .with_metadata("from", self.from.as_str())
            .with_metadata("to", self.to.as_str())
            .with_metadata("admin", caller.is_admin().to_string())
            .with_metadata("complete", self.is_complete().to_string());
        if let Some(proposed) = self.proposed {
            event = event.with_metadata("proposed", proposed.as_str());
        }
        if let Some(gap) = self.gap {
            event = event.with_metadata("gap", gap.as_str());
        }
        if let Some(reason) = reason {
            event = event.with_metadata("reason", reason);
        }
        event
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct LifecycleEngine;

impl LifecycleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Merges `update` over `existing` and computes the next state. Authorization is the
    /// caller's responsibility; this only reads the caller's admin flag.
    pub fn plan(
        &self,
        existing: &RequestRecord,
        update: ValidatedUpdate,
        caller: &Caller,
        now: DateTime<Utc>,
    ) -> UpdatePlan {
        let mut record = existing.clone();
        if let Some(employee_id) = update.employee_id {
            record.employee_id = Some(employee_id);
        }
        if let Some(purchases) = update.purchases {
            record.purchases = purchases;
        }
        if let Some(approvals) = update.approvals {
            record.approvals = approvals;
        }
        if let Some(comments) = update.additional_comments {
            record.additional_comments = Some(comments);
        }

        let gap = first_gap(record.employee_id, &record.purchases, &record.approvals);
        let from = existing.state;
        let proposed = update.state;
        let to = compute_next_state(from, proposed, caller.is_admin(), gap.is_none());

        record.state = to;
        if to != from {
            record.state_changed_at = stored_instant(now);
        }

        UpdatePlan { record, from, to, proposed, gap }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{compute_next_state, LifecycleEngine};
    use crate::audit::{AuditContext, AuditOutcome};
    use crate::domain::request::{
        Approval, FileAttachment, NewRequest, Purchase, RequestRecord, RequestState,
        RequestUpdate,
    };
    use crate::lifecycle::authorization::{Caller, ADMIN_ROLE};

    fn file() -> FileAttachment {
        FileAttachment {
            name: "scan.png".to_string(),
            mime_type: Some("image/png".to_string()),
            size: 3,
            content: Some("AAA".to_string()),
        }
    }

    fn purchase(with_file: bool) -> Purchase {
        Purchase {
            supplier: "X".to_string(),
            purchase_date: "2024-01-01T00:00:00-07:00".parse().expect("date"),
            cost: Decimal::new(10, 0),
            files: if with_file { vec![file()] } else { Vec::new() },
        }
    }

    fn approval() -> Approval {
        Approval { approval_date: None, approver: None, files: vec![file()] }
    }

    fn record(state: RequestState) -> RequestRecord {
        let mut record = RequestRecord::from_submission(
            NewRequest {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                employee_id: Some(1),
                idir: "AAAA0001".to_string(),
                email: Some("grace@example.org".to_string()),
                purchases: vec![purchase(false)],
                approvals: Vec::new(),
                additional_comments: Some("original".to_string()),
                late_entry: false,
                submit: true,
            },
            Utc::now() - Duration::days(3),
        );
        record.state = state;
        record
    }

    fn owner() -> Caller {
        Caller::new("AAAA0001", Vec::<String>::new())
    }

    fn admin() -> Caller {
        Caller::new("ADMIN001", [ADMIN_ROLE])
    }

    fn complete_update() -> RequestUpdate {
        RequestUpdate {
            purchases: Some(vec![purchase(true)]),
            approvals: Some(vec![approval()]),
            ..RequestUpdate::default()
        }
    }

    #[test]
    fn admin_proposal_is_taken_verbatim() {
        for state in RequestState::ALL {
            assert_eq!(
                compute_next_state(RequestState::Submitted, Some(state), true, false),
                state
            );
        }
        assert_eq!(
            compute_next_state(RequestState::Approved, None, true, false),
            RequestState::Approved
        );
    }

    #[test]
    fn non_admin_proposal_is_ignored() {
        assert_eq!(
            compute_next_state(RequestState::Submitted, Some(RequestState::Approved), false, true),
            RequestState::Submitted
        );
        assert_eq!(
            compute_next_state(RequestState::Approved, Some(RequestState::Deleted), false, false),
            RequestState::Incomplete
        );
    }

    #[test]
    fn non_admin_complete_recovers_from_incomplete_only() {
        assert_eq!(
            compute_next_state(RequestState::Incomplete, None, false, true),
            RequestState::Submitted
        );
        assert_eq!(
            compute_next_state(RequestState::InProgress, None, false, true),
            RequestState::InProgress
        );
    }

    #[test]
    fn incomplete_submitted_request_drops_to_incomplete() {
        let existing = record(RequestState::Submitted);
        let update = RequestUpdate { approvals: Some(Vec::new()), ..RequestUpdate::default() }
            .validate()
            .expect("valid");

        let plan = LifecycleEngine::new().plan(&existing, update, &owner(), Utc::now());

        assert_eq!(plan.to, RequestState::Incomplete);
        assert!(plan.state_changed());
        assert!(plan.record.state_changed_at > existing.state_changed_at);
    }

    #[test]
    fn completed_incomplete_request_is_resubmitted() {
        let existing = record(RequestState::Incomplete);
        let plan = LifecycleEngine::new().plan(
            &existing,
            complete_update().validate().expect("valid"),
            &owner(),
            Utc::now(),
        );

        assert_eq!(plan.from, RequestState::Incomplete);
        assert_eq!(plan.to, RequestState::Submitted);
        assert!(plan.is_complete());
    }

    #[test]
    fn complete_submitted_request_stays_submitted() {
        let existing = record(RequestState::Submitted);
        let mut update = complete_update();
        update.state = Some(RequestState::Approved.wire_value());

        let update = update.validate().expect("valid");
        let plan = LifecycleEngine::new().plan(&existing, update, &owner(), Utc::now());

        assert_eq!(plan.to, RequestState::Submitted);
        assert!(!plan.state_changed());
        assert_eq!(plan.record.state_changed_at, existing.state_changed_at);
    }

    #[test]
    fn admin_may_delete_incomplete_request() {
        let existing = record(RequestState::Submitted);
        let update = RequestUpdate {
            state: Some(RequestState::Deleted.wire_value()),
            ..RequestUpdate::default()
        };

        let update = update.validate().expect("valid");
        let plan = LifecycleEngine::new().plan(&existing, update, &admin(), Utc::now());

        assert_eq!(plan.to, RequestState::Deleted);
        assert!(!plan.is_complete());
    }

    #[test]
    fn absent_fields_fall_back_to_stored_values() {
        let existing = record(RequestState::Submitted);
        let update = RequestUpdate {
            employee_id: Some(0),
            additional_comments: Some(String::new()),
            approvals: Some(vec![approval()]),
            ..RequestUpdate::default()
        };

        let update = update.validate().expect("valid");
        let plan = LifecycleEngine::new().plan(&existing, update, &owner(), Utc::now());

        assert_eq!(plan.record.purchases, existing.purchases);
        assert_eq!(plan.record.employee_id, Some(1));
        assert_eq!(plan.record.additional_comments.as_deref(), Some("original"));
        assert_eq!(plan.record.approvals.len(), 1);
        assert_eq!(plan.record.idir, existing.idir);
        assert_eq!(plan.record.submission_date, existing.submission_date);
    }

    #[test]
    fn transition_timestamp_is_kept_at_stored_precision() {
        let existing = record(RequestState::Submitted);
        let now = Utc::now() + Duration::nanoseconds(789);
        let update = RequestUpdate::default().validate().expect("valid");

        let plan = LifecycleEngine::new().plan(&existing, update, &owner(), now);

        assert!(plan.state_changed());
        assert_eq!(plan.record.state_changed_at.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn transition_event_reflects_store_outcome() {
        let existing = record(RequestState::Submitted);
        let audit = AuditContext::new(Some(existing.id.clone()), "corr-1", "AAAA0001");
        let plan = LifecycleEngine::new().plan(
            &existing,
            RequestUpdate::default().validate().expect("valid"),
            &owner(),
            Utc::now(),
        );

        let applied = plan.transition_event(&audit, &owner(), AuditOutcome::Success, None);
        assert_eq!(applied.event_type, "request.transition_applied");
        assert_eq!(applied.metadata.get("to").map(String::as_str), Some("incomplete"));
        assert_eq!(
            applied.metadata.get("gap").map(String::as_str),
            Some("purchase_without_evidence")
        );
        assert!(!applied.metadata.contains_key("reason"));

        let failed =
            plan.transition_event(&audit, &owner(), AuditOutcome::Failed, Some("conflict"));
        assert_eq!(failed.event_type, "request.transition_failed");
        assert_eq!(failed.outcome, AuditOutcome::Failed);
        assert_eq!(failed.metadata.get("reason").map(String::as_str), Some("conflict"));
    }
}
