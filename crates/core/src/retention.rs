use chrono::{DateTime, Duration, Utc};

use crate::config::RetentionConfig;
use crate::domain::request::{RequestRecord, RequestState};

/// Cutoffs for the retention sweep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// How long a request stays in `Deleted` before it is removed outright.
    pub deleted_retention: Duration,
    /// Age after which attachment content is dropped regardless of state.
    pub file_retention: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self { deleted_retention: Duration::days(30), file_retention: Duration::days(90) }
    }
}

impl RetentionPolicy {
    pub fn from_config(config: &RetentionConfig) -> Self {
        Self {
            deleted_retention: Duration::days(i64::from(config.deleted_retention_days)),
            file_retention: Duration::days(i64::from(config.file_retention_days)),
        }
    }

    pub fn deleted_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.deleted_retention
    }

    pub fn file_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.file_retention
    }

    pub fn file_purge_eligible(&self, record: &RequestRecord, now: DateTime<Utc>) -> bool {
        matches!(record.state, RequestState::Deleted | RequestState::Complete)
            || record.submission_date < self.file_cutoff(now)
    }

    pub fn hard_delete_eligible(&self, record: &RequestRecord, now: DateTime<Utc>) -> bool {
        record.state == RequestState::Deleted && record.state_changed_at < self.deleted_cutoff(now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::RetentionPolicy;
    use crate::domain::request::{NewRequest, RequestRecord, RequestState};

    fn record(state: RequestState, age_days: i64) -> RequestRecord {
        let then = Utc::now() - Duration::days(age_days);
        let mut record = RequestRecord::from_submission(
            NewRequest {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                employee_id: Some(1),
                idir: "AAAA0001".to_string(),
                email: None,
                purchases: Vec::new(),
                approvals: Vec::new(),
                additional_comments: None,
                late_entry: false,
                submit: true,
            },
            then,
        );
        record.state = state;
        record
    }

    #[test]
    fn deleted_and_complete_requests_lose_file_content() {
        let policy = RetentionPolicy::default();
        let now = Utc::now();

        assert!(policy.file_purge_eligible(&record(RequestState::Deleted, 0), now));
        assert!(policy.file_purge_eligible(&record(RequestState::Complete, 0), now));
        assert!(!policy.file_purge_eligible(&record(RequestState::Submitted, 0), now));
        assert!(policy.file_purge_eligible(&record(RequestState::Submitted, 120), now));
    }

    #[test]
    fn only_long_deleted_requests_are_hard_deleted() {
        let policy = RetentionPolicy::default();
        let now = Utc::now();

        assert!(policy.hard_delete_eligible(&record(RequestState::Deleted, 31), now));
        assert!(!policy.hard_delete_eligible(&record(RequestState::Deleted, 29), now));
        assert!(!policy.hard_delete_eligible(&record(RequestState::Denied, 90), now));
    }
}
