use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::domain::request::{RequestId, RequestRecord, RequestState};

/// Event sent to the requestor after their request changed state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChangeNotice {
    pub recipient_email: String,
    #[serde(rename = "resultingStateChangeURL")]
    pub state_change_url: String,
    pub request_id: RequestId,
    pub state: RequestState,
}

impl StateChangeNotice {
    /// `None` when the record carries no usable recipient address.
    pub fn for_record(record: &RequestRecord, frontend_url: &str) -> Option<Self> {
        let recipient_email = record
            .email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())?
            .to_string();

        Some(Self {
            recipient_email,
            state_change_url: format!(
                "{}/request/{}",
                frontend_url.trim_end_matches('/'),
                record.id
            ),
            request_id: record.id.clone(),
            state: record.state,
        })
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification client could not be built: {0}")]
    Client(String),
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, notice: StateChangeNotice) -> Result<(), NotificationError>;
}

/// Collects notices instead of sending them.
#[derive(Clone, Default)]
pub struct InMemoryDispatcher {
    notices: Arc<Mutex<Vec<StateChangeNotice>>>,
}

impl InMemoryDispatcher {
    pub fn notices(&self) -> Vec<StateChangeNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryDispatcher {
    async fn dispatch(&self, notice: StateChangeNotice) -> Result<(), NotificationError> {
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::StateChangeNotice;
    use crate::domain::request::{NewRequest, RequestRecord, RequestState};

    fn record(email: Option<&str>) -> RequestRecord {
        let mut record = RequestRecord::from_submission(
            NewRequest {
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                employee_id: Some(1),
                idir: "AAAA0001".to_string(),
                email: email.map(str::to_string),
                purchases: Vec::new(),
                approvals: Vec::new(),
                additional_comments: None,
                late_entry: false,
                submit: true,
            },
            Utc::now(),
        );
        record.state = RequestState::Incomplete;
        record
    }

    #[test]
    fn notice_links_to_request_page() {
        let record = record(Some("ada@example.org"));
        let notice = StateChangeNotice::for_record(&record, "https://reimburse.example.org/")
            .expect("notice");

        assert_eq!(notice.recipient_email, "ada@example.org");
        assert_eq!(
            notice.state_change_url,
            format!("https://reimburse.example.org/request/{}", record.id)
        );

        let json = serde_json::to_value(&notice).expect("serialize");
        assert_eq!(json["recipientEmail"], "ada@example.org");
        assert!(json.get("resultingStateChangeURL").is_some());
        assert_eq!(json["state"], 5);
    }

    #[test]
    fn records_without_email_produce_no_notice() {
        assert!(StateChangeNotice::for_record(&record(None), "http://localhost:3000").is_none());
        let blank = record(Some("  "));
        assert!(StateChangeNotice::for_record(&blank, "http://localhost:3000").is_none());
    }
}
