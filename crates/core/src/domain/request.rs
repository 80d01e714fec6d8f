use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, SubsecRound, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

/// Truncates to microseconds, the resolution timestamps are persisted at, so a record handed
/// back to a client matches what a later read returns.
pub fn stored_instant(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(6)
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Parses a caller-supplied id. Anything that is not a UUID is malformed.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        Uuid::parse_str(raw.trim())
            .map(|id| Self(id.to_string()))
            .map_err(|_| DomainError::InvalidRequestId(raw.to_string()))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a reimbursement request.
///
/// The numeric wire value is mapped explicitly in [`RequestState::wire_value`] and
/// [`RequestState::from_wire`]; it is what clients send and what the store persists.
/// Declaration order matches the wire order, so `Ord` follows it too.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum RequestState {
    Deleted,
    Denied,
    Approved,
    InProgress,
    Submitted,
    Incomplete,
    Complete,
}

impl RequestState {
    pub const ALL: [RequestState; 7] = [
        RequestState::Deleted,
        RequestState::Denied,
        RequestState::Approved,
        RequestState::InProgress,
        RequestState::Submitted,
        RequestState::Incomplete,
        RequestState::Complete,
    ];

    pub fn wire_value(self) -> i64 {
        match self {
            Self::Deleted => 0,
            Self::Denied => 1,
            Self::Approved => 2,
            Self::InProgress => 3,
            Self::Submitted => 4,
            Self::Incomplete => 5,
            Self::Complete => 6,
        }
    }

    pub fn from_wire(value: i64) -> Result<Self, DomainError> {
        match value {
            0 => Ok(Self::Deleted),
            1 => Ok(Self::Denied),
            2 => Ok(Self::Approved),
            3 => Ok(Self::InProgress),
            4 => Ok(Self::Submitted),
            5 => Ok(Self::Incomplete),
            6 => Ok(Self::Complete),
            other => Err(DomainError::InvalidState(other)),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Denied => "denied",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Submitted => "submitted",
            Self::Incomplete => "incomplete",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for RequestState {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_wire(value)
    }
}

impl From<RequestState> for i64 {
    fn from(state: RequestState) -> Self {
        state.wire_value()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: u64,
    /// Base64 payload. Dropped by the retention sweep; the metadata above survives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl FileAttachment {
    pub fn purge_content(&mut self) -> bool {
        self.content.take().is_some()
    }
}

fn purge_all(files: &mut [FileAttachment]) -> bool {
    files.iter_mut().fold(false, |changed, file| file.purge_content() || changed)
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub supplier: String,
    pub purchase_date: DateTime<FixedOffset>,
    pub cost: Decimal,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

impl Purchase {
    pub fn has_evidence(&self) -> bool {
        !self.files.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    #[serde(default)]
    pub approval_date: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub files: Vec<FileAttachment>,
}

impl Approval {
    pub fn has_evidence(&self) -> bool {
        !self.files.is_empty()
    }
}

/// Inbound submission from the form service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub employee_id: Option<i64>,
    pub idir: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub purchases: Vec<Purchase>,
    #[serde(default)]
    pub approvals: Vec<Approval>,
    #[serde(default)]
    pub additional_comments: Option<String>,
    #[serde(default)]
    pub late_entry: bool,
    #[serde(default)]
    pub submit: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    pub id: RequestId,
    pub first_name: String,
    pub last_name: String,
    pub employee_id: Option<i64>,
    pub idir: String,
    pub email: Option<String>,
    pub purchases: Vec<Purchase>,
    pub approvals: Vec<Approval>,
    pub additional_comments: Option<String>,
    pub submission_date: DateTime<Utc>,
    pub state: RequestState,
    pub late_entry: bool,
    pub submit: bool,
    pub state_changed_at: DateTime<Utc>,
    pub revision: i64,
}

impl RequestRecord {
    pub fn from_submission(submission: NewRequest, now: DateTime<Utc>) -> Self {
        let now = stored_instant(now);
        Self {
            id: RequestId::generate(),
            first_name: submission.first_name,
            last_name: submission.last_name,
            employee_id: submission.employee_id,
            idir: submission.idir,
            email: submission.email,
            purchases: submission.purchases,
            approvals: submission.approvals,
            additional_comments: submission.additional_comments,
            submission_date: now,
            state: RequestState::Submitted,
            late_entry: submission.late_entry,
            submit: submission.submit,
            state_changed_at: now,
            revision: 0,
        }
    }

    pub fn summary(&self) -> RequestSummary {
        RequestSummary {
            id: self.id.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            purchases: self
                .purchases
                .iter()
                .map(|purchase| PurchaseSummary {
                    cost: purchase.cost,
                    supplier: purchase.supplier.clone(),
                })
                .collect(),
            submission_date: self.submission_date,
            state: self.state,
        }
    }

    /// Strips binary content from every attachment. Returns whether anything was removed.
    pub fn purge_file_content(&mut self) -> bool {
        let purchases = self
            .purchases
            .iter_mut()
            .fold(false, |changed, purchase| purge_all(&mut purchase.files) || changed);
        let approvals = self
            .approvals
            .iter_mut()
            .fold(false, |changed, approval| purge_all(&mut approval.files) || changed);
        purchases || approvals
    }
}

/// Partial update. Absent fields keep the stored value; see [`RequestUpdate::validate`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUpdate {
    #[serde(default)]
    pub state: Option<i64>,
    #[serde(default)]
    pub employee_id: Option<i64>,
    #[serde(default)]
    pub purchases: Option<Vec<Purchase>>,
    #[serde(default)]
    pub approvals: Option<Vec<Approval>>,
    #[serde(default)]
    pub additional_comments: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedUpdate {
    pub state: Option<RequestState>,
    pub employee_id: Option<i64>,
    pub purchases: Option<Vec<Purchase>>,
    pub approvals: Option<Vec<Approval>>,
    pub additional_comments: Option<String>,
}

impl RequestUpdate {
    /// Rejects out-of-range states and normalises "falsy" values to absent:
    /// a zero employee id and a blank comment both fall back to the stored value.
    /// An explicitly supplied empty list is a value and replaces the stored list.
    pub fn validate(self) -> Result<ValidatedUpdate, DomainError> {
        let state = self.state.map(RequestState::from_wire).transpose()?;

        Ok(ValidatedUpdate {
            state,
            employee_id: self.employee_id.filter(|id| *id != 0),
            purchases: self.purchases,
            approvals: self.approvals,
            additional_comments: self
                .additional_comments
                .filter(|comment| !comment.trim().is_empty()),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSummary {
    pub cost: Decimal,
    pub supplier: String,
}

/// Reduced list view. `id` is the store key and is kept so list UIs can link to a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSummary {
    pub id: RequestId,
    pub first_name: String,
    pub last_name: String,
    pub purchases: Vec<PurchaseSummary>,
    pub submission_date: DateTime<Utc>,
    pub state: RequestState,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestListing {
    Full(Vec<RequestRecord>),
    Minimal(Vec<RequestSummary>),
}

impl RequestListing {
    pub fn len(&self) -> usize {
        match self {
            Self::Full(records) => records.len(),
            Self::Minimal(summaries) => summaries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Half-open submission-date window `[after, before)`, optionally scoped to one requestor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestQuery {
    pub idir: Option<String>,
    pub after: DateTime<Utc>,
    pub before: DateTime<Utc>,
}

impl Default for RequestQuery {
    fn default() -> Self {
        Self { idir: None, after: default_after(), before: default_before() }
    }
}

fn default_after() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).single().unwrap_or_default()
}

fn default_before() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).single().unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl RequestQuery {
    /// Builds a query from raw listing parameters. Bounds accept RFC 3339 timestamps or
    /// plain `YYYY-MM-DD` dates (midnight UTC).
    pub fn from_params(
        idir: Option<String>,
        after: Option<&str>,
        before: Option<&str>,
    ) -> Result<Self, DomainError> {
        let idir = idir.map(|value| value.trim().to_string()).filter(|value| !value.is_empty());
        let after = after.map(|raw| parse_bound("after", raw)).transpose()?;
        let before = before.map(|raw| parse_bound("before", raw)).transpose()?;

        Ok(Self {
            idir,
            after: after.unwrap_or_else(default_after),
            before: before.unwrap_or_else(default_before),
        })
    }

    pub fn matches(&self, record: &RequestRecord) -> bool {
        let in_window =
            record.submission_date >= self.after && record.submission_date < self.before;
        let owned = self.idir.as_deref().map(|idir| idir == record.idir).unwrap_or(true);
        in_window && owned
    }
}

fn parse_bound(name: &str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    let raw = raw.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| DomainError::InvalidFilter(format!("`{name}` is not a date: `{raw}`")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    use super::{
        FileAttachment, NewRequest, Purchase, RequestId, RequestQuery, RequestRecord,
        RequestState, RequestUpdate,
    };
    use crate::errors::DomainError;

    fn submission() -> NewRequest {
        NewRequest {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            employee_id: Some(1),
            idir: "AAAA0001".to_string(),
            email: None,
            purchases: vec![Purchase {
                supplier: "X".to_string(),
                purchase_date: "2024-01-01T00:00:00-07:00".parse().expect("purchase date"),
                cost: Decimal::new(10, 0),
                files: vec![FileAttachment {
                    name: "receipt.pdf".to_string(),
                    mime_type: Some("application/pdf".to_string()),
                    size: 4,
                    content: Some("AAAA".to_string()),
                }],
            }],
            approvals: Vec::new(),
            additional_comments: None,
            late_entry: false,
            submit: true,
        }
    }

    #[test]
    fn wire_values_are_explicit_and_reject_out_of_range() {
        for (expected, state) in RequestState::ALL.iter().enumerate() {
            assert_eq!(state.wire_value(), expected as i64);
            assert_eq!(RequestState::from_wire(expected as i64), Ok(*state));
        }

        assert_eq!(RequestState::from_wire(7), Err(DomainError::InvalidState(7)));
        assert_eq!(RequestState::from_wire(-1), Err(DomainError::InvalidState(-1)));
        assert!(RequestState::Deleted < RequestState::Submitted);
    }

    #[test]
    fn state_serializes_as_wire_integer() {
        let json = serde_json::to_string(&RequestState::Incomplete).expect("serialize");
        assert_eq!(json, "5");

        let parsed: Result<RequestState, _> = serde_json::from_str("12");
        assert!(parsed.is_err());
    }

    #[test]
    fn new_records_start_submitted() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("timestamp")
            + chrono::Duration::nanoseconds(123_456_789);
        let record = RequestRecord::from_submission(submission(), now);

        assert_eq!(record.state, RequestState::Submitted);
        assert_eq!(record.submission_date.timestamp_subsec_nanos(), 123_456_000);
        assert_eq!(record.state_changed_at, record.submission_date);
        assert_eq!(record.revision, 0);
        assert!(RequestId::parse(&record.id.0).is_ok());
    }

    #[test]
    fn request_id_rejects_malformed_values() {
        assert!(matches!(RequestId::parse("not-a-uuid"), Err(DomainError::InvalidRequestId(_))));
    }

    #[test]
    fn update_validation_normalises_falsy_fields() {
        let update = RequestUpdate {
            state: None,
            employee_id: Some(0),
            purchases: None,
            approvals: Some(Vec::new()),
            additional_comments: Some("   ".to_string()),
        }
        .validate()
        .expect("valid update");

        assert_eq!(update.employee_id, None);
        assert_eq!(update.additional_comments, None);
        assert_eq!(update.approvals, Some(Vec::new()));
    }

    #[test]
    fn update_validation_rejects_invalid_state() {
        let error = RequestUpdate { state: Some(42), ..RequestUpdate::default() }
            .validate()
            .expect_err("state 42 is out of range");
        assert_eq!(error, DomainError::InvalidState(42));
    }

    #[test]
    fn purge_keeps_metadata_and_reports_change() {
        let mut record = RequestRecord::from_submission(submission(), Utc::now());

        assert!(record.purge_file_content());
        assert!(!record.purge_file_content());

        let file = &record.purchases[0].files[0];
        assert_eq!(file.name, "receipt.pdf");
        assert_eq!(file.content, None);
        assert!(record.purchases[0].has_evidence());
    }

    #[test]
    fn summary_projects_list_fields_only() {
        let record = RequestRecord::from_submission(submission(), Utc::now());
        let summary = serde_json::to_value(record.summary()).expect("serialize summary");

        let purchase = &summary["purchases"][0];
        assert_eq!(purchase["supplier"], "X");
        assert!(purchase.get("files").is_none());
        assert!(summary.get("idir").is_none());
        assert_eq!(summary["state"], 4);
    }

    #[test]
    fn query_defaults_cover_full_range_and_parse_dates() {
        let query = RequestQuery::default();
        assert_eq!(query.after, Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(query.before, Utc.with_ymd_and_hms(3000, 1, 1, 0, 0, 0).unwrap());

        let query = RequestQuery::from_params(
            Some("AAAA0001".to_string()),
            Some("2024-01-01"),
            Some("2024-02-01T00:00:00-08:00"),
        )
        .expect("valid bounds");
        assert_eq!(query.after, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(query.before, Utc.with_ymd_and_hms(2024, 2, 1, 8, 0, 0).unwrap());

        assert!(matches!(
            RequestQuery::from_params(None, Some("yesterday"), None),
            Err(DomainError::InvalidFilter(_))
        ));
    }

    #[test]
    fn query_window_is_half_open() {
        let mut record = RequestRecord::from_submission(submission(), Utc::now());
        let query = RequestQuery::from_params(None, Some("2024-01-01"), Some("2024-01-02"))
            .expect("valid bounds");

        record.submission_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(query.matches(&record));

        record.submission_date = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(!query.matches(&record));
    }
}
