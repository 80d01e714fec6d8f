use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use reimburse_core::domain::request::{RequestId, RequestQuery, RequestRecord};
use reimburse_core::retention::RetentionPolicy;

pub mod memory;
pub mod request;

pub use memory::InMemoryRequestRepository;
pub use request::SqlRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("request `{0}` already exists")]
    Duplicate(String),
}

/// Result of a compare-and-swap write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Persisted with the bumped revision.
    Applied(RequestRecord),
    /// The record changed since it was read.
    Stale,
    /// The record no longer exists, e.g. removed by a retention sweep.
    Missing,
}

/// Durable store of reimbursement requests keyed by [`RequestId`].
#[async_trait]
pub trait RequestRepository: Send + Sync {
    async fn insert(&self, record: RequestRecord) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<RequestRecord>, RepositoryError>;

    /// Records matching `query`, newest submission first.
    async fn list(&self, query: &RequestQuery) -> Result<Vec<RequestRecord>, RepositoryError>;

    /// Replaces the stored record if its revision still equals `record.revision`.
    ///
    /// Returns the persisted record with the bumped revision, or why the write was refused.
    async fn update(&self, record: RequestRecord) -> Result<UpdateOutcome, RepositoryError>;

    /// Drops attachment content from every record eligible under `policy`. Returns the number
    /// of records that changed.
    async fn purge_file_content(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;

    /// Removes deleted records whose retention window has passed.
    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError>;
}
