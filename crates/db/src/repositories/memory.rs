use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use reimburse_core::domain::request::{RequestId, RequestQuery, RequestRecord};
use reimburse_core::retention::RetentionPolicy;

use super::{RepositoryError, RequestRepository, UpdateOutcome};

#[derive(Default)]
pub struct InMemoryRequestRepository {
    requests: RwLock<HashMap<String, RequestRecord>>,
}

impl InMemoryRequestRepository {
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl RequestRepository for InMemoryRequestRepository {
    async fn insert(&self, record: RequestRecord) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&record.id.0) {
            return Err(RepositoryError::Duplicate(record.id.0));
        }
        requests.insert(record.id.0.clone(), record);
        Ok(())
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<RequestRecord>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn list(&self, query: &RequestQuery) -> Result<Vec<RequestRecord>, RepositoryError> {
        let requests = self.requests.read().await;
        let mut matched: Vec<RequestRecord> =
            requests.values().filter(|record| query.matches(record)).cloned().collect();
        matched.sort_by(|a, b| {
            b.submission_date.cmp(&a.submission_date).then_with(|| a.id.0.cmp(&b.id.0))
        });
        Ok(matched)
    }

    async fn update(&self, record: RequestRecord) -> Result<UpdateOutcome, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(current) = requests.get_mut(&record.id.0) else {
            return Ok(UpdateOutcome::Missing);
        };
        if current.revision != record.revision {
            return Ok(UpdateOutcome::Stale);
        }

        let persisted = RequestRecord { revision: record.revision + 1, ..record };
        *current = persisted.clone();
        Ok(UpdateOutcome::Applied(persisted))
    }

    async fn purge_file_content(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut requests = self.requests.write().await;
        let mut purged = 0;
        for record in requests.values_mut() {
            if policy.file_purge_eligible(record, now) && record.purge_file_content() {
                record.revision += 1;
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, record| !policy.hard_delete_eligible(record, now));
        Ok((before - requests.len()) as u64)
    }
}
