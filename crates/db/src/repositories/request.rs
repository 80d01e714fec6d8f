use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Row, Sqlite};

use reimburse_core::domain::request::{RequestId, RequestQuery, RequestRecord, RequestState};
use reimburse_core::retention::RetentionPolicy;

use super::{RepositoryError, RequestRepository, UpdateOutcome};
use crate::DbPool;

const SELECT_REQUEST: &str = "SELECT id, first_name, last_name, employee_id, idir, email,
        purchases_json, approvals_json, additional_comments, submission_date, state,
        late_entry, submit, state_changed_at, revision
 FROM reimbursement_request";

pub struct SqlRequestRepository {
    pool: DbPool,
}

impl SqlRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Fixed-width UTC timestamps so text comparison in SQL orders chronologically.
pub(crate) fn encode_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Encode(e.to_string()))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<RequestRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let first_name: String =
        row.try_get("first_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_name: String =
        row.try_get("last_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let employee_id: Option<i64> =
        row.try_get("employee_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let idir: String = row.try_get("idir").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let purchases_json: String =
        row.try_get("purchases_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let approvals_json: String =
        row.try_get("approvals_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let additional_comments: Option<String> =
        row.try_get("additional_comments").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submission_date_str: String =
        row.try_get("submission_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_value: i64 =
        row.try_get("state").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let late_entry: bool =
        row.try_get("late_entry").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let submit: bool = row.try_get("submit").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let state_changed_at_str: String =
        row.try_get("state_changed_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let revision: i64 =
        row.try_get("revision").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(RequestRecord {
        id: RequestId(id),
        first_name,
        last_name,
        employee_id,
        idir,
        email,
        purchases: serde_json::from_str(&purchases_json)
            .map_err(|e| RepositoryError::Decode(format!("purchases_json: {e}")))?,
        approvals: serde_json::from_str(&approvals_json)
            .map_err(|e| RepositoryError::Decode(format!("approvals_json: {e}")))?,
        additional_comments,
        submission_date: decode_timestamp("submission_date", &submission_date_str)?,
        state: RequestState::from_wire(state_value)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?,
        late_entry,
        submit,
        state_changed_at: decode_timestamp("state_changed_at", &state_changed_at_str)?,
        revision,
    })
}

#[async_trait::async_trait]
impl RequestRepository for SqlRequestRepository {
    async fn insert(&self, record: RequestRecord) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO reimbursement_request (id, first_name, last_name, employee_id, idir,
                                                email, purchases_json, approvals_json,
                                                additional_comments, submission_date, state,
                                                late_entry, submit, state_changed_at, revision)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(record.employee_id)
        .bind(&record.idir)
        .bind(&record.email)
        .bind(encode_json(&record.purchases)?)
        .bind(encode_json(&record.approvals)?)
        .bind(&record.additional_comments)
        .bind(encode_timestamp(record.submission_date))
        .bind(record.state.wire_value())
        .bind(record.late_entry)
        .bind(record.submit)
        .bind(encode_timestamp(record.state_changed_at))
        .bind(record.revision)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                Err(RepositoryError::Duplicate(record.id.0))
            }
            Err(error) => Err(error.into()),
        }
    }

    async fn find_by_id(&self, id: &RequestId) -> Result<Option<RequestRecord>, RepositoryError> {
        let sql = format!("{SELECT_REQUEST} WHERE id = ?");
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        match row {
            Some(ref r) => Ok(Some(row_to_request(r)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &RequestQuery) -> Result<Vec<RequestRecord>, RepositoryError> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_REQUEST);
        builder.push(" WHERE submission_date >= ");
        builder.push_bind(encode_timestamp(query.after));
        builder.push(" AND submission_date < ");
        builder.push_bind(encode_timestamp(query.before));
        if let Some(idir) = &query.idir {
            builder.push(" AND idir = ");
            builder.push_bind(idir.clone());
        }
        builder.push(" ORDER BY submission_date DESC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_request).collect::<Result<Vec<_>, _>>()
    }

    async fn update(&self, record: RequestRecord) -> Result<UpdateOutcome, RepositoryError> {
        let result = sqlx::query(
            "UPDATE reimbursement_request
             SET employee_id = ?,
                 purchases_json = ?,
                 approvals_json = ?,
                 additional_comments = ?,
                 state = ?,
                 state_changed_at = ?,
                 revision = revision + 1
             WHERE id = ? AND revision = ?",
        )
        .bind(record.employee_id)
        .bind(encode_json(&record.purchases)?)
        .bind(encode_json(&record.approvals)?)
        .bind(&record.additional_comments)
        .bind(record.state.wire_value())
        .bind(encode_timestamp(record.state_changed_at))
        .bind(&record.id.0)
        .bind(record.revision)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM reimbursement_request WHERE id = ?")
                .bind(&record.id.0)
                .fetch_optional(&self.pool)
                .await?
                .is_some();
            return Ok(if exists { UpdateOutcome::Stale } else { UpdateOutcome::Missing });
        }

        Ok(UpdateOutcome::Applied(RequestRecord { revision: record.revision + 1, ..record }))
    }

    async fn purge_file_content(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let sql = format!("{SELECT_REQUEST} WHERE state IN (?, ?) OR submission_date < ?");
        let rows = sqlx::query(&sql)
            .bind(RequestState::Deleted.wire_value())
            .bind(RequestState::Complete.wire_value())
            .bind(encode_timestamp(policy.file_cutoff(now)))
            .fetch_all(&self.pool)
            .await?;

        let mut tx = self.pool.begin().await?;
        let mut purged = 0;
        for row in &rows {
            let mut record = row_to_request(row)?;
            if !record.purge_file_content() {
                continue;
            }

            let result = sqlx::query(
                "UPDATE reimbursement_request
                 SET purchases_json = ?, approvals_json = ?, revision = revision + 1
                 WHERE id = ? AND revision = ?",
            )
            .bind(encode_json(&record.purchases)?)
            .bind(encode_json(&record.approvals)?)
            .bind(&record.id.0)
            .bind(record.revision)
            .execute(&mut *tx)
            .await?;
            purged += result.rows_affected();
        }
        tx.commit().await?;

        Ok(purged)
    }

    async fn delete_expired(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            "DELETE FROM reimbursement_request WHERE state = ? AND state_changed_at < ?",
        )
        .bind(RequestState::Deleted.wire_value())
        .bind(encode_timestamp(policy.deleted_cutoff(now)))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
