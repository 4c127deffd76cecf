//! PostgreSQL implementation of `CallLogRepository`
//!
//! `apply_batch` builds one parameterized `UPDATE ... SET field = CASE id
//! WHEN $n THEN $n+1 ... END` statement per the Log Batcher's flush
//! contract. Every value is passed as a bind parameter, never
//! interpolated into the SQL text.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{FromRow, PgPool, QueryBuilder};
use tracing::debug;

use crate::domain::call_log::{CallLog, CallLogRepository, CallLogUpdate, CallStatus, Disposition};
use crate::domain::shared::{CallLogId, CampaignId, ContactId, ProjectId, Result};

#[derive(FromRow)]
struct CallLogRow {
    id: i64,
    project_id: i64,
    campaign_id: Option<i64>,
    contact_id: Option<i64>,
    phone: String,
    caller_id: String,
    status: String,
    disposition: Option<String>,
    dtmf_digit: Option<String>,
    interacted: bool,
    duration_seconds: Option<i32>,
    pbx_unique_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<CallLogRow> for CallLog {
    fn from(r: CallLogRow) -> Self {
        CallLog {
            id: CallLogId::new(r.id),
            project_id: ProjectId::new(r.project_id),
            campaign_id: r.campaign_id.map(CampaignId::new),
            contact_id: r.contact_id.map(ContactId::new),
            phone: r.phone,
            caller_id: r.caller_id,
            status: CallStatus::from_str(&r.status).unwrap_or(CallStatus::Failed),
            disposition: r.disposition.as_deref().and_then(Disposition::from_str),
            dtmf_digit: r.dtmf_digit.and_then(|d| d.chars().next()),
            interacted: r.interacted,
            duration_seconds: r.duration_seconds,
            pbx_unique_id: r.pbx_unique_id,
            created_at: r.created_at,
        }
    }
}

pub struct PgCallLogRepository {
    pool: PgPool,
}

impl PgCallLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = "id, project_id, campaign_id, contact_id, phone, caller_id, status, \
    disposition, dtmf_digit, interacted, duration_seconds, pbx_unique_id, created_at";

#[async_trait]
impl CallLogRepository for PgCallLogRepository {
    async fn insert(&self, log: &CallLog) -> Result<CallLogId> {
        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO call_log (project_id, campaign_id, contact_id, phone, caller_id,
                                   status, disposition, dtmf_digit, interacted, duration_seconds,
                                   pbx_unique_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING id
            "#,
        )
        .bind(log.project_id.value())
        .bind(log.campaign_id.map(|c| c.value()))
        .bind(log.contact_id.map(|c| c.value()))
        .bind(&log.phone)
        .bind(&log.caller_id)
        .bind(log.status.as_str())
        .bind(log.disposition.map(|d| d.as_str()))
        .bind(log.dtmf_digit.map(|c| c.to_string()))
        .bind(log.interacted)
        .bind(log.duration_seconds)
        .bind(&log.pbx_unique_id)
        .bind(log.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(CallLogId::new(id))
    }

    async fn get(&self, id: CallLogId) -> Result<Option<CallLog>> {
        let row: Option<CallLogRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM call_log WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CallLog::from))
    }

    async fn apply_if_dialing(&self, update: &CallLogUpdate) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE call_log
            SET status = COALESCE($2, status),
                disposition = COALESCE($3, disposition),
                dtmf_digit = COALESCE($4, dtmf_digit),
                interacted = COALESCE($5, interacted),
                duration_seconds = COALESCE($6, duration_seconds),
                pbx_unique_id = COALESCE($7, pbx_unique_id)
            WHERE id = $1 AND status = 'DIALING'
            "#,
        )
        .bind(update.id.value())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.disposition.map(|d| d.as_str()))
        .bind(update.dtmf_digit.map(|c| c.to_string()))
        .bind(update.interacted)
        .bind(update.duration_seconds)
        .bind(&update.pbx_unique_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply(&self, update: &CallLogUpdate) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE call_log
            SET status = COALESCE($2, status),
                disposition = COALESCE($3, disposition),
                dtmf_digit = COALESCE($4, dtmf_digit),
                interacted = COALESCE($5, interacted),
                duration_seconds = COALESCE($6, duration_seconds),
                pbx_unique_id = COALESCE($7, pbx_unique_id)
            WHERE id = $1
            "#,
        )
        .bind(update.id.value())
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.disposition.map(|d| d.as_str()))
        .bind(update.dtmf_digit.map(|c| c.to_string()))
        .bind(update.interacted)
        .bind(update.duration_seconds)
        .bind(&update.pbx_unique_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_pbx_unique_id(&self, pbx_unique_id: &str) -> Result<Option<CallLog>> {
        let row: Option<CallLogRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM call_log WHERE pbx_unique_id = $1"
        ))
        .bind(pbx_unique_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CallLog::from))
    }

    async fn apply_batch(&self, updates: &[CallLogUpdate]) -> Result<Vec<CallLogId>> {
        if updates.is_empty() {
            return Ok(Vec::new());
        }

        debug!(count = updates.len(), "flushing call log batch");

        let ids: Vec<i64> = updates.iter().map(|u| u.id.value()).collect();

        let mut status_case = QueryBuilder::new("UPDATE call_log SET status = CASE id ");
        for u in updates {
            if let Some(status) = u.status {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(status.as_str());
            }
        }
        status_case.push(" ELSE status END, disposition = CASE id ");
        for u in updates {
            if let Some(disposition) = u.disposition {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(disposition.as_str());
            }
        }
        status_case.push(" ELSE disposition END, interacted = CASE id ");
        for u in updates {
            if let Some(interacted) = u.interacted {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(interacted);
            }
        }
        status_case.push(" ELSE interacted END, dtmf_digit = CASE id ");
        for u in updates {
            if let Some(digit) = u.dtmf_digit {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(digit.to_string());
            }
        }
        status_case.push(" ELSE dtmf_digit END, duration_seconds = CASE id ");
        for u in updates {
            if let Some(duration) = u.duration_seconds {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(duration);
            }
        }
        status_case.push(" ELSE duration_seconds END, pbx_unique_id = CASE id ");
        for u in updates {
            if let Some(ref pbx_unique_id) = u.pbx_unique_id {
                status_case
                    .push(" WHEN ")
                    .push_bind(u.id.value())
                    .push(" THEN ")
                    .push_bind(pbx_unique_id.clone());
            }
        }
        status_case.push(" ELSE pbx_unique_id END WHERE id = ANY(");
        status_case.push_bind(ids.clone());
        status_case.push(") RETURNING id, status");

        let rows: Vec<(i64, String)> = status_case.build_query_as().fetch_all(&self.pool).await?;

        let terminal: Vec<CallLogId> = rows
            .into_iter()
            .filter(|(_, status)| status == "COMPLETED" || status == "FAILED")
            .map(|(id, _)| CallLogId::new(id))
            .collect();

        Ok(terminal)
    }

    async fn complete_stale_dialing(&self, max_age: Duration) -> Result<Vec<CallLogId>> {
        let cutoff = chrono::Utc::now() - max_age;

        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE call_log
            SET status = 'COMPLETED', disposition = 'NA'
            WHERE status = 'DIALING' AND created_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| CallLogId::new(id)).collect())
    }
}
