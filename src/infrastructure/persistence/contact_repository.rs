//! PostgreSQL implementation of `ContactRepository`
//!
//! `mark_dialing` uses `UPDATE ... WHERE state = 'pending'` so a racing
//! sweep cannot double-claim the same contact.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::domain::contact::{Contact, ContactRepository, ContactState};
use crate::domain::shared::{CampaignId, ContactId, Result};

#[derive(FromRow)]
struct ContactRow {
    id: i64,
    campaign_id: i64,
    phone: String,
    state: String,
    attempt_count: i32,
    last_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    last_result: Option<String>,
}

impl From<ContactRow> for Contact {
    fn from(r: ContactRow) -> Self {
        Contact {
            id: ContactId::new(r.id),
            campaign_id: CampaignId::new(r.campaign_id),
            phone: r.phone,
            state: ContactState::from_str(&r.state).unwrap_or(ContactState::Failed),
            attempt_count: r.attempt_count,
            last_attempt_at: r.last_attempt_at,
            last_result: r.last_result,
        }
    }
}

pub struct PgContactRepository {
    pool: PgPool,
}

impl PgContactRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str =
    "id, campaign_id, phone, state, attempt_count, last_attempt_at, last_result";

#[async_trait]
impl ContactRepository for PgContactRepository {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
        let row: Option<ContactRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM campaign_contacts WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Contact::from))
    }

    async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>> {
        let rows: Vec<ContactRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM campaign_contacts
            WHERE campaign_id = $1 AND state = 'pending'
            ORDER BY id
            LIMIT $2
            "#
        ))
        .bind(campaign_id.value())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Contact::from).collect())
    }

    async fn count_dialing(&self, campaign_id: CampaignId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1 AND state = 'dialing'",
        )
        .bind(campaign_id.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_total(&self, campaign_id: CampaignId) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1",
        )
        .bind(campaign_id.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn count_in_state(&self, campaign_id: CampaignId, state: ContactState) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM campaign_contacts WHERE campaign_id = $1 AND state = $2",
        )
        .bind(campaign_id.value())
        .bind(state.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn mark_dialing(&self, id: ContactId) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE campaign_contacts
            SET state = 'dialing', attempt_count = attempt_count + 1, last_attempt_at = now()
            WHERE id = $1 AND state = 'pending'
            "#,
        )
        .bind(id.value())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_skipped(&self, id: ContactId, reason: &str) -> Result<()> {
        sqlx::query(
            "UPDATE campaign_contacts SET state = 'skipped', last_result = $1 WHERE id = $2",
        )
        .bind(reason)
        .bind(id.value())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_terminal(&self, id: ContactId, state: ContactState, result: &str) -> Result<()> {
        sqlx::query("UPDATE campaign_contacts SET state = $1, last_result = $2 WHERE id = $3")
            .bind(state.as_str())
            .bind(result)
            .bind(id.value())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn mark_pending(&self, id: ContactId) -> Result<()> {
        sqlx::query("UPDATE campaign_contacts SET state = 'pending' WHERE id = $1")
            .bind(id.value())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn bulk_fail_stale_dialing(&self, max_age: chrono::Duration) -> Result<Vec<ContactId>> {
        let cutoff = chrono::Utc::now() - max_age;

        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            UPDATE campaign_contacts
            SET state = 'failed', last_result = 'NA'
            WHERE state = 'dialing' AND last_attempt_at < $1
            RETURNING id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| ContactId::new(id)).collect())
    }
}
