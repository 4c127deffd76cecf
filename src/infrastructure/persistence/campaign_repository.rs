//! PostgreSQL implementation of `CampaignRepository`

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::domain::campaign::{Campaign, CampaignRepository, CampaignState};
use crate::domain::shared::{CampaignId, ProjectId, Result};

#[derive(FromRow)]
struct CampaignRow {
    id: i64,
    name: String,
    project_id: i64,
    state: String,
    total: i64,
    processed: i64,
    succeeded: i64,
    failed: i64,
}

impl From<CampaignRow> for Campaign {
    fn from(r: CampaignRow) -> Self {
        Campaign {
            id: CampaignId::new(r.id),
            name: r.name,
            project_id: ProjectId::new(r.project_id),
            state: CampaignState::from_str(&r.state).unwrap_or(CampaignState::Stopped),
            total: r.total,
            processed: r.processed,
            succeeded: r.succeeded,
            failed: r.failed,
        }
    }
}

pub struct PgCampaignRepository {
    pool: PgPool,
}

impl PgCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str =
    "id, name, project_id, state, total, processed, succeeded, failed";

#[async_trait]
impl CampaignRepository for PgCampaignRepository {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
        let row: Option<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Campaign::from))
    }

    async fn list_active(&self) -> Result<Vec<Campaign>> {
        let rows: Vec<CampaignRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM campaigns WHERE state = 'active'"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Campaign::from).collect())
    }

    async fn set_state(&self, id: CampaignId, state: CampaignState) -> Result<()> {
        debug!(campaign_id = id.value(), state = state.as_str(), "setting campaign state");

        sqlx::query("UPDATE campaigns SET state = $1 WHERE id = $2")
            .bind(state.as_str())
            .bind(id.value())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_counters(&self, campaign: &Campaign) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE campaigns
            SET total = $1, processed = $2, succeeded = $3, failed = $4
            WHERE id = $5
            "#,
        )
        .bind(campaign.total)
        .bind(campaign.processed)
        .bind(campaign.succeeded)
        .bind(campaign.failed)
        .bind(campaign.id.value())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
