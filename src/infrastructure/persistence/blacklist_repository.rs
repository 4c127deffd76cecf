//! PostgreSQL implementation of `BlacklistRepository`

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::blacklist::BlacklistRepository;
use crate::domain::shared::{ProjectId, Result};

pub struct PgBlacklistRepository {
    pool: PgPool,
}

impl PgBlacklistRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BlacklistRepository for PgBlacklistRepository {
    async fn is_blacklisted(&self, project_id: ProjectId, phone: &str) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM blacklist WHERE project_id = $1 AND phone = $2",
        )
        .bind(project_id.value())
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }
}
