//! PostgreSQL implementation of `ConfigRepository`

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::config_store::ConfigRepository;
use crate::domain::shared::Result;

pub struct PgConfigRepository {
    pool: PgPool,
}

impl PgConfigRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigRepository for PgConfigRepository {
    async fn get_int(&self, key: &str) -> Result<Option<i64>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT value FROM config WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.and_then(|(v,)| v.trim().parse().ok()))
    }
}
