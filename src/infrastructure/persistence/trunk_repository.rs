//! PostgreSQL implementation of `TrunkRepository`

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::domain::shared::{Result, TrunkName};
use crate::domain::trunk::{Trunk, TrunkRepository};

#[derive(FromRow)]
struct TrunkRow {
    name: String,
}

pub struct PgTrunkRepository {
    pool: PgPool,
}

impl PgTrunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrunkRepository for PgTrunkRepository {
    async fn list_all(&self) -> Result<Vec<Trunk>> {
        let rows: Vec<TrunkRow> = sqlx::query_as("SELECT name FROM trunks")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|r| Trunk {
                name: TrunkName::new(r.name),
            })
            .collect())
    }

    async fn exists(&self, name: &TrunkName) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM trunks WHERE name = $1")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.is_some())
    }
}
