//! PostgreSQL implementation of `CallerIdStatsRepository`

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};

use crate::domain::callerid_stats::{CallerIdPattern, CallerIdStatsRepository};
use crate::domain::shared::Result;

#[derive(FromRow)]
struct CallerIdRow {
    prefix: String,
    pattern: String,
    attempts: i64,
    answers: i64,
}

impl From<CallerIdRow> for CallerIdPattern {
    fn from(r: CallerIdRow) -> Self {
        CallerIdPattern {
            prefix: r.prefix,
            pattern: r.pattern,
            attempts: r.attempts,
            answers: r.answers,
        }
    }
}

pub struct PgCallerIdStatsRepository {
    pool: PgPool,
}

impl PgCallerIdStatsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallerIdStatsRepository for PgCallerIdStatsRepository {
    async fn list_for_prefix(&self, prefix: &str) -> Result<Vec<CallerIdPattern>> {
        let rows: Vec<CallerIdRow> = sqlx::query_as(
            "SELECT prefix, pattern, attempts, answers FROM callerid_stats WHERE prefix = $1",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CallerIdPattern::from).collect())
    }

    async fn record_attempt(&self, prefix: &str, pattern: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO callerid_stats (prefix, pattern, attempts, answers)
            VALUES ($1, $2, 1, 0)
            ON CONFLICT (prefix, pattern) DO UPDATE SET attempts = callerid_stats.attempts + 1
            "#,
        )
        .bind(prefix)
        .bind(pattern)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_answer(&self, prefix: &str, pattern: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO callerid_stats (prefix, pattern, attempts, answers)
            VALUES ($1, $2, 0, 1)
            ON CONFLICT (prefix, pattern) DO UPDATE SET answers = callerid_stats.answers + 1
            "#,
        )
        .bind(prefix)
        .bind(pattern)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
