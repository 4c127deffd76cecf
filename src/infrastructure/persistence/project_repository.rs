//! PostgreSQL implementation of `ProjectRepository`

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use tracing::debug;

use crate::domain::project::{Project, ProjectRepository};
use crate::domain::shared::{ProjectId, Result};

#[derive(FromRow)]
struct ProjectRow {
    id: i64,
    caller_id: String,
    prompt_audio: String,
    expected_dtmf: String,
    transfer_context: String,
    transfer_extension: String,
    trunks: String,
    dial_prefix: String,
    amd_enabled: bool,
    smart_cid_enabled: bool,
    max_retries: i32,
    retry_time: i32,
    authorized_ips: String,
    timezone: String,
}

impl From<ProjectRow> for Project {
    fn from(r: ProjectRow) -> Self {
        Project {
            id: ProjectId::new(r.id),
            caller_id: r.caller_id,
            prompt_audio: r.prompt_audio,
            expected_dtmf: r.expected_dtmf.chars().next().unwrap_or('0'),
            transfer_context: r.transfer_context,
            transfer_extension: r.transfer_extension,
            trunks: r.trunks,
            dial_prefix: r.dial_prefix,
            amd_enabled: r.amd_enabled,
            smart_cid_enabled: r.smart_cid_enabled,
            max_retries: r.max_retries,
            retry_time: r.retry_time,
            authorized_ips: r
                .authorized_ips
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            timezone: r.timezone,
        }
    }
}

pub struct PgProjectRepository {
    pool: PgPool,
}

impl PgProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PgProjectRepository {
    async fn get(&self, id: ProjectId) -> Result<Option<Project>> {
        debug!(project_id = id.value(), "loading project");

        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, caller_id, prompt_audio, expected_dtmf, transfer_context,
                   transfer_extension, trunks, dial_prefix, amd_enabled,
                   smart_cid_enabled, max_retries, retry_time, authorized_ips, timezone
            FROM projects WHERE id = $1
            "#,
        )
        .bind(id.value())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Project::from))
    }

    async fn list_all(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, caller_id, prompt_audio, expected_dtmf, transfer_context,
                   transfer_extension, trunks, dial_prefix, amd_enabled,
                   smart_cid_enabled, max_retries, retry_time, authorized_ips, timezone
            FROM projects
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Project::from).collect())
    }
}
