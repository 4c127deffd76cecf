//! PostgreSQL implementation of `ScheduleRepository`

use async_trait::async_trait;
use chrono::{NaiveTime, Weekday};
use sqlx::{FromRow, PgPool};

use crate::domain::schedule::{Schedule, ScheduleRepository};
use crate::domain::shared::{CampaignId, Result};

#[derive(FromRow)]
struct ScheduleRow {
    campaign_id: i64,
    weekday: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
    active: bool,
}

fn weekday_from_i16(n: i16) -> Weekday {
    match n.rem_euclid(7) {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

impl From<ScheduleRow> for Schedule {
    fn from(r: ScheduleRow) -> Self {
        Schedule {
            campaign_id: CampaignId::new(r.campaign_id),
            weekday: weekday_from_i16(r.weekday),
            start_time: r.start_time,
            end_time: r.end_time,
            active: r.active,
        }
    }
}

pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Schedule>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT campaign_id, weekday, start_time, end_time, active \
             FROM campaign_schedules WHERE campaign_id = $1",
        )
        .bind(campaign_id.value())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Schedule::from).collect())
    }
}
