//! Schedule domain model
//!
//! A campaign may have several schedule rows; dialing is enabled whenever
//! "now" falls within at least one active row for the current weekday.
//! `start_time`/`end_time` are compared against the server's local wall
//! clock, matching how the persisted rows were entered — no timezone
//! conversion happens here. A project's own `timezone` field is
//! display-only and never enters this comparison.

use async_trait::async_trait;
use chrono::{Datelike, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::domain::shared::{CampaignId, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub campaign_id: CampaignId,
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub active: bool,
}

impl Schedule {
    pub fn covers(&self, now_weekday: Weekday, now_time: NaiveTime) -> bool {
        self.active && self.weekday == now_weekday && now_time >= self.start_time && now_time <= self.end_time
    }
}

/// True if any active schedule row covers the given wall-clock moment.
pub fn any_covers(schedules: &[Schedule], now: chrono::NaiveDateTime) -> bool {
    let weekday = now.weekday();
    let time = now.time();
    schedules.iter().any(|s| s.covers(weekday, time))
}

#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn list_for_campaign(&self, campaign_id: CampaignId) -> Result<Vec<Schedule>>;
}
