//! Campaign domain model
//!
//! A campaign is a batch job: a set of contacts dialed under a project,
//! driven through states externally except for the Sweeper's
//! active -> completed transition when every contact reaches a terminal
//! state.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{CampaignId, ProjectId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignState {
    Draft,
    Active,
    Paused,
    Completed,
    Stopped,
}

impl CampaignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignState::Draft => "draft",
            CampaignState::Active => "active",
            CampaignState::Paused => "paused",
            CampaignState::Completed => "completed",
            CampaignState::Stopped => "stopped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(CampaignState::Draft),
            "active" => Some(CampaignState::Active),
            "paused" => Some(CampaignState::Paused),
            "completed" => Some(CampaignState::Completed),
            "stopped" => Some(CampaignState::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub project_id: ProjectId,
    pub state: CampaignState,
    pub total: i64,
    pub processed: i64,
    pub succeeded: i64,
    pub failed: i64,
}

impl Campaign {
    /// `processed = completed + failed + skipped`, per the Sweeper's
    /// recompute step. `skipped` contacts are folded into
    /// `failed` at the aggregate level since the campaign row carries no
    /// separate skipped counter.
    pub fn recompute_counters(&mut self, completed: i64, failed_or_skipped: i64, total: i64) {
        self.succeeded = completed;
        self.failed = failed_or_skipped;
        self.processed = completed + failed_or_skipped;
        self.total = total;
    }

    pub fn is_fully_processed(&self) -> bool {
        self.processed >= self.total && self.total > 0
    }
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn get(&self, id: CampaignId) -> Result<Option<Campaign>>;
    async fn list_active(&self) -> Result<Vec<Campaign>>;
    async fn set_state(&self, id: CampaignId, state: CampaignState) -> Result<()>;
    async fn update_counters(&self, campaign: &Campaign) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_str() {
        for s in [
            CampaignState::Draft,
            CampaignState::Active,
            CampaignState::Paused,
            CampaignState::Completed,
            CampaignState::Stopped,
        ] {
            assert_eq!(CampaignState::from_str(s.as_str()), Some(s));
        }
    }

    #[test]
    fn unknown_state_string_is_none() {
        assert_eq!(CampaignState::from_str("bogus"), None);
    }

    #[test]
    fn fully_processed_requires_nonzero_total() {
        let mut c = Campaign {
            id: CampaignId::new(1),
            name: "c".to_string(),
            project_id: ProjectId::new(1),
            state: CampaignState::Active,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
        };
        assert!(!c.is_fully_processed());
        c.recompute_counters(3, 2, 5);
        assert!(c.is_fully_processed());
        assert_eq!(c.processed, 5);
    }
}
