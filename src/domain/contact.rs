//! Contact domain model
//!
//! A row in a campaign's phone list. Ownership of the state machine is
//! split across three components: the Sweeper moves `pending` -> `dialing`
//! (and `pending` -> `skipped`), the IVR session / Event Correlator /
//! Orphan Reaper move `dialing` -> {`completed`, `failed`}.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::{CampaignId, ContactId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactState {
    Pending,
    Dialing,
    Completed,
    Failed,
    Skipped,
}

impl ContactState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContactState::Pending => "pending",
            ContactState::Dialing => "dialing",
            ContactState::Completed => "completed",
            ContactState::Failed => "failed",
            ContactState::Skipped => "skipped",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ContactState::Pending),
            "dialing" => Some(ContactState::Dialing),
            "completed" => Some(ContactState::Completed),
            "failed" => Some(ContactState::Failed),
            "skipped" => Some(ContactState::Skipped),
            _ => None,
        }
    }

    /// A contact in one of these states is never returned by the
    /// "pending" query (Contact monotonicity).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ContactState::Completed | ContactState::Failed | ContactState::Skipped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub campaign_id: CampaignId,
    pub phone: String,
    pub state: ContactState,
    pub attempt_count: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub last_result: Option<String>,
}

#[async_trait]
pub trait ContactRepository: Send + Sync {
    async fn get(&self, id: ContactId) -> Result<Option<Contact>>;

    /// Next `limit` pending contacts of a campaign, ordered by contact ID.
    async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>>;

    async fn count_dialing(&self, campaign_id: CampaignId) -> Result<i64>;

    /// Total contacts in a campaign and the count currently in `state`,
    /// used by the Sweeper's per-cycle counter recompute.
    async fn count_total(&self, campaign_id: CampaignId) -> Result<i64>;
    async fn count_in_state(&self, campaign_id: CampaignId, state: ContactState) -> Result<i64>;

    /// Atomically transitions a contact to `dialing`. Returns `false` if the
    /// contact was not in `pending` (a racing sweep already claimed it) so
    /// callers never hand an already-claimed contact to the Dispatcher.
    async fn mark_dialing(&self, id: ContactId) -> Result<bool>;

    async fn mark_skipped(&self, id: ContactId, reason: &str) -> Result<()>;
    async fn mark_terminal(&self, id: ContactId, state: ContactState, result: &str) -> Result<()>;

    /// Returns a contact that was optimistically claimed back to `pending`
    /// (used when the Dispatcher rejects with "channel limit").
    async fn mark_pending(&self, id: ContactId) -> Result<()>;

    /// Bulk-transitions every contact still in `dialing` past `max_age`
    /// (since `last_attempt_at`) to `failed`/NA, and returns their ids.
    /// Catches a contact whose dial never produced a CallLog row at all
    /// (a pre-dispatch crash), which the CallLog-keyed sweeps can't see.
    async fn bulk_fail_stale_dialing(
        &self,
        max_age: chrono::Duration,
    ) -> Result<Vec<ContactId>>;
}
