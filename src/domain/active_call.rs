//! ActiveCall domain model
//!
//! In-memory only; never persisted directly (the durable record is
//! `CallLog`). Indexed by the engine's Active Call Tracker
//! (`engine::tracker`) by internal UUID and, once learned, by the PBX's
//! own unique-id (alias).

use chrono::{DateTime, Utc};

use crate::domain::shared::{CallLogId, CallUuid, CampaignId, ContactId, PbxUniqueId, ProjectId, TrunkName};

#[derive(Debug, Clone)]
pub struct ActiveCall {
    pub uuid: CallUuid,
    pub pbx_unique_id: Option<PbxUniqueId>,
    pub project_id: ProjectId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub trunk: TrunkName,
    pub phone: String,
    pub caller_id: String,
    pub call_log_id: CallLogId,
    pub started_at: DateTime<Utc>,
}

impl ActiveCall {
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}
