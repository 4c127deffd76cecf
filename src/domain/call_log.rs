//! CallLog domain model
//!
//! The durable per-call record. Created by the Dispatcher in `DIALING`
//! before the PBX is contacted, updated through the Log Batcher on every
//! terminal branch of the IVR session, the Event Correlator, or the Orphan
//! Reaper. Never regresses from a terminal status back to an in-flight one
//! (CallLog monotonicity).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::shared::{CallLogId, CampaignId, ContactId, ProjectId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CallStatus {
    Dialing,
    Connected,
    Human,
    Completed,
    Failed,
    /// An IVR session connected with no pre-created CallLog row (no
    /// Dispatcher-planted `CALL_LOG_ID` channel variable) — a direct or
    /// out-of-band call that still needs a durable record rather than
    /// being silently lost.
    InitiatedLegacy,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "DIALING",
            CallStatus::Connected => "CONNECTED",
            CallStatus::Human => "HUMAN",
            CallStatus::Completed => "COMPLETED",
            CallStatus::Failed => "FAILED",
            CallStatus::InitiatedLegacy => "INITIATED_LEGACY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DIALING" => Some(CallStatus::Dialing),
            "CONNECTED" => Some(CallStatus::Connected),
            "HUMAN" => Some(CallStatus::Human),
            "COMPLETED" => Some(CallStatus::Completed),
            "FAILED" => Some(CallStatus::Failed),
            "INITIATED_LEGACY" => Some(CallStatus::InitiatedLegacy),
            _ => None,
        }
    }

    /// A row in one of these statuses must never be overwritten back to an
    /// in-flight status (CallLog monotonicity).
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallStatus::Completed | CallStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Answered / contacted
    A,
    /// Answering machine
    Am,
    /// Busy
    B,
    /// No answer
    Na,
    /// No interest / DTMF timeout
    N,
    /// Invalid number
    Ni,
    /// Congestion
    Cong,
    /// Transferred
    Xfer,
    /// Generic failure
    Fail,
    /// Do-not-call
    Dnc,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::A => "A",
            Disposition::Am => "AM",
            Disposition::B => "B",
            Disposition::Na => "NA",
            Disposition::N => "N",
            Disposition::Ni => "NI",
            Disposition::Cong => "CONG",
            Disposition::Xfer => "XFER",
            Disposition::Fail => "FAIL",
            Disposition::Dnc => "DNC",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "A" => Some(Disposition::A),
            "AM" => Some(Disposition::Am),
            "B" => Some(Disposition::B),
            "NA" => Some(Disposition::Na),
            "N" => Some(Disposition::N),
            "NI" => Some(Disposition::Ni),
            "CONG" => Some(Disposition::Cong),
            "XFER" => Some(Disposition::Xfer),
            "FAIL" => Some(Disposition::Fail),
            "DNC" => Some(Disposition::Dnc),
            _ => None,
        }
    }

    /// Contact-state projection of a disposition: {A, XFER} ->
    /// completed, everything else terminal -> failed.
    pub fn contact_state(&self) -> crate::domain::contact::ContactState {
        use crate::domain::contact::ContactState;
        match self {
            Disposition::A | Disposition::Xfer => ContactState::Completed,
            _ => ContactState::Failed,
        }
    }

    /// Maps a PBX Originate rejection `Reason` code to a disposition
    ///: 1 -> NI, 5 -> B, 8 -> CONG, else FAIL.
    pub fn from_originate_reason(reason: i32) -> Disposition {
        match reason {
            1 => Disposition::Ni,
            5 => Disposition::B,
            8 => Disposition::Cong,
            _ => Disposition::Fail,
        }
    }

    /// Maps an ITU Q.850 hangup cause code to a (status, disposition) pair.
    pub fn from_hangup_cause(cause: i32) -> (CallStatus, Disposition) {
        match cause {
            16 => (CallStatus::Completed, Disposition::A),
            17 => (CallStatus::Completed, Disposition::B),
            18 | 19 | 21 => (CallStatus::Completed, Disposition::Na),
            27 | 1 => (CallStatus::Failed, Disposition::Ni),
            34 | 38 => (CallStatus::Failed, Disposition::Cong),
            _ => (CallStatus::Completed, Disposition::Na),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallLog {
    pub id: CallLogId,
    pub project_id: ProjectId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub phone: String,
    pub caller_id: String,
    pub status: CallStatus,
    pub disposition: Option<Disposition>,
    pub dtmf_digit: Option<char>,
    pub interacted: bool,
    pub duration_seconds: Option<i32>,
    pub pbx_unique_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CallLog {
    pub fn new_dialing(
        id: CallLogId,
        project_id: ProjectId,
        campaign_id: Option<CampaignId>,
        contact_id: Option<ContactId>,
        phone: String,
        caller_id: String,
    ) -> Self {
        Self {
            id,
            project_id,
            campaign_id,
            contact_id,
            phone,
            caller_id,
            status: CallStatus::Dialing,
            disposition: None,
            dtmf_digit: None,
            interacted: false,
            duration_seconds: None,
            pbx_unique_id: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallLogUpdate {
    pub id: CallLogId,
    pub status: Option<CallStatus>,
    pub disposition: Option<Disposition>,
    pub dtmf_digit: Option<char>,
    pub interacted: Option<bool>,
    pub duration_seconds: Option<i32>,
    pub pbx_unique_id: Option<String>,
}

impl CallLogUpdate {
    pub fn new(id: CallLogId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait CallLogRepository: Send + Sync {
    /// Inserts a new row and returns the database-assigned id. Any id set
    /// on `log` going in is ignored.
    async fn insert(&self, log: &CallLog) -> Result<CallLogId>;
    async fn get(&self, id: CallLogId) -> Result<Option<CallLog>>;

    /// Applies an update only if the row is still `DIALING`, so a terminal
    /// write never regresses (CallLog monotonicity).
    async fn apply_if_dialing(&self, update: &CallLogUpdate) -> Result<bool>;

    /// Applies an update unconditionally, bypassing the DIALING guard.
    async fn apply(&self, update: &CallLogUpdate) -> Result<()>;

    async fn find_by_pbx_unique_id(&self, pbx_unique_id: &str) -> Result<Option<CallLog>>;

    /// Applies a batch of updates in one statement (the Log Batcher's
    /// `flush`), regardless of whether each row is still
    /// `DIALING` — batched updates come from components (IVR session,
    /// Correlator) that already own the row's terminal transition.
    /// Returns the IDs whose resulting status is terminal, so the caller
    /// can project them onto contact state with a second query.
    async fn apply_batch(&self, updates: &[CallLogUpdate]) -> Result<Vec<CallLogId>>;

    /// Bulk-transitions any row still `DIALING` for longer than `max_age`
    /// to `COMPLETED`/`NA` (Orphan Reaper step 2).
    async fn complete_stale_dialing(
        &self,
        max_age: chrono::Duration,
    ) -> Result<Vec<CallLogId>>;
}
