//! PBX Event Correlator
//!
//! Consumes the management connection's asynchronous event stream via its
//! own bounded subscription on the `EventBus` and projects it onto call
//! state. Never releases a slot the Dispatcher already released on its own
//! synchronous rejection path.

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::call_log::{CallLogRepository, CallLogUpdate, CallStatus, Disposition};
use crate::domain::contact::{ContactRepository, ContactState};
use crate::domain::shared::PbxUniqueId;
use crate::infrastructure::pbx::management::{EventBus, ManagementEvent};

use super::pool::ChannelPool;
use super::tracker::ActiveCallTracker;

pub struct Correlator {
    bus: Arc<EventBus>,
    tracker: Arc<ActiveCallTracker>,
    pool: Arc<ChannelPool>,
    call_log_repo: Arc<dyn CallLogRepository>,
    contact_repo: Arc<dyn ContactRepository>,
}

impl Correlator {
    pub fn new(
        bus: Arc<EventBus>,
        tracker: Arc<ActiveCallTracker>,
        pool: Arc<ChannelPool>,
        call_log_repo: Arc<dyn CallLogRepository>,
        contact_repo: Arc<dyn ContactRepository>,
    ) -> Self {
        Self {
            bus,
            tracker,
            pool,
            call_log_repo,
            contact_repo,
        }
    }

    /// Runs until `stop` is signalled. If the bus drops its sender side
    /// (the management connection tore down), this returns rather than
    /// buffering across the reconnect gap — the Orphan Reaper is the
    /// safety net for whatever was lost.
    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut rx = self.bus.subscribe();
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("correlator stopping");
                        return;
                    }
                }
                event = rx.recv() => {
                    match event {
                        Ok(event) => self.handle(event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("correlator lagged behind the event bus, dropped {n} events");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                            warn!("event bus closed, correlator exiting");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&self, event: ManagementEvent) {
        let result = match event {
            ManagementEvent::VarSet { variable, value, uniqueid } => {
                self.handle_varset(&variable, &value, &uniqueid).await
            }
            ManagementEvent::OriginateResponse { response, reason, uniqueid, .. } => {
                self.handle_originate_response(&response, reason, uniqueid.as_deref()).await
            }
            ManagementEvent::Hangup { uniqueid, cause, .. } => self.handle_hangup(&uniqueid, cause).await,
            ManagementEvent::Other(_) => Ok(()),
        };

        if let Err(e) = result {
            warn!("correlator failed to process event: {e}");
        }
    }

    /// `APICALL_UNIQUEID` carries the PBX's unique-id in the VarSet's
    /// `uniqueid` field and our internal UUID in its `value` field
    ///. Links the two in the Tracker, then stamps the CallLog row so
    /// `find_by_pbx_unique_id` (used by `handle_originate_response` and
    /// `handle_hangup`) can actually find it.
    async fn handle_varset(&self, variable: &str, value: &str, uniqueid: &str) -> crate::domain::shared::Result<()> {
        if variable != "APICALL_UNIQUEID" {
            return Ok(());
        }
        let uuid = match value.parse::<uuid::Uuid>() {
            Ok(u) => crate::domain::shared::CallUuid::from_uuid(u),
            Err(_) => {
                warn!("VarSet APICALL_UNIQUEID carried a non-UUID value: {value}");
                return Ok(());
            }
        };
        self.tracker.add_alias(PbxUniqueId::new(uniqueid), uuid).await;

        if let Some(call) = self.tracker.get(uuid).await {
            let mut update = CallLogUpdate::new(call.call_log_id);
            update.pbx_unique_id = Some(uniqueid.to_string());
            self.call_log_repo.apply(&update).await?;
        }

        Ok(())
    }

    /// A non-success OriginateResponse maps to the same reason-code table
    /// as the Dispatcher's synchronous rejection handling, but does *not*
    /// release the slot — the Dispatcher already did on its own path.
    async fn handle_originate_response(
        &self,
        response: &str,
        reason: Option<i32>,
        uniqueid: Option<&str>,
    ) -> crate::domain::shared::Result<()> {
        if response.eq_ignore_ascii_case("Success") {
            return Ok(());
        }

        let Some(uniqueid) = uniqueid else { return Ok(()) };
        let Some(log) = self.call_log_repo.find_by_pbx_unique_id(uniqueid).await? else {
            return Ok(());
        };
        if log.status.is_terminal() {
            return Ok(());
        }

        let disposition = Disposition::from_originate_reason(reason.unwrap_or(-1));
        let mut update = CallLogUpdate::new(log.id);
        update.status = Some(CallStatus::Failed);
        update.disposition = Some(disposition);
        self.call_log_repo.apply_if_dialing(&update).await?;

        Ok(())
    }

    /// Maps the ITU Q.850 cause subset to (status, disposition), updates
    /// the matching DIALING CallLog row (monotonic — never regresses a
    /// terminal row), then if tracked: removes from the Tracker, releases
    /// the trunk slot, and updates the owning contact.
    async fn handle_hangup(&self, uniqueid: &str, cause: i32) -> crate::domain::shared::Result<()> {
        let (status, disposition) = Disposition::from_hangup_cause(cause);

        if let Some(log) = self.call_log_repo.find_by_pbx_unique_id(uniqueid).await? {
            if !log.status.is_terminal() {
                let mut update = CallLogUpdate::new(log.id);
                update.status = Some(status);
                update.disposition = Some(disposition);
                self.call_log_repo.apply_if_dialing(&update).await?;
            }
        }

        if let Some(call) = self.tracker.get_by_alias_fuzzy(uniqueid).await {
            self.tracker.remove(call.uuid).await;
            self.pool.release(&call.trunk);

            if let Some(contact_id) = call.contact_id {
                let state = disposition.contact_state();
                self.contact_repo.mark_terminal(contact_id, state, disposition.as_str()).await?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call_log::{CallLog, CallLogUpdate as Update};
    use crate::domain::contact::Contact;
    use crate::domain::shared::{CallLogId, CampaignId, ContactId, ProjectId, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCallLogRepo {
        logs: Mutex<Vec<CallLog>>,
    }

    #[async_trait]
    impl CallLogRepository for FakeCallLogRepo {
        async fn insert(&self, log: &CallLog) -> Result<CallLogId> {
            self.logs.lock().unwrap().push(log.clone());
            Ok(log.id)
        }
        async fn get(&self, id: CallLogId) -> Result<Option<CallLog>> {
            Ok(self.logs.lock().unwrap().iter().find(|l| l.id == id).cloned())
        }
        async fn apply_if_dialing(&self, update: &Update) -> Result<bool> {
            let mut logs = self.logs.lock().unwrap();
            if let Some(log) = logs.iter_mut().find(|l| l.id == update.id) {
                if log.status == CallStatus::Dialing {
                    apply_update(log, update);
                    return Ok(true);
                }
            }
            Ok(false)
        }
        async fn apply(&self, update: &Update) -> Result<()> {
            let mut logs = self.logs.lock().unwrap();
            if let Some(log) = logs.iter_mut().find(|l| l.id == update.id) {
                apply_update(log, update);
            }
            Ok(())
        }
        async fn find_by_pbx_unique_id(&self, pbx_unique_id: &str) -> Result<Option<CallLog>> {
            Ok(self
                .logs
                .lock()
                .unwrap()
                .iter()
                .find(|l| l.pbx_unique_id.as_deref() == Some(pbx_unique_id))
                .cloned())
        }
        async fn apply_batch(&self, _updates: &[Update]) -> Result<Vec<CallLogId>> {
            Ok(vec![])
        }
        async fn complete_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<CallLogId>> {
            Ok(vec![])
        }
    }

    fn apply_update(log: &mut CallLog, update: &Update) {
        if let Some(s) = update.status {
            log.status = s;
        }
        if let Some(d) = update.disposition {
            log.disposition = Some(d);
        }
        if let Some(ref id) = update.pbx_unique_id {
            log.pbx_unique_id = Some(id.clone());
        }
    }

    #[derive(Default)]
    struct FakeContactRepo {
        marked: Mutex<Vec<(ContactId, ContactState, String)>>,
    }

    #[async_trait]
    impl ContactRepository for FakeContactRepo {
        async fn get(&self, _id: ContactId) -> Result<Option<Contact>> {
            Ok(None)
        }
        async fn list_pending(&self, _campaign_id: CampaignId, _limit: i64) -> Result<Vec<Contact>> {
            Ok(vec![])
        }
        async fn count_dialing(&self, _campaign_id: CampaignId) -> Result<i64> {
            Ok(0)
        }
        async fn count_total(&self, _campaign_id: CampaignId) -> Result<i64> {
            Ok(0)
        }
        async fn count_in_state(&self, _campaign_id: CampaignId, _state: ContactState) -> Result<i64> {
            Ok(0)
        }
        async fn mark_dialing(&self, _id: ContactId) -> Result<bool> {
            Ok(true)
        }
        async fn mark_skipped(&self, _id: ContactId, _reason: &str) -> Result<()> {
            Ok(())
        }
        async fn mark_terminal(&self, id: ContactId, state: ContactState, result: &str) -> Result<()> {
            self.marked.lock().unwrap().push((id, state, result.to_string()));
            Ok(())
        }
        async fn mark_pending(&self, _id: ContactId) -> Result<()> {
            Ok(())
        }
        async fn bulk_fail_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<ContactId>> {
            Ok(vec![])
        }
    }

    fn correlator() -> (Arc<Correlator>, Arc<FakeCallLogRepo>, Arc<FakeContactRepo>, Arc<ActiveCallTracker>, Arc<ChannelPool>) {
        let bus = Arc::new(EventBus::new());
        let tracker = Arc::new(ActiveCallTracker::new());
        let pool = Arc::new(ChannelPool::new(10, 10));
        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let contact_repo = Arc::new(FakeContactRepo::default());
        let correlator = Arc::new(Correlator::new(
            bus,
            tracker.clone(),
            pool.clone(),
            call_log_repo.clone(),
            contact_repo.clone(),
        ));
        (correlator, call_log_repo, contact_repo, tracker, pool)
    }

    #[tokio::test]
    async fn varset_registers_alias() {
        let (correlator, _, _, tracker, _) = correlator();
        let uuid = crate::domain::shared::CallUuid::new();
        let active_call = crate::domain::active_call::ActiveCall {
            uuid,
            pbx_unique_id: None,
            project_id: ProjectId::new(1),
            campaign_id: None,
            contact_id: None,
            trunk: crate::domain::shared::TrunkName::new("t1"),
            phone: "5550000".to_string(),
            caller_id: "5551111".to_string(),
            call_log_id: CallLogId::new(1),
            started_at: chrono::Utc::now(),
        };
        tracker.add(active_call).await;

        correlator
            .handle(ManagementEvent::VarSet {
                variable: "APICALL_UNIQUEID".to_string(),
                value: uuid.to_string(),
                uniqueid: "1700000000.1".to_string(),
            })
            .await;

        let alias = PbxUniqueId::new("1700000000.1");
        assert_eq!(tracker.get_by_alias(&alias).await.unwrap().uuid, uuid);
    }

    #[tokio::test]
    async fn hangup_releases_slot_and_updates_contact() {
        let (correlator, call_log_repo, contact_repo, tracker, pool) = correlator();

        let trunk = crate::domain::shared::TrunkName::new("t1");
        assert!(pool.acquire(&trunk));

        // No pbx_unique_id set here: production never has one at insert
        // time either. The VarSet event below is what's supposed to plant
        // it, same as it would before a real Hangup arrives.
        let log = CallLog::new_dialing(CallLogId::new(1), ProjectId::new(1), None, Some(ContactId::new(42)), "573000".to_string(), "555".to_string());
        call_log_repo.insert(&log).await.unwrap();

        let uuid = crate::domain::shared::CallUuid::new();
        let active_call = crate::domain::active_call::ActiveCall {
            uuid,
            pbx_unique_id: None,
            project_id: ProjectId::new(1),
            campaign_id: None,
            contact_id: Some(ContactId::new(42)),
            trunk: trunk.clone(),
            phone: "573000".to_string(),
            caller_id: "555".to_string(),
            call_log_id: CallLogId::new(1),
            started_at: chrono::Utc::now(),
        };
        tracker.add(active_call).await;

        correlator
            .handle(ManagementEvent::VarSet {
                variable: "APICALL_UNIQUEID".to_string(),
                value: uuid.to_string(),
                uniqueid: "1700000000.1".to_string(),
            })
            .await;

        correlator
            .handle(ManagementEvent::Hangup {
                channel: "SIP/t1-0001".to_string(),
                uniqueid: "1700000000.1".to_string(),
                cause: 16,
                cause_txt: None,
            })
            .await;

        assert_eq!(pool.stats().active_global, 0);
        assert!(tracker.get(uuid).await.is_none());

        let updated_log = call_log_repo.get(CallLogId::new(1)).await.unwrap().unwrap();
        assert_eq!(updated_log.pbx_unique_id.as_deref(), Some("1700000000.1"));
        assert_eq!(updated_log.status, CallStatus::Completed);
        assert_eq!(updated_log.disposition, Some(Disposition::A));

        let marked = contact_repo.marked.lock().unwrap();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0].1, ContactState::Completed);
    }

    #[tokio::test]
    async fn varset_persists_pbx_unique_id_onto_call_log() {
        let (correlator, call_log_repo, _, tracker, _) = correlator();

        let log = CallLog::new_dialing(CallLogId::new(5), ProjectId::new(1), None, None, "573000".to_string(), "555".to_string());
        call_log_repo.insert(&log).await.unwrap();

        let uuid = crate::domain::shared::CallUuid::new();
        let active_call = crate::domain::active_call::ActiveCall {
            uuid,
            pbx_unique_id: None,
            project_id: ProjectId::new(1),
            campaign_id: None,
            contact_id: None,
            trunk: crate::domain::shared::TrunkName::new("t1"),
            phone: "573000".to_string(),
            caller_id: "555".to_string(),
            call_log_id: CallLogId::new(5),
            started_at: chrono::Utc::now(),
        };
        tracker.add(active_call).await;

        correlator
            .handle(ManagementEvent::VarSet {
                variable: "APICALL_UNIQUEID".to_string(),
                value: uuid.to_string(),
                uniqueid: "1700000001.2".to_string(),
            })
            .await;

        let updated_log = call_log_repo.get(CallLogId::new(5)).await.unwrap().unwrap();
        assert_eq!(updated_log.pbx_unique_id.as_deref(), Some("1700000001.2"));

        let found = call_log_repo.find_by_pbx_unique_id("1700000001.2").await.unwrap();
        assert_eq!(found.unwrap().id, CallLogId::new(5));
    }

    #[tokio::test]
    async fn hangup_never_regresses_a_terminal_call_log() {
        let (correlator, call_log_repo, _, _, _) = correlator();

        let mut log = CallLog::new_dialing(CallLogId::new(1), ProjectId::new(1), None, None, "573000".to_string(), "555".to_string());
        log.pbx_unique_id = Some("1700000000.1".to_string());
        log.status = CallStatus::Completed;
        log.disposition = Some(Disposition::A);
        call_log_repo.insert(&log).await.unwrap();

        correlator
            .handle(ManagementEvent::Hangup {
                channel: "SIP/t1-0001".to_string(),
                uniqueid: "1700000000.1".to_string(),
                cause: 34,
                cause_txt: None,
            })
            .await;

        let updated_log = call_log_repo.get(CallLogId::new(1)).await.unwrap().unwrap();
        assert_eq!(updated_log.disposition, Some(Disposition::A));
    }
}
