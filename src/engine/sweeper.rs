//! Campaign Sweeper
//!
//! Drives pending contacts into the Dispatcher at a steady 1s cadence.
//! Runs single-threaded within itself but fires one spawned dispatch task
//! per contact; downstream pacing (CPS) and admission (Pool) provide the
//! actual backpressure.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::blacklist::BlacklistRepository;
use crate::domain::campaign::{Campaign, CampaignRepository, CampaignState};
use crate::domain::config_store::{ConfigRepository, OperationalDefaults, KEY_CONTACTS_PER_CYCLE};
use crate::domain::contact::{Contact, ContactRepository, ContactState};
use crate::domain::project::{ProjectRepository, ProjectRepositoryExt};
use crate::domain::schedule::{any_covers, ScheduleRepository};
use crate::domain::shared::Result;

use super::dispatcher::{DialRequest, DispatchOutcome, Dispatcher};

pub struct Sweeper {
    campaign_repo: Arc<dyn CampaignRepository>,
    contact_repo: Arc<dyn ContactRepository>,
    schedule_repo: Arc<dyn ScheduleRepository>,
    blacklist_repo: Arc<dyn BlacklistRepository>,
    config_repo: Arc<dyn ConfigRepository>,
    project_repo: Arc<dyn ProjectRepository>,
    dispatcher: Arc<Dispatcher>,
    defaults: OperationalDefaults,
}

impl Sweeper {
    pub fn new(
        campaign_repo: Arc<dyn CampaignRepository>,
        contact_repo: Arc<dyn ContactRepository>,
        schedule_repo: Arc<dyn ScheduleRepository>,
        blacklist_repo: Arc<dyn BlacklistRepository>,
        config_repo: Arc<dyn ConfigRepository>,
        project_repo: Arc<dyn ProjectRepository>,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            campaign_repo,
            contact_repo,
            schedule_repo,
            blacklist_repo,
            config_repo,
            project_repo,
            dispatcher,
            defaults: OperationalDefaults::default(),
        }
    }

    /// Runs the sweep loop until `stop` is signalled.
    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("sweeper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("sweep cycle failed: {e}");
                    }
                }
            }
        }
    }

    async fn sweep_once(&self) -> Result<()> {
        let campaigns = self.campaign_repo.list_active().await?;
        for campaign in campaigns {
            if let Err(e) = self.sweep_campaign(campaign).await {
                error!("sweeping campaign failed: {e}");
            }
        }
        Ok(())
    }

    async fn sweep_campaign(&self, mut campaign: Campaign) -> Result<()> {
        if !self.schedule_matches(&campaign).await? {
            return Ok(());
        }

        let contacts_per_cycle = self
            .config_repo
            .get_int(KEY_CONTACTS_PER_CYCLE)
            .await?
            .unwrap_or(self.defaults.contacts_per_cycle);

        let pending = self.contact_repo.list_pending(campaign.id, contacts_per_cycle).await?;
        let dialing_count = self.contact_repo.count_dialing(campaign.id).await?;

        if pending.is_empty() && dialing_count == 0 {
            self.campaign_repo.set_state(campaign.id, CampaignState::Completed).await?;
            info!(campaign_id = %campaign.id, "campaign fully processed, marking completed");
            return Ok(());
        }

        let project = self.project_repo.require(campaign.project_id).await?;

        for contact in pending {
            if self.blacklist_repo.is_blacklisted(campaign.project_id, &contact.phone).await? {
                self.contact_repo.mark_skipped(contact.id, "BLACKLISTED").await?;
                continue;
            }

            // The mark-to-dialing write must land before the dispatch task
            // spawns so a crash between the two never double-dials.
            if !self.contact_repo.mark_dialing(contact.id).await? {
                // A racing sweep already claimed this contact.
                continue;
            }

            self.spawn_dispatch(&project, &contact);
        }

        let total = self.contact_repo.count_total(campaign.id).await?;
        let completed = self.contact_repo.count_in_state(campaign.id, ContactState::Completed).await?;
        let failed = self.contact_repo.count_in_state(campaign.id, ContactState::Failed).await?;
        let skipped = self.contact_repo.count_in_state(campaign.id, ContactState::Skipped).await?;
        campaign.recompute_counters(completed, failed + skipped, total);
        self.campaign_repo.update_counters(&campaign).await?;

        Ok(())
    }

    async fn schedule_matches(&self, campaign: &Campaign) -> Result<bool> {
        let schedules = self.schedule_repo.list_for_campaign(campaign.id).await?;
        // "now" is the server's local wall clock, compared naively against
        // the stored schedule rows; no timezone conversion.
        let now = chrono::Local::now().naive_local();
        Ok(any_covers(&schedules, now))
    }

    fn spawn_dispatch(&self, project: &crate::domain::project::Project, contact: &Contact) {
        let dispatcher = self.dispatcher.clone();
        let project = project.clone();
        let request = DialRequest {
            project_id: project.id,
            campaign_id: Some(contact.campaign_id),
            contact_id: Some(contact.id),
            phone: contact.phone.clone(),
        };
        let contact_repo = self.contact_repo.clone();
        let contact_id = contact.id;

        tokio::spawn(async move {
            match dispatcher.dispatch(&project, request).await {
                // The call is in flight; the IVR handler, the Correlator, or
                // the Orphan Reaper will move the contact on from here.
                Ok(DispatchOutcome::Accepted { .. }) => {}
                // Our own admission control rejected it before any PBX
                // action was taken: nothing was consumed, so the contact
                // goes back to `pending` for a later cycle to retry.
                Ok(DispatchOutcome::ChannelLimitReached) => {
                    let _ = contact_repo.mark_pending(contact_id).await;
                }
                Ok(DispatchOutcome::Rejected { disposition }) => {
                    let _ = contact_repo
                        .mark_terminal(contact_id, ContactState::Failed, disposition)
                        .await;
                }
                Err(e) => {
                    warn!(contact_id = %contact_id, "dispatch task failed: {e}");
                    let _ = contact_repo
                        .mark_terminal(contact_id, ContactState::Failed, "FAIL")
                        .await;
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::blacklist::BlacklistRepository;
    use crate::domain::call_log::{CallLog, CallLogRepository, CallLogUpdate, CallStatus};
    use crate::domain::callerid_stats::{CallerIdPattern, CallerIdStatsRepository};
    use crate::domain::config_store::ConfigRepository;
    use crate::domain::project::Project;
    use crate::domain::shared::{CallLogId, CampaignId, ContactId, ProjectId, Result, TrunkName};
    use crate::engine::dispatcher::{DispatchAcceptance, DispatchRequest, DispatchTransport};
    use async_trait::async_trait;
    use chrono::Weekday;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCampaignRepo {
        campaigns: Mutex<Vec<Campaign>>,
        set_states: Mutex<Vec<(CampaignId, CampaignState)>>,
    }

    #[async_trait]
    impl CampaignRepository for FakeCampaignRepo {
        async fn get(&self, id: CampaignId) -> Result<Option<Campaign>> {
            Ok(self.campaigns.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }
        async fn list_active(&self) -> Result<Vec<Campaign>> {
            Ok(self
                .campaigns
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.state == CampaignState::Active)
                .cloned()
                .collect())
        }
        async fn set_state(&self, id: CampaignId, state: CampaignState) -> Result<()> {
            self.set_states.lock().unwrap().push((id, state));
            if let Some(c) = self.campaigns.lock().unwrap().iter_mut().find(|c| c.id == id) {
                c.state = state;
            }
            Ok(())
        }
        async fn update_counters(&self, campaign: &Campaign) -> Result<()> {
            if let Some(c) = self.campaigns.lock().unwrap().iter_mut().find(|c| c.id == campaign.id) {
                *c = campaign.clone();
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeContactRepo {
        contacts: Mutex<Vec<Contact>>,
    }

    #[async_trait]
    impl ContactRepository for FakeContactRepo {
        async fn get(&self, id: ContactId) -> Result<Option<Contact>> {
            Ok(self.contacts.lock().unwrap().iter().find(|c| c.id == id).cloned())
        }
        async fn list_pending(&self, campaign_id: CampaignId, limit: i64) -> Result<Vec<Contact>> {
            Ok(self
                .contacts
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.campaign_id == campaign_id && c.state == ContactState::Pending)
                .take(limit as usize)
                .cloned()
                .collect())
        }
        async fn count_dialing(&self, campaign_id: CampaignId) -> Result<i64> {
            self.count_in_state(campaign_id, ContactState::Dialing).await
        }
        async fn count_total(&self, campaign_id: CampaignId) -> Result<i64> {
            Ok(self
                .contacts
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.campaign_id == campaign_id)
                .count() as i64)
        }
        async fn count_in_state(&self, campaign_id: CampaignId, state: ContactState) -> Result<i64> {
            Ok(self
                .contacts
                .lock()
                .unwrap()
                .iter()
                .filter(|c| c.campaign_id == campaign_id && c.state == state)
                .count() as i64)
        }
        async fn mark_dialing(&self, id: ContactId) -> Result<bool> {
            let mut contacts = self.contacts.lock().unwrap();
            if let Some(c) = contacts.iter_mut().find(|c| c.id == id) {
                if c.state == ContactState::Pending {
                    c.state = ContactState::Dialing;
                    return Ok(true);
                }
            }
            Ok(false)
        }
        async fn mark_skipped(&self, id: ContactId, reason: &str) -> Result<()> {
            let mut contacts = self.contacts.lock().unwrap();
            if let Some(c) = contacts.iter_mut().find(|c| c.id == id) {
                c.state = ContactState::Skipped;
                c.last_result = Some(reason.to_string());
            }
            Ok(())
        }
        async fn mark_terminal(&self, id: ContactId, state: ContactState, result: &str) -> Result<()> {
            let mut contacts = self.contacts.lock().unwrap();
            if let Some(c) = contacts.iter_mut().find(|c| c.id == id) {
                c.state = state;
                c.last_result = Some(result.to_string());
            }
            Ok(())
        }
        async fn mark_pending(&self, id: ContactId) -> Result<()> {
            let mut contacts = self.contacts.lock().unwrap();
            if let Some(c) = contacts.iter_mut().find(|c| c.id == id) {
                c.state = ContactState::Pending;
            }
            Ok(())
        }
        async fn bulk_fail_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<ContactId>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeScheduleRepo {
        covers_everything: bool,
    }

    #[async_trait]
    impl ScheduleRepository for FakeScheduleRepo {
        async fn list_for_campaign(&self, _campaign_id: CampaignId) -> Result<Vec<crate::domain::schedule::Schedule>> {
            use crate::domain::schedule::Schedule;
            if !self.covers_everything {
                return Ok(vec![]);
            }
            let full_day = |weekday: Weekday| Schedule {
                campaign_id: CampaignId::new(1),
                weekday,
                start_time: chrono::NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
                end_time: chrono::NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
                active: true,
            };
            Ok(vec![
                full_day(Weekday::Mon),
                full_day(Weekday::Tue),
                full_day(Weekday::Wed),
                full_day(Weekday::Thu),
                full_day(Weekday::Fri),
                full_day(Weekday::Sat),
                full_day(Weekday::Sun),
            ])
        }
    }

    #[derive(Default)]
    struct FakeBlacklistRepo {
        blocked: Vec<String>,
    }

    #[async_trait]
    impl BlacklistRepository for FakeBlacklistRepo {
        async fn is_blacklisted(&self, _project_id: ProjectId, phone: &str) -> Result<bool> {
            Ok(self.blocked.iter().any(|p| p == phone))
        }
    }

    #[derive(Default)]
    struct FakeConfigRepo;

    #[async_trait]
    impl ConfigRepository for FakeConfigRepo {
        async fn get_int(&self, _key: &str) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct FakeProjectRepo {
        project: Option<Project>,
    }

    #[async_trait]
    impl ProjectRepository for FakeProjectRepo {
        async fn get(&self, id: ProjectId) -> Result<Option<Project>> {
            Ok(self.project.clone().filter(|p| p.id == id))
        }
        async fn list_all(&self) -> Result<Vec<Project>> {
            Ok(self.project.clone().into_iter().collect())
        }
    }

    #[derive(Default)]
    struct FakeCallLogRepo {
        logs: Mutex<Vec<CallLog>>,
    }

    #[async_trait]
    impl CallLogRepository for FakeCallLogRepo {
        async fn insert(&self, log: &CallLog) -> Result<CallLogId> {
            let mut logs = self.logs.lock().unwrap();
            let id = CallLogId::new(logs.len() as i64 + 1);
            let mut log = log.clone();
            log.id = id;
            logs.push(log);
            Ok(id)
        }
        async fn get(&self, id: CallLogId) -> Result<Option<CallLog>> {
            Ok(self.logs.lock().unwrap().iter().find(|l| l.id == id).cloned())
        }
        async fn apply_if_dialing(&self, _update: &CallLogUpdate) -> Result<bool> {
            Ok(true)
        }
        async fn apply(&self, _update: &CallLogUpdate) -> Result<()> {
            Ok(())
        }
        async fn find_by_pbx_unique_id(&self, _pbx_unique_id: &str) -> Result<Option<CallLog>> {
            Ok(None)
        }
        async fn apply_batch(&self, _updates: &[CallLogUpdate]) -> Result<Vec<CallLogId>> {
            Ok(vec![])
        }
        async fn complete_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<CallLogId>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeCallerIdStatsRepo;

    #[async_trait]
    impl CallerIdStatsRepository for FakeCallerIdStatsRepo {
        async fn list_for_prefix(&self, _prefix: &str) -> Result<Vec<CallerIdPattern>> {
            Ok(vec![])
        }
        async fn record_attempt(&self, _prefix: &str, _pattern: &str) -> Result<()> {
            Ok(())
        }
        async fn record_answer(&self, _prefix: &str, _pattern: &str) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeTrunkRepo;

    #[async_trait]
    impl crate::domain::trunk::TrunkRepository for FakeTrunkRepo {
        async fn list_all(&self) -> Result<Vec<crate::domain::trunk::Trunk>> {
            Ok(vec![])
        }
        async fn exists(&self, _name: &crate::domain::shared::TrunkName) -> Result<bool> {
            Ok(true)
        }
    }

    struct AcceptingTransport;

    #[async_trait]
    impl DispatchTransport for AcceptingTransport {
        async fn dispatch(&self, _request: &DispatchRequest) -> Result<DispatchAcceptance> {
            Ok(DispatchAcceptance::Accepted)
        }
    }

    fn sample_project() -> Project {
        Project {
            id: ProjectId::new(1),
            caller_id: "5550000000".to_string(),
            prompt_audio: "a.wav".to_string(),
            expected_dtmf: '1',
            transfer_context: "ivr".to_string(),
            transfer_extension: "100".to_string(),
            trunks: "pstn-1".to_string(),
            dial_prefix: "".to_string(),
            amd_enabled: false,
            smart_cid_enabled: false,
            max_retries: 0,
            retry_time: 0,
            authorized_ips: vec![],
            timezone: "UTC".to_string(),
        }
    }

    fn sample_campaign(state: CampaignState) -> Campaign {
        Campaign {
            id: CampaignId::new(1),
            name: "test".to_string(),
            project_id: ProjectId::new(1),
            state,
            total: 0,
            processed: 0,
            succeeded: 0,
            failed: 0,
        }
    }

    fn sample_contact(id: i64, state: ContactState) -> Contact {
        Contact {
            id: ContactId::new(id),
            campaign_id: CampaignId::new(1),
            phone: format!("57300000{id}"),
            state,
            attempt_count: 0,
            last_attempt_at: None,
            last_result: None,
        }
    }

    fn build_dispatcher(call_log_repo: Arc<FakeCallLogRepo>, contact_repo: Arc<FakeContactRepo>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            Arc::new(crate::engine::pool::ChannelPool::new(10, 10)),
            Arc::new(crate::engine::tracker::ActiveCallTracker::new()),
            Arc::new(AcceptingTransport),
            call_log_repo,
            contact_repo,
            Arc::new(FakeCallerIdStatsRepo),
            Arc::new(FakeTrunkRepo),
            Arc::new(crate::engine::dispatcher::CpsLimiter::new(10_000)),
        ))
    }

    fn build_saturated_dispatcher(call_log_repo: Arc<FakeCallLogRepo>, contact_repo: Arc<FakeContactRepo>) -> Arc<Dispatcher> {
        Arc::new(Dispatcher::new(
            Arc::new(crate::engine::pool::ChannelPool::new(0, 0)),
            Arc::new(crate::engine::tracker::ActiveCallTracker::new()),
            Arc::new(AcceptingTransport),
            call_log_repo,
            contact_repo,
            Arc::new(FakeCallerIdStatsRepo),
            Arc::new(FakeTrunkRepo),
            Arc::new(crate::engine::dispatcher::CpsLimiter::new(10_000)),
        ))
    }

    fn build_sweeper(
        campaign_repo: Arc<FakeCampaignRepo>,
        contact_repo: Arc<FakeContactRepo>,
        schedule_covers: bool,
        blocked: Vec<String>,
        dispatcher: Arc<Dispatcher>,
    ) -> Sweeper {
        Sweeper::new(
            campaign_repo,
            contact_repo,
            Arc::new(FakeScheduleRepo {
                covers_everything: schedule_covers,
            }),
            Arc::new(FakeBlacklistRepo { blocked }),
            Arc::new(FakeConfigRepo),
            Arc::new(FakeProjectRepo {
                project: Some(sample_project()),
            }),
            dispatcher,
        )
    }

    #[tokio::test]
    async fn outside_schedule_window_makes_no_progress() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        contact_repo.contacts.lock().unwrap().push(sample_contact(1, ContactState::Pending));

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo.clone(), contact_repo.clone(), false, vec![], dispatcher);

        sweeper.sweep_once().await.unwrap();

        assert_eq!(contact_repo.contacts.lock().unwrap()[0].state, ContactState::Pending);
        assert!(campaign_repo.set_states.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_contact_is_marked_dialing_and_dispatched() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        contact_repo.contacts.lock().unwrap().push(sample_contact(1, ContactState::Pending));

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo, contact_repo.clone(), true, vec![], dispatcher);

        sweeper.sweep_once().await.unwrap();

        assert_eq!(contact_repo.contacts.lock().unwrap()[0].state, ContactState::Dialing);
    }

    #[tokio::test]
    async fn blacklisted_contact_is_skipped_not_dialed() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        let contact = sample_contact(1, ContactState::Pending);
        let blocked_phone = contact.phone.clone();
        contact_repo.contacts.lock().unwrap().push(contact);

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo, contact_repo.clone(), true, vec![blocked_phone], dispatcher);

        sweeper.sweep_once().await.unwrap();

        let contacts = contact_repo.contacts.lock().unwrap();
        assert_eq!(contacts[0].state, ContactState::Skipped);
        assert_eq!(contacts[0].last_result.as_deref(), Some("BLACKLISTED"));
    }

    #[tokio::test]
    async fn campaign_with_no_pending_or_dialing_contacts_is_completed() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        contact_repo.contacts.lock().unwrap().push(sample_contact(1, ContactState::Completed));

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo.clone(), contact_repo.clone(), true, vec![], dispatcher);

        sweeper.sweep_once().await.unwrap();

        let set_states = campaign_repo.set_states.lock().unwrap();
        assert_eq!(set_states.last(), Some(&(CampaignId::new(1), CampaignState::Completed)));
    }

    #[tokio::test]
    async fn counters_reflect_terminal_contact_states_after_a_cycle() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        {
            let mut contacts = contact_repo.contacts.lock().unwrap();
            contacts.push(sample_contact(1, ContactState::Completed));
            contacts.push(sample_contact(2, ContactState::Failed));
            contacts.push(sample_contact(3, ContactState::Skipped));
            contacts.push(sample_contact(4, ContactState::Pending));
        }

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo.clone(), contact_repo.clone(), true, vec![], dispatcher);

        sweeper.sweep_once().await.unwrap();

        let campaign = campaign_repo.campaigns.lock().unwrap()[0].clone();
        assert_eq!(campaign.total, 4);
        assert_eq!(campaign.succeeded, 1);
        assert_eq!(campaign.failed, 2);
        assert_eq!(campaign.processed, 3);
    }

    #[tokio::test]
    async fn channel_limit_reached_returns_contact_to_pending_not_failed() {
        let campaign_repo = Arc::new(FakeCampaignRepo::default());
        campaign_repo.campaigns.lock().unwrap().push(sample_campaign(CampaignState::Active));
        let contact_repo = Arc::new(FakeContactRepo::default());
        contact_repo.contacts.lock().unwrap().push(sample_contact(1, ContactState::Pending));

        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let dispatcher = build_saturated_dispatcher(call_log_repo, contact_repo.clone());
        let sweeper = build_sweeper(campaign_repo, contact_repo.clone(), true, vec![], dispatcher);

        sweeper.sweep_once().await.unwrap();
        // spawn_dispatch's task needs a tick to run and record the outcome.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(contact_repo.contacts.lock().unwrap()[0].state, ContactState::Pending);
    }
}
