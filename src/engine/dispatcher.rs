//! Originate Dispatcher
//!
//! Performs a paced, rate-limited, accounted dial: channel acquisition
//! happens before any PBX action, the CallLog row is created in `DIALING`
//! before the PBX is contacted, and the ActiveCall is inserted into the
//! Tracker before the dispatch write so a racing inbound event can never
//! arrive untracked.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::domain::active_call::ActiveCall;
use crate::domain::call_log::{CallLog, CallLogRepository, CallLogUpdate, Disposition};
use crate::domain::callerid_stats::{CallerIdPattern, CallerIdStatsRepository};
use crate::domain::contact::{ContactRepository, ContactState};
use crate::domain::project::Project;
use crate::domain::shared::{CallLogId, CallUuid, CampaignId, ContactId, ProjectId, Result, TrunkName};
use crate::domain::trunk::TrunkRepository;

use super::pool::ChannelPool;
use super::tracker::ActiveCallTracker;

#[derive(Debug, Clone)]
pub struct DialRequest {
    pub project_id: ProjectId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Accepted { uuid: CallUuid, call_log_id: CallLogId },
    ChannelLimitReached,
    Rejected { disposition: &'static str },
}

pub struct DispatchRequest {
    pub uuid: CallUuid,
    pub trunk: TrunkName,
    pub phone: String,
    pub caller_id: String,
    pub project_id: ProjectId,
    pub campaign_id: Option<CampaignId>,
    pub contact_id: Option<ContactId>,
    pub call_log_id: CallLogId,
    pub context: String,
}

pub enum DispatchAcceptance {
    Accepted,
    Rejected { reason_code: i32 },
}

/// Abstracts the two coexisting dispatch mechanisms: a
/// deployment picks file-spool or management-channel mode by choosing
/// which implementation the Dispatcher is wired to.
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAcceptance>;
}

/// Token-bucket-ish pacer: a `tokio::time::interval` gated acquire. The CPS
/// value is re-read every 5s by the Sweeper/Dispatcher's owning engine and
/// swapped in atomically.
pub struct CpsLimiter {
    interval: AsyncMutex<tokio::time::Interval>,
    current_cps: AtomicI64,
}

impl CpsLimiter {
    pub fn new(initial_cps: i64) -> Self {
        Self {
            interval: AsyncMutex::new(Self::build_interval(initial_cps)),
            current_cps: AtomicI64::new(initial_cps),
        }
    }

    fn build_interval(cps: i64) -> tokio::time::Interval {
        let cps = cps.max(1);
        let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / cps as f64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval
    }

    pub async fn acquire(&self) {
        self.interval.lock().await.tick().await;
    }

    /// Stops and replaces the ticker atomically so no call is
    /// double-dispatched mid-swap.
    pub async fn reconfigure(&self, new_cps: i64) {
        if self.current_cps.swap(new_cps, Ordering::SeqCst) != new_cps {
            let mut interval = self.interval.lock().await;
            *interval = Self::build_interval(new_cps);
        }
    }

    pub fn current_cps(&self) -> i64 {
        self.current_cps.load(Ordering::SeqCst)
    }
}

pub struct Dispatcher {
    pool: Arc<ChannelPool>,
    tracker: Arc<ActiveCallTracker>,
    transport: Arc<dyn DispatchTransport>,
    call_log_repo: Arc<dyn CallLogRepository>,
    contact_repo: Arc<dyn ContactRepository>,
    callerid_stats_repo: Arc<dyn CallerIdStatsRepository>,
    trunk_repo: Arc<dyn TrunkRepository>,
    cps_limiter: Arc<CpsLimiter>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<ChannelPool>,
        tracker: Arc<ActiveCallTracker>,
        transport: Arc<dyn DispatchTransport>,
        call_log_repo: Arc<dyn CallLogRepository>,
        contact_repo: Arc<dyn ContactRepository>,
        callerid_stats_repo: Arc<dyn CallerIdStatsRepository>,
        trunk_repo: Arc<dyn TrunkRepository>,
        cps_limiter: Arc<CpsLimiter>,
    ) -> Self {
        Self {
            pool,
            tracker,
            transport,
            call_log_repo,
            contact_repo,
            callerid_stats_repo,
            trunk_repo,
            cps_limiter,
        }
    }

    pub async fn dispatch(&self, project: &Project, request: DialRequest) -> Result<DispatchOutcome> {
        self.cps_limiter.acquire().await;

        let trunk = match project.trunk_names().into_iter().next() {
            Some(t) => t,
            None => {
                warn!("project {} has no outbound trunk configured", project.id);
                return Ok(DispatchOutcome::Rejected { disposition: "FAIL" });
            }
        };

        // The project's trunk list is free text; confirm the PBX still
        // knows this trunk before reserving a channel slot for it, so a
        // decommissioned trunk fails fast instead of occupying the pool.
        if !self.trunk_repo.exists(&trunk).await? {
            warn!(%trunk, "project references a trunk that no longer exists");
            return Ok(DispatchOutcome::Rejected { disposition: "FAIL" });
        }

        if !self.pool.acquire(&trunk) {
            return Ok(DispatchOutcome::ChannelLimitReached);
        }

        let caller_id = select_caller_id(
            project,
            &request.phone,
            &*self.callerid_stats_repo,
            &mut rand::rngs::StdRng::from_entropy(),
        )
        .await;

        let call_log = CallLog::new_dialing(
            CallLogId::new(0),
            project.id,
            request.campaign_id,
            request.contact_id,
            request.phone.clone(),
            caller_id.clone(),
        );
        let call_log_id = self.call_log_repo.insert(&call_log).await?;

        let uuid = CallUuid::new();
        let active_call = ActiveCall {
            uuid,
            pbx_unique_id: None,
            project_id: project.id,
            campaign_id: request.campaign_id,
            contact_id: request.contact_id,
            trunk: trunk.clone(),
            phone: request.phone.clone(),
            caller_id: caller_id.clone(),
            call_log_id,
            started_at: chrono::Utc::now(),
        };
        self.tracker.add(active_call).await;

        let dispatch_request = DispatchRequest {
            uuid,
            trunk: trunk.clone(),
            phone: request.phone.clone(),
            caller_id,
            project_id: project.id,
            campaign_id: request.campaign_id,
            contact_id: request.contact_id,
            call_log_id,
            context: project.transfer_context.clone(),
        };

        match self.transport.dispatch(&dispatch_request).await {
            Ok(DispatchAcceptance::Accepted) => {
                info!(uuid = %uuid, call_log_id = call_log_id.value(), "call accepted by pbx");
                Ok(DispatchOutcome::Accepted { uuid, call_log_id })
            }
            Ok(DispatchAcceptance::Rejected { reason_code }) => {
                self.handle_rejection(&trunk, uuid, call_log_id, request.contact_id, reason_code)
                    .await
            }
            Err(e) => {
                self.handle_rejection(&trunk, uuid, call_log_id, request.contact_id, -1).await?;
                Err(e)
            }
        }
    }

    async fn handle_rejection(
        &self,
        trunk: &TrunkName,
        uuid: CallUuid,
        call_log_id: CallLogId,
        contact_id: Option<ContactId>,
        reason_code: i32,
    ) -> Result<DispatchOutcome> {
        self.pool.release(trunk);
        self.tracker.remove(uuid).await;

        let disposition = Disposition::from_originate_reason(reason_code);
        let mut update = CallLogUpdate::new(call_log_id);
        update.status = Some(crate::domain::call_log::CallStatus::Failed);
        update.disposition = Some(disposition);
        self.call_log_repo.apply(&update).await?;

        if let Some(contact_id) = contact_id {
            // "channel limit" rejections return the contact to `pending` so
            // the sweeper retries it; everything else is terminal `failed`.
            if reason_code == -2 {
                self.contact_repo.mark_pending(contact_id).await?;
            } else {
                self.contact_repo
                    .mark_terminal(contact_id, ContactState::Failed, disposition.as_str())
                    .await?;
            }
        }

        Ok(DispatchOutcome::Rejected {
            disposition: disposition.as_str(),
        })
    }
}

/// Dispatches by placing an `Originate` action over the PBX management
/// connection and waiting synchronously for its correlated response.
pub struct ManagementTransport {
    client: Arc<crate::infrastructure::pbx::management::ManagementClient>,
    timeout: Duration,
}

impl ManagementTransport {
    pub fn new(client: Arc<crate::infrastructure::pbx::management::ManagementClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl DispatchTransport for ManagementTransport {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAcceptance> {
        use crate::infrastructure::pbx::management::OriginateRequest;

        let channel = format!("PJSIP/{}@{}", request.phone, request.trunk);
        let origination = OriginateRequest::new(channel, request.context.clone(), request.caller_id.clone())
            .with_variable("UUID", request.uuid.to_string())
            .with_variable("CALL_LOG_ID", request.call_log_id.value().to_string());

        let outcome = self.client.originate(origination, self.timeout).await?;
        if outcome.success {
            Ok(DispatchAcceptance::Accepted)
        } else {
            Ok(DispatchAcceptance::Rejected {
                reason_code: outcome.reason.unwrap_or(-1),
            })
        }
    }
}

/// Dispatches by writing a call-control file into the PBX's spool
/// directory. There is no synchronous rejection path here: the PBX
/// processes spooled files asynchronously, so every write that succeeds is
/// treated as accepted and any subsequent failure surfaces later through
/// the Event Correlator.
pub struct FileSpoolTransport {
    writer: Arc<crate::infrastructure::pbx::spool::SpoolWriter>,
    max_retries: i32,
    retry_time: i32,
    wait_time: i32,
    extension: String,
    priority: i32,
}

impl FileSpoolTransport {
    pub fn new(
        writer: Arc<crate::infrastructure::pbx::spool::SpoolWriter>,
        max_retries: i32,
        retry_time: i32,
        wait_time: i32,
        extension: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            writer,
            max_retries,
            retry_time,
            wait_time,
            extension: extension.into(),
            priority,
        }
    }
}

#[async_trait]
impl DispatchTransport for FileSpoolTransport {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<DispatchAcceptance> {
        use crate::infrastructure::pbx::spool::CallFile;

        let call = CallFile {
            channel: format!("PJSIP/{}@{}", request.phone, request.trunk),
            caller_id: request.caller_id.clone(),
            max_retries: self.max_retries,
            retry_time: self.retry_time,
            wait_time: self.wait_time,
            context: request.context.clone(),
            extension: self.extension.clone(),
            priority: self.priority,
            set_vars: vec![
                ("UUID".to_string(), request.uuid.to_string()),
                ("CALL_LOG_ID".to_string(), request.call_log_id.value().to_string()),
            ],
        };

        self.writer.write(&call).await?;
        Ok(DispatchAcceptance::Accepted)
    }
}

const EXPLORATION_PROBABILITY: f64 = 0.1;
const MIN_DIGITS_FOR_SMART_CID: usize = 10;

/// Smart caller-ID selection.
pub async fn select_caller_id(
    project: &Project,
    destination: &str,
    stats: &dyn CallerIdStatsRepository,
    rng: &mut impl Rng,
) -> String {
    if !project.smart_cid_enabled || destination.len() < MIN_DIGITS_FOR_SMART_CID {
        return project.caller_id.clone();
    }

    let prefix = &destination[..3];
    let patterns = stats.list_for_prefix(prefix).await.unwrap_or_default();
    if patterns.is_empty() {
        return project.caller_id.clone();
    }

    let chosen = if rng.gen_bool(EXPLORATION_PROBABILITY) {
        patterns.choose(rng)
    } else {
        best_scoring_pattern(&patterns)
    };

    match chosen {
        Some(pattern) => fill_pattern(&pattern.pattern, rng),
        None => project.caller_id.clone(),
    }
}

fn best_scoring_pattern(patterns: &[CallerIdPattern]) -> Option<&CallerIdPattern> {
    patterns
        .iter()
        .filter(|p| p.has_enough_history())
        .max_by(|a, b| a.score().partial_cmp(&b.score()).unwrap_or(std::cmp::Ordering::Equal))
}

fn fill_pattern(pattern: &str, rng: &mut impl Rng) -> String {
    pattern
        .chars()
        .map(|c| {
            if c == 'X' {
                std::char::from_digit(rng.gen_range(0..10), 10).unwrap()
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rand::rngs::mock::StepRng;

    struct FixedStats(Vec<CallerIdPattern>);

    #[async_trait]
    impl CallerIdStatsRepository for FixedStats {
        async fn list_for_prefix(&self, _prefix: &str) -> Result<Vec<CallerIdPattern>> {
            Ok(self.0.clone())
        }
        async fn record_attempt(&self, _prefix: &str, _pattern: &str) -> Result<()> {
            Ok(())
        }
        async fn record_answer(&self, _prefix: &str, _pattern: &str) -> Result<()> {
            Ok(())
        }
    }

    fn project(smart_cid: bool) -> Project {
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
            smart_cid_enabled: smart_cid,
            max_retries: 0,
            retry_time: 0,
            authorized_ips: vec![],
            timezone: "UTC".to_string(),
        }
    }

    #[tokio::test]
    async fn falls_back_to_static_caller_id_when_smart_cid_disabled() {
        let stats = FixedStats(vec![]);
        let mut rng = StepRng::new(0, 1);
        let cid = select_caller_id(&project(false), "5731234567", &stats, &mut rng).await;
        assert_eq!(cid, "5550000000");
    }

    #[tokio::test]
    async fn falls_back_to_static_caller_id_for_short_destinations() {
        let stats = FixedStats(vec![]);
        let mut rng = StepRng::new(0, 1);
        let cid = select_caller_id(&project(true), "12345", &stats, &mut rng).await;
        assert_eq!(cid, "5550000000");
    }

    #[tokio::test]
    async fn falls_back_to_static_caller_id_with_no_patterns() {
        let stats = FixedStats(vec![]);
        let mut rng = StepRng::new(0, 1);
        let cid = select_caller_id(&project(true), "5731234567", &stats, &mut rng).await;
        assert_eq!(cid, "5550000000");
    }

    #[tokio::test]
    async fn picks_highest_scoring_pattern_with_enough_history() {
        let stats = FixedStats(vec![
            CallerIdPattern {
                prefix: "573".to_string(),
                pattern: "573XXXXXX1".to_string(),
                attempts: 20,
                answers: 2,
            },
            CallerIdPattern {
                prefix: "573".to_string(),
                pattern: "573XXXXXX2".to_string(),
                attempts: 20,
                answers: 10,
            },
        ]);
        // StepRng with a large starting value makes gen_bool(0.1) false,
        // exercising the non-exploration branch deterministically.
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        let cid = select_caller_id(&project(true), "5731234567", &stats, &mut rng).await;
        assert!(cid.starts_with("573"));
        assert!(cid.ends_with('2'));
    }

    #[tokio::test]
    async fn ignores_patterns_without_enough_history_outside_exploration() {
        let stats = FixedStats(vec![CallerIdPattern {
            prefix: "573".to_string(),
            pattern: "573XXXXXX9".to_string(),
            attempts: 3,
            answers: 1,
        }]);
        let mut rng = StepRng::new(u64::MAX / 2, 0);
        let cid = select_caller_id(&project(true), "5731234567", &stats, &mut rng).await;
        assert_eq!(cid, "5550000000");
    }

    #[test]
    fn fill_pattern_replaces_placeholders_with_digits() {
        let mut rng = StepRng::new(5, 1);
        let filled = fill_pattern("573XXXXXX1", &mut rng);
        assert_eq!(filled.len(), 10);
        assert!(filled.ends_with('1'));
        assert!(filled.starts_with("573"));
    }

    #[tokio::test]
    async fn cps_limiter_reports_current_rate() {
        let limiter = CpsLimiter::new(10);
        assert_eq!(limiter.current_cps(), 10);
    }
}
