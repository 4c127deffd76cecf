//! IVR Session Handler
//!
//! One task per accepted inline-script connection (wired by
//! `infrastructure::pbx::agi::AgiServer`). Drives the per-call voice flow:
//! answer, optional answering-machine detection, prompt playback, DTMF
//! collection with retry, then transfer or hangup. Every terminal branch
//! queues its CallLog/contact update through the Log Batcher rather than
//! writing directly, matching the high-frequency write path the rest of
//! the core uses.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::call_log::{CallLog, CallLogRepository, CallLogUpdate, CallStatus, Disposition};
use crate::domain::project::{ProjectRepository, ProjectRepositoryExt};
use crate::domain::shared::{CallLogId, CampaignId, ContactId, ProjectId, Result};
use crate::infrastructure::pbx::agi::{AgiHandler, AgiSession, DigitResult};

use super::batcher::LogBatcher;

const DTMF_ATTEMPTS: u32 = 2;
const DTMF_TIMEOUT_MS: u64 = 10_000;
const PROMPT_INVALID_OPTION: &str = "invalid-option";
const PROMPT_TRANSFER_CONFIRM: &str = "transfer-confirm";

/// Fast AMD tuning: total analysis budget kept at or
/// under ~3s. Values are milliseconds except `max_words`/`silence_threshold`
/// which are counts, matching the pipe-joined parameter contract the PBX's
/// AMD application expects.
const AMD_PARAMS_FAST: &str = "2500|1500|800|3000|100|50|3|256";

pub struct IvrHandler {
    project_repo: Arc<dyn ProjectRepository>,
    call_log_repo: Arc<dyn CallLogRepository>,
    batcher: Arc<LogBatcher>,
}

impl IvrHandler {
    pub fn new(
        project_repo: Arc<dyn ProjectRepository>,
        call_log_repo: Arc<dyn CallLogRepository>,
        batcher: Arc<LogBatcher>,
    ) -> Self {
        Self {
            project_repo,
            call_log_repo,
            batcher,
        }
    }

    async fn run_session(&self, mut session: AgiSession) -> Result<()> {
        let project_id = self.resolve_project_id(&mut session).await?;
        let project = self.project_repo.require(project_id).await?;

        let contact_id = read_optional_id(&mut session, "CONTACT_ID").await.map(ContactId::new);
        let campaign_id = read_optional_id(&mut session, "CAMPAIGN_ID").await.map(CampaignId::new);

        let mut log = self.resolve_call_log(&mut session, &project, contact_id, campaign_id).await?;

        if !session.answer().await.unwrap_or(false) {
            self.finish(&log, CallStatus::Completed, Disposition::Na, false, None);
            return Ok(());
        }

        if project.amd_enabled {
            match run_amd(&mut session).await {
                AmdOutcome::Machine => {
                    let _ = session.hangup().await;
                    self.finish(&log, CallStatus::Completed, Disposition::Am, true, None);
                    return Ok(());
                }
                AmdOutcome::Human | AmdOutcome::NotSure => {
                    log.status = CallStatus::Human;
                    log.disposition = Some(Disposition::A);
                    let mut update = CallLogUpdate::new(log.id);
                    update.status = Some(CallStatus::Human);
                    update.disposition = Some(Disposition::A);
                    self.call_log_repo.apply(&update).await?;
                }
            }
        }

        session.stream_file(&project.prompt_audio).await?;

        self.run_dtmf_loop(&mut session, &project, &log).await?;
        let _ = &mut log;
        Ok(())
    }

    async fn resolve_project_id(&self, session: &mut AgiSession) -> Result<ProjectId> {
        if let Some(arg) = session.preamble.get("arg_1") {
            if let Ok(id) = arg.parse::<i64>() {
                return Ok(ProjectId::new(id));
            }
        }
        let value = session.get_variable("PROJECT_ID").await?;
        value
            .and_then(|v| v.parse::<i64>().ok())
            .map(ProjectId::new)
            .ok_or_else(|| crate::domain::shared::EngineError::ProtocolViolation(
                "could not resolve project id from preamble argument or channel variable".to_string(),
            ))
    }

    async fn resolve_call_log(
        &self,
        session: &mut AgiSession,
        project: &crate::domain::project::Project,
        contact_id: Option<ContactId>,
        campaign_id: Option<CampaignId>,
    ) -> Result<CallLog> {
        if let Some(raw) = session.get_variable("CALL_LOG_ID").await? {
            if let Ok(id) = raw.parse::<i64>() {
                let id = CallLogId::new(id);
                if let Some(mut log) = self.call_log_repo.get(id).await? {
                    log.status = CallStatus::Connected;
                    let mut update = CallLogUpdate::new(id);
                    update.status = Some(CallStatus::Connected);
                    self.call_log_repo.apply(&update).await?;
                    return Ok(log);
                }
            }
        }

        let phone = session
            .preamble
            .get("dnid")
            .or_else(|| session.preamble.get("extension"))
            .cloned()
            .unwrap_or_default();

        let mut log = CallLog::new_dialing(
            CallLogId::new(0),
            project.id,
            campaign_id,
            contact_id,
            phone,
            project.caller_id.clone(),
        );
        log.status = CallStatus::InitiatedLegacy;
        log.pbx_unique_id = session.preamble.get("uniqueid").cloned();
        log.id = self.call_log_repo.insert(&log).await?;
        warn!(project_id = %project.id, "ivr session connected with no pre-created call log, recorded as legacy");
        Ok(log)
    }

    async fn run_dtmf_loop(
        &self,
        session: &mut AgiSession,
        project: &crate::domain::project::Project,
        log: &CallLog,
    ) -> Result<()> {
        for attempt in 0..DTMF_ATTEMPTS {
            let result = session.wait_for_digit(DTMF_TIMEOUT_MS).await?;
            match result {
                DigitResult::Timeout => {
                    if attempt + 1 == DTMF_ATTEMPTS {
                        self.finish(log, CallStatus::Completed, Disposition::N, false, None);
                        return Ok(());
                    }
                    session.stream_file(PROMPT_INVALID_OPTION).await?;
                }
                DigitResult::Digit(d) if d == project.expected_dtmf => {
                    session.stream_file(PROMPT_TRANSFER_CONFIRM).await?;
                    session.set_variable("TRANSFER_CONTEXT", &project.transfer_context).await?;
                    session.set_variable("TRANSFER_EXTENSION", &project.transfer_extension).await?;
                    self.finish(log, CallStatus::Completed, Disposition::Xfer, true, Some(d));
                    return Ok(());
                }
                DigitResult::Digit(d) => {
                    if attempt + 1 == DTMF_ATTEMPTS {
                        self.finish(log, CallStatus::Completed, Disposition::N, true, Some(d));
                        return Ok(());
                    }
                    session.stream_file(PROMPT_INVALID_OPTION).await?;
                }
            }
        }
        Ok(())
    }

    fn finish(&self, log: &CallLog, status: CallStatus, disposition: Disposition, interacted: bool, digit: Option<char>) {
        let mut update = CallLogUpdate::new(log.id);
        update.status = Some(status);
        update.disposition = Some(disposition);
        update.interacted = Some(interacted);
        update.dtmf_digit = digit;
        self.batcher.queue(update);
    }
}

async fn read_optional_id(session: &mut AgiSession, variable: &str) -> Option<i64> {
    session
        .get_variable(variable)
        .await
        .ok()
        .flatten()
        .and_then(|v| v.parse::<i64>().ok())
}

enum AmdOutcome {
    Machine,
    Human,
    NotSure,
}

async fn run_amd(session: &mut AgiSession) -> AmdOutcome {
    if let Err(e) = session.exec("AMD", AMD_PARAMS_FAST).await {
        warn!("amd invocation failed, treating as uncertain: {e}");
        return AmdOutcome::NotSure;
    }
    match session.get_variable("AMDSTATUS").await {
        Ok(Some(status)) if status.eq_ignore_ascii_case("MACHINE") => AmdOutcome::Machine,
        Ok(Some(status)) if status.eq_ignore_ascii_case("HUMAN") => AmdOutcome::Human,
        _ => AmdOutcome::NotSure,
    }
}

#[async_trait]
impl AgiHandler for IvrHandler {
    async fn handle(&self, session: AgiSession) {
        if let Err(e) = self.run_session(session).await {
            warn!("ivr session ended with a protocol error: {e}");
        } else {
            info!("ivr session completed");
        }
    }
}
