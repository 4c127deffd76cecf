//! Orphan Reaper
//!
//! Recovers from undetected call loss (a missed Hangup, an IVR connection
//! drop, a PBX restart) that would otherwise leave a call accounted for
//! forever. Three sweep steps run every 10s; running them twice
//! back-to-back with no new loss produces no additional state changes
//! (reaper idempotence).

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use tracing::{info, warn};

use crate::domain::call_log::{CallLogRepository, CallLogUpdate, CallStatus, Disposition};
use crate::domain::contact::{ContactRepository, ContactState};

use super::pool::ChannelPool;
use super::tracker::ActiveCallTracker;

const IN_MEMORY_STALE_AGE: ChronoDuration = ChronoDuration::seconds(60);
const DIALING_CALL_LOG_MAX_AGE: ChronoDuration = ChronoDuration::minutes(2);

pub struct OrphanReaper {
    tracker: Arc<ActiveCallTracker>,
    pool: Arc<ChannelPool>,
    call_log_repo: Arc<dyn CallLogRepository>,
    contact_repo: Arc<dyn ContactRepository>,
}

impl OrphanReaper {
    pub fn new(
        tracker: Arc<ActiveCallTracker>,
        pool: Arc<ChannelPool>,
        call_log_repo: Arc<dyn CallLogRepository>,
        contact_repo: Arc<dyn ContactRepository>,
    ) -> Self {
        Self {
            tracker,
            pool,
            call_log_repo,
            contact_repo,
        }
    }

    pub async fn run(self: Arc<Self>, mut stop: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        info!("orphan reaper stopping");
                        return;
                    }
                }
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    pub async fn sweep(&self) {
        self.reap_stale_in_memory_calls().await;

        match self.call_log_repo.complete_stale_dialing(DIALING_CALL_LOG_MAX_AGE).await {
            Ok(ids) if !ids.is_empty() => info!(count = ids.len(), "reaper bulk-completed stale DIALING call logs"),
            Ok(_) => {}
            Err(e) => warn!("reaper failed to bulk-complete stale call logs: {e}"),
        }

        if let Err(e) = self.reap_stale_dialing_contacts().await {
            warn!("reaper failed to bulk-fail stale dialing contacts: {e}");
        }
    }

    async fn reap_stale_in_memory_calls(&self) {
        let stale = self.tracker.stale(IN_MEMORY_STALE_AGE).await;
        for call in stale {
            self.tracker.remove(call.uuid).await;
            self.pool.release(&call.trunk);

            let mut update = CallLogUpdate::new(call.call_log_id);
            update.status = Some(CallStatus::Completed);
            update.disposition = Some(Disposition::Na);
            if let Err(e) = self.call_log_repo.apply_if_dialing(&update).await {
                warn!("reaper failed to complete stale call log {}: {e}", call.call_log_id);
            }

            if let Some(contact_id) = call.contact_id {
                if let Err(e) = self
                    .contact_repo
                    .mark_terminal(contact_id, ContactState::Failed, Disposition::Na.as_str())
                    .await
                {
                    warn!("reaper failed to mark contact {contact_id} failed: {e}");
                }
            }
        }
    }

    async fn reap_stale_dialing_contacts(&self) -> crate::domain::shared::Result<()> {
        // Catches a contact left in `dialing` by a dispatch that crashed
        // before it ever produced a CallLog row — the CallLog-keyed sweeps
        // above can't see it since there's no row to key off.
        let ids = self.contact_repo.bulk_fail_stale_dialing(DIALING_CALL_LOG_MAX_AGE).await?;
        if !ids.is_empty() {
            info!(count = ids.len(), "reaper bulk-failed stale DIALING contacts");
        }
        Ok(())
    }
}
