//! Log Batcher
//!
//! Coalesces high-frequency CallLog updates into amortized bulk SQL
//! writes. A single consumer drains a bounded queue, flushing on a
//! 1000-item threshold or a 500ms timer, whichever comes first.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::call_log::{CallLogRepository, CallLogUpdate};
use crate::domain::shared::CallLogId;
use crate::domain::contact::{ContactRepository, ContactState};

const QUEUE_CAPACITY: usize = 5000;
const FLUSH_THRESHOLD: usize = 1000;
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

pub struct LogBatcher {
    sender: tokio::sync::mpsc::Sender<CallLogUpdate>,
}

impl LogBatcher {
    /// Spawns the consumer task and returns a handle whose `queue` can be
    /// called from any number of producer tasks. The returned `JoinHandle`
    /// resolves once `stop` is signalled and the final flush completes.
    pub fn spawn(
        call_log_repo: Arc<dyn CallLogRepository>,
        contact_repo: Arc<dyn ContactRepository>,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> (Self, tokio::task::JoinHandle<()>) {
        let (tx, rx) = tokio::sync::mpsc::channel(QUEUE_CAPACITY);
        let handle = tokio::spawn(run(rx, call_log_repo, contact_repo, stop));
        (Self { sender: tx }, handle)
    }

    /// Non-blocking; drops and logs a warning if the queue is full.
    pub fn queue(&self, update: CallLogUpdate) {
        if let Err(e) = self.sender.try_send(update) {
            warn!("log batcher queue full, dropping update: {e}");
        }
    }
}

async fn run(
    mut rx: tokio::sync::mpsc::Receiver<CallLogUpdate>,
    call_log_repo: Arc<dyn CallLogRepository>,
    contact_repo: Arc<dyn ContactRepository>,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    let mut buffer = Vec::with_capacity(FLUSH_THRESHOLD);
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    flush(&mut buffer, &call_log_repo, &contact_repo).await;
                    // Drain whatever arrived between the stop signal and now.
                    while let Ok(update) = rx.try_recv() {
                        buffer.push(update);
                    }
                    flush(&mut buffer, &call_log_repo, &contact_repo).await;
                    info!("log batcher stopped");
                    return;
                }
            }
            _ = ticker.tick() => {
                flush(&mut buffer, &call_log_repo, &contact_repo).await;
            }
            maybe_update = rx.recv() => {
                match maybe_update {
                    Some(update) => {
                        buffer.push(update);
                        if buffer.len() >= FLUSH_THRESHOLD {
                            flush(&mut buffer, &call_log_repo, &contact_repo).await;
                        }
                    }
                    None => {
                        flush(&mut buffer, &call_log_repo, &contact_repo).await;
                        info!("log batcher channel closed");
                        return;
                    }
                }
            }
        }
    }
}

async fn flush(
    buffer: &mut Vec<CallLogUpdate>,
    call_log_repo: &Arc<dyn CallLogRepository>,
    contact_repo: &Arc<dyn ContactRepository>,
) {
    if buffer.is_empty() {
        return;
    }
    let batch = std::mem::take(buffer);

    let terminal_ids: Vec<CallLogId> = match call_log_repo.apply_batch(&batch).await {
        Ok(ids) => ids,
        Err(e) => {
            error!("log batcher flush failed, batch dropped: {e}");
            return;
        }
    };

    project_onto_contacts(terminal_ids, call_log_repo, contact_repo).await;
}

/// The second join-update: for every CallLog that just became terminal,
/// project its disposition onto the owning contact's state.
async fn project_onto_contacts(
    terminal_ids: Vec<CallLogId>,
    call_log_repo: &Arc<dyn CallLogRepository>,
    contact_repo: &Arc<dyn ContactRepository>,
) {
    for id in terminal_ids {
        let log = match call_log_repo.get(id).await {
            Ok(Some(log)) => log,
            Ok(None) => continue,
            Err(e) => {
                error!("log batcher could not re-read call log {id} for contact projection: {e}");
                continue;
            }
        };
        let (Some(contact_id), Some(disposition)) = (log.contact_id, log.disposition) else {
            continue;
        };
        let state = disposition.contact_state();
        if let Err(e) = contact_repo.mark_terminal(contact_id, state, disposition.as_str()).await {
            error!("log batcher failed to project contact state for contact {contact_id}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call_log::{CallLog, CallStatus, Disposition};
    use crate::domain::contact::Contact;
    use crate::domain::shared::{CampaignId, ContactId, ProjectId, Result};
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
        async fn apply_if_dialing(&self, _update: &CallLogUpdate) -> Result<bool> {
            Ok(true)
        }
        async fn apply(&self, update: &CallLogUpdate) -> Result<()> {
            let mut logs = self.logs.lock().unwrap();
            if let Some(log) = logs.iter_mut().find(|l| l.id == update.id) {
                if let Some(s) = update.status {
                    log.status = s;
                }
                if let Some(d) = update.disposition {
                    log.disposition = Some(d);
                }
            }
            Ok(())
        }
        async fn find_by_pbx_unique_id(&self, _pbx_unique_id: &str) -> Result<Option<CallLog>> {
            Ok(None)
        }
        async fn apply_batch(&self, updates: &[CallLogUpdate]) -> Result<Vec<CallLogId>> {
            let mut logs = self.logs.lock().unwrap();
            let mut terminal = vec![];
            for update in updates {
                if let Some(log) = logs.iter_mut().find(|l| l.id == update.id) {
                    if let Some(s) = update.status {
                        log.status = s;
                    }
                    if let Some(d) = update.disposition {
                        log.disposition = Some(d);
                    }
                    if let Some(i) = update.interacted {
                        log.interacted = i;
                    }
                    if let Some(digit) = update.dtmf_digit {
                        log.dtmf_digit = Some(digit);
                    }
                    if log.status.is_terminal() {
                        terminal.push(log.id);
                    }
                }
            }
            Ok(terminal)
        }
        async fn complete_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<CallLogId>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct FakeContactRepo {
        marked: Mutex<Vec<(ContactId, ContactState)>>,
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
        async fn mark_terminal(&self, id: ContactId, state: ContactState, _result: &str) -> Result<()> {
            self.marked.lock().unwrap().push((id, state));
            Ok(())
        }
        async fn mark_pending(&self, _id: ContactId) -> Result<()> {
            Ok(())
        }
        async fn bulk_fail_stale_dialing(&self, _max_age: chrono::Duration) -> Result<Vec<ContactId>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn flush_projects_terminal_dispositions_onto_contacts() {
        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let contact_repo = Arc::new(FakeContactRepo::default());

        let mut log = CallLog::new_dialing(CallLogId::new(1), ProjectId::new(1), None, Some(ContactId::new(7)), "573000".to_string(), "555".to_string());
        log.status = CallStatus::Dialing;
        call_log_repo.insert(&log).await.unwrap();

        let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let (batcher, handle) = LogBatcher::spawn(call_log_repo.clone(), contact_repo.clone(), stop_rx.clone());

        let mut update = CallLogUpdate::new(CallLogId::new(1));
        update.status = Some(CallStatus::Completed);
        update.disposition = Some(Disposition::A);
        batcher.queue(update);

        tokio::time::sleep(Duration::from_millis(600)).await;

        let marked = contact_repo.marked.lock().unwrap();
        assert_eq!(marked.len(), 1);
        assert_eq!(marked[0], (ContactId::new(7), ContactState::Completed));

        handle.abort();
    }

    #[tokio::test]
    async fn queue_drops_silently_past_capacity_without_panicking() {
        let call_log_repo = Arc::new(FakeCallLogRepo::default());
        let contact_repo = Arc::new(FakeContactRepo::default());
        let (_stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        let (batcher, handle) = LogBatcher::spawn(call_log_repo, contact_repo, stop_rx);

        for i in 0..(QUEUE_CAPACITY + 50) {
            batcher.queue(CallLogUpdate::new(CallLogId::new(i as i64)));
        }

        handle.abort();
    }
}
