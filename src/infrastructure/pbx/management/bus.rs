//! Event bus fan-out for the management connection
//!
//! One logical reader owns the socket; every other component (the
//! Correlator, the Dispatcher waiting on its action-id) subscribes through
//! here. Each subscriber gets its own lagged-drop queue so a slow
//! subscriber misses its own events instead of lagging — or blocking —
//! everyone else.

use tokio::sync::broadcast;

use super::protocol::ManagementEvent;

const SUBSCRIBER_QUEUE_CAPACITY: usize = 1000;

pub struct EventBus {
    tx: broadcast::Sender<ManagementEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SUBSCRIBER_QUEUE_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagementEvent> {
        self.tx.subscribe()
    }

    /// Fans an event out to every live subscriber. A subscriber whose
    /// queue falls `SUBSCRIBER_QUEUE_CAPACITY` events behind silently
    /// drops the oldest ones on its next `recv` instead of blocking the
    /// publisher or any other subscriber.
    pub fn publish(&self, event: ManagementEvent) {
        // Err here only means there are currently no subscribers, which
        // is routine between a connect and the Correlator's first
        // `subscribe` call.
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ManagementEvent {
    fn clone(&self) -> Self {
        match self {
            ManagementEvent::OriginateResponse {
                action_id,
                response,
                reason,
                uniqueid,
            } => ManagementEvent::OriginateResponse {
                action_id: action_id.clone(),
                response: response.clone(),
                reason: *reason,
                uniqueid: uniqueid.clone(),
            },
            ManagementEvent::Hangup {
                channel,
                uniqueid,
                cause,
                cause_txt,
            } => ManagementEvent::Hangup {
                channel: channel.clone(),
                uniqueid: uniqueid.clone(),
                cause: *cause,
                cause_txt: cause_txt.clone(),
            },
            ManagementEvent::VarSet {
                variable,
                value,
                uniqueid,
            } => ManagementEvent::VarSet {
                variable: variable.clone(),
                value: value.clone(),
                uniqueid: uniqueid.clone(),
            },
            ManagementEvent::Other(msg) => ManagementEvent::Other(msg.clone()),
        }
    }
}
