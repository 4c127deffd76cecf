//! Client for the PBX management TCP connection
//!
//! The write path is serialized by a mutex; the read path is owned
//! exclusively by the reader task spawned in `connect`. Outbound
//! actions that expect a correlated response (`Originate`) register a
//! one-shot waiter keyed by `ActionID` before sending, so the Dispatcher
//! can wait for the corresponding response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::shared::{EngineError, Result};

use super::bus::EventBus;
use super::protocol::{join_variables, ManagementEvent, ManagementMessage};

pub struct OriginateRequest {
    pub action_id: String,
    pub channel: String,
    pub context: String,
    pub caller_id: String,
    pub timeout_ms: u64,
    pub variables: HashMap<String, String>,
}

impl OriginateRequest {
    pub fn new(channel: impl Into<String>, context: impl Into<String>, caller_id: impl Into<String>) -> Self {
        Self {
            action_id: Uuid::new_v4().to_string(),
            channel: channel.into(),
            context: context.into(),
            caller_id: caller_id.into(),
            timeout_ms: 30_000,
            variables: HashMap::new(),
        }
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    fn to_message(&self) -> ManagementMessage {
        ManagementMessage::new()
            .with_field("Action", "Originate")
            .with_field("ActionID", &self.action_id)
            .with_field("Channel", &self.channel)
            .with_field("Context", &self.context)
            .with_field("Exten", "s")
            .with_field("Priority", "1")
            .with_field("CallerID", &self.caller_id)
            .with_field("Timeout", self.timeout_ms.to_string())
            .with_field("Async", "true")
            .with_field("Variable", join_variables(&self.variables))
    }
}

#[derive(Debug, Clone)]
pub struct OriginateOutcome {
    pub success: bool,
    pub reason: Option<i32>,
    pub uniqueid: Option<String>,
}

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<OriginateOutcome>>>>;

pub struct ManagementClient {
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    pending: PendingMap,
    pub bus: Arc<EventBus>,
}

impl ManagementClient {
    /// Connects, logs in, and spawns the reader task. `request_timeout`
    /// bounds how long `originate` waits for the correlated
    /// `OriginateResponse` before reporting a timeout.
    pub async fn connect(
        addr: &str,
        username: &str,
        secret: &str,
        stop: tokio::sync::watch::Receiver<bool>,
    ) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| EngineError::Transient(format!("connecting to PBX management socket: {e}")))?;

        let (read_half, write_half) = stream.into_split();
        let writer = Arc::new(tokio::sync::Mutex::new(write_half));
        let bus = Arc::new(EventBus::new());
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let client = Self {
            writer: writer.clone(),
            pending: pending.clone(),
            bus: bus.clone(),
        };

        client.send(&ManagementMessage::new().with_field("Action", "Login").with_field("Username", username).with_field("Secret", secret)).await?;

        tokio::spawn(reader_loop(read_half, bus, pending, stop));

        Ok(client)
    }

    async fn send(&self, msg: &ManagementMessage) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer
            .write_all(msg.to_wire().as_bytes())
            .await
            .map_err(|e| EngineError::Transient(format!("writing to PBX management socket: {e}")))
    }

    /// Submits an `Originate` action and waits up to `timeout` for its
    /// correlated `OriginateResponse`.
    pub async fn originate(&self, request: OriginateRequest, timeout: Duration) -> Result<OriginateOutcome> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(request.action_id.clone(), tx);

        let message = request.to_message();
        if let Err(e) = self.send(&message).await {
            self.pending.lock().unwrap().remove(&request.action_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => Err(EngineError::Transient("management connection closed while awaiting originate response".to_string())),
            Err(_) => {
                self.pending.lock().unwrap().remove(&request.action_id);
                Err(EngineError::Transient("timed out waiting for originate response".to_string()))
            }
        }
    }

    pub async fn hangup(&self, channel: &str, cause: Option<&str>) -> Result<()> {
        let mut msg = ManagementMessage::new()
            .with_field("Action", "Hangup")
            .with_field("Channel", channel);
        if let Some(cause) = cause {
            msg = msg.with_field("Cause", cause);
        }
        self.send(&msg).await
    }
}

async fn reader_loop(
    read_half: tokio::net::tcp::OwnedReadHalf,
    bus: Arc<EventBus>,
    pending: PendingMap,
    mut stop: tokio::sync::watch::Receiver<bool>,
) {
    let mut reader = BufReader::new(read_half);
    let mut block = String::new();

    loop {
        let mut line = String::new();
        tokio::select! {
            _ = stop.changed() => {
                if *stop.borrow() {
                    info!("management reader stopping");
                    return;
                }
            }
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        warn!("management connection closed by peer");
                        return;
                    }
                    Ok(_) => {
                        if line.trim().is_empty() {
                            if !block.is_empty() {
                                if let Some(msg) = ManagementMessage::parse(&block) {
                                    handle_message(msg, &bus, &pending);
                                }
                                block.clear();
                            }
                        } else {
                            block.push_str(&line);
                        }
                    }
                    Err(e) => {
                        error!("error reading management connection: {e}");
                        return;
                    }
                }
            }
        }
    }
}

fn handle_message(msg: ManagementMessage, bus: &EventBus, pending: &PendingMap) {
    let event = ManagementEvent::from_message(msg);
    if let ManagementEvent::OriginateResponse {
        ref action_id,
        ref response,
        reason,
        ref uniqueid,
    } = event
    {
        if let Some(tx) = pending.lock().unwrap().remove(action_id) {
            let _ = tx.send(OriginateOutcome {
                success: response.eq_ignore_ascii_case("Success"),
                reason,
                uniqueid: uniqueid.clone(),
            });
        }
    }
    debug!(?event, "management event");
    bus.publish(event);
}
