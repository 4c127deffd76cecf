//! Wire framing for the PBX management protocol
//!
//! Each message — outbound action or inbound event — is a set of
//! `Key: Value\r\n` lines terminated by a blank line.

use std::collections::HashMap;
use std::fmt::Write as _;

/// A parsed or about-to-be-sent management message: an ordered bag of
/// key/value fields. Order matters for outbound actions (some PBX
/// implementations are picky about `Action` coming first); inbound
/// messages are looked up by key so order there is incidental.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagementMessage {
    fields: Vec<(String, String)>,
}

impl ManagementMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn action(&self) -> Option<&str> {
        self.get("Action")
    }

    pub fn event(&self) -> Option<&str> {
        self.get("Event")
    }

    /// Serializes to the `Key: Value\r\n...\r\n` wire form, including the
    /// terminating blank line.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        for (k, v) in &self.fields {
            let _ = write!(out, "{k}: {v}\r\n");
        }
        out.push_str("\r\n");
        out
    }

    /// Parses a single message's worth of lines (already split on the
    /// blank-line terminator by the reader).
    pub fn parse(block: &str) -> Option<Self> {
        let mut fields = Vec::new();
        for line in block.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            if let Some((k, v)) = line.split_once(':') {
                fields.push((k.trim().to_string(), v.trim().to_string()));
            }
        }
        if fields.is_empty() {
            None
        } else {
            Some(Self { fields })
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }
}

/// Builds the `Variable` field's comma-joined `key=value` form used by
/// `Originate`.
pub fn join_variables(vars: &HashMap<String, String>) -> String {
    let mut pairs: Vec<String> = vars.iter().map(|(k, v)| format!("{k}={v}")).collect();
    pairs.sort();
    pairs.join(",")
}

/// The three inbound event types the Correlator and Dispatcher subscribe
/// to. Anything else is surfaced as `Other` so a
/// forward-compatible reader never has to special-case unknown events.
#[derive(Debug, PartialEq, Eq)]
pub enum ManagementEvent {
    OriginateResponse {
        action_id: String,
        response: String,
        reason: Option<i32>,
        uniqueid: Option<String>,
    },
    Hangup {
        channel: String,
        uniqueid: String,
        cause: i32,
        cause_txt: Option<String>,
    },
    VarSet {
        variable: String,
        value: String,
        uniqueid: String,
    },
    Other(ManagementMessage),
}

impl ManagementEvent {
    pub fn from_message(msg: ManagementMessage) -> Self {
        match msg.event() {
            Some("Hangup") => {
                let channel = msg.get("Channel").unwrap_or_default().to_string();
                let uniqueid = msg.get("Uniqueid").unwrap_or_default().to_string();
                let cause = msg.get("Cause").and_then(|c| c.parse().ok()).unwrap_or(0);
                let cause_txt = msg.get("Cause-txt").map(str::to_string);
                ManagementEvent::Hangup {
                    channel,
                    uniqueid,
                    cause,
                    cause_txt,
                }
            }
            Some("VarSet") => {
                let variable = msg.get("Variable").unwrap_or_default().to_string();
                let value = msg.get("Value").unwrap_or_default().to_string();
                let uniqueid = msg.get("Uniqueid").unwrap_or_default().to_string();
                ManagementEvent::VarSet {
                    variable,
                    value,
                    uniqueid,
                }
            }
            _ => {
                if msg.action().is_none() {
                    if let Some(response) = msg.get("Response") {
                        if let Some(action_id) = msg.get("ActionID") {
                            return ManagementEvent::OriginateResponse {
                                action_id: action_id.to_string(),
                                response: response.to_string(),
                                reason: msg.get("Reason").and_then(|r| r.parse().ok()),
                                uniqueid: msg.get("Uniqueid").map(str::to_string),
                            };
                        }
                    }
                }
                ManagementEvent::Other(msg)
            }
        }
    }
}
