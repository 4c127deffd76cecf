//! Active Call Tracker: in-memory index of calls in flight
//!
//! A single reader-writer lock guards both the by-uuid map and the alias
//! map together. `remove` walks the alias map linearly — alias
//! cardinality per call is at most one in practice, so this never shows up
//! as a hot path.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::active_call::ActiveCall;
use crate::domain::shared::{CallUuid, CampaignId, PbxUniqueId, TrunkName};

#[derive(Default)]
struct TrackerInner {
    by_uuid: HashMap<CallUuid, ActiveCall>,
    alias: HashMap<PbxUniqueId, CallUuid>,
}

pub struct ActiveCallTracker {
    inner: RwLock<TrackerInner>,
}

impl ActiveCallTracker {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TrackerInner::default()),
        }
    }

    pub async fn add(&self, call: ActiveCall) {
        let mut inner = self.inner.write().await;
        inner.by_uuid.insert(call.uuid, call);
    }

    /// Registers a PBX-assigned id after the PBX reports it, per the
    /// `VarSet`-planted alias.
    pub async fn add_alias(&self, alias: PbxUniqueId, uuid: CallUuid) {
        let mut inner = self.inner.write().await;
        inner.alias.insert(alias, uuid);
    }

    pub async fn get(&self, uuid: CallUuid) -> Option<ActiveCall> {
        self.inner.read().await.by_uuid.get(&uuid).cloned()
    }

    pub async fn get_by_alias(&self, alias: &PbxUniqueId) -> Option<ActiveCall> {
        let inner = self.inner.read().await;
        let uuid = inner.alias.get(alias)?;
        inner.by_uuid.get(uuid).cloned()
    }

    /// Legacy fallback for event correlation: a call file's unique-id is
    /// not always exactly equal to the PBX's own. Tries the exact alias
    /// first; only falls back to a substring match against tracked aliases
    /// when that misses.
    pub async fn get_by_alias_fuzzy(&self, raw: &str) -> Option<ActiveCall> {
        let inner = self.inner.read().await;
        if let Some(uuid) = inner.alias.get(&PbxUniqueId::new(raw)) {
            return inner.by_uuid.get(uuid).cloned();
        }
        let uuid = inner
            .alias
            .iter()
            .find(|(alias, _)| alias.as_str().contains(raw) || raw.contains(alias.as_str()))
            .map(|(_, uuid)| *uuid)?;
        inner.by_uuid.get(&uuid).cloned()
    }

    /// Removes the call and any aliases pointing to it; returns the
    /// removed record, or `None` if it was already absent.
    pub async fn remove(&self, uuid: CallUuid) -> Option<ActiveCall> {
        let mut inner = self.inner.write().await;
        let removed = inner.by_uuid.remove(&uuid)?;
        inner.alias.retain(|_, v| *v != uuid);
        Some(removed)
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.by_uuid.len()
    }

    pub async fn count_by_trunk(&self) -> HashMap<TrunkName, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for call in inner.by_uuid.values() {
            *counts.entry(call.trunk.clone()).or_insert(0) += 1;
        }
        counts
    }

    pub async fn count_by_campaign(&self) -> HashMap<CampaignId, usize> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for call in inner.by_uuid.values() {
            if let Some(campaign_id) = call.campaign_id {
                *counts.entry(campaign_id).or_insert(0) += 1;
            }
        }
        counts
    }

    pub async fn list(&self) -> Vec<ActiveCall> {
        self.inner.read().await.by_uuid.values().cloned().collect()
    }

    pub async fn stale(&self, max_age: chrono::Duration) -> Vec<ActiveCall> {
        let now: DateTime<Utc> = Utc::now();
        self.inner
            .read()
            .await
            .by_uuid
            .values()
            .filter(|c| c.age(now) > max_age)
            .cloned()
            .collect()
    }
}

impl Default for ActiveCallTracker {
    fn default() -> Self {
        Self::new()
    }
}
