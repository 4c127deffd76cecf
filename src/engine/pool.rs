//! Channel Pool: lock-free global and per-trunk concurrency caps
//!
//! Acquisition is a CAS loop on the global counter, then a CAS loop on the
//! per-trunk counter; a per-trunk failure rolls the global counter back.
//! No lock ever guards both counters at once, which is the point: under
//! contention this never blocks a thread waiting on another trunk.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::warn;

use crate::domain::shared::TrunkName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub active_global: i64,
    pub max_global: i64,
    pub available_global: i64,
}

pub struct ChannelPool {
    max_global: AtomicI64,
    active_global: AtomicI64,
    max_per_trunk: AtomicI64,
    per_trunk: RwLock<HashMap<TrunkName, Arc<AtomicI64>>>,
}

impl ChannelPool {
    pub fn new(max_global: i64, max_per_trunk: i64) -> Self {
        Self {
            max_global: AtomicI64::new(max_global),
            active_global: AtomicI64::new(0),
            max_per_trunk: AtomicI64::new(max_per_trunk),
            per_trunk: RwLock::new(HashMap::new()),
        }
    }

    fn trunk_counter(&self, trunk: &TrunkName) -> Arc<AtomicI64> {
        if let Some(counter) = self.per_trunk.read().unwrap().get(trunk) {
            return counter.clone();
        }
        let mut map = self.per_trunk.write().unwrap();
        map.entry(trunk.clone())
            .or_insert_with(|| Arc::new(AtomicI64::new(0)))
            .clone()
    }

    fn try_increment(counter: &AtomicI64, max: i64) -> bool {
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current >= max {
                return false;
            }
            match counter.compare_exchange_weak(
                current,
                current + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    fn decrement_clamped(counter: &AtomicI64, label: &str) {
        let mut current = counter.load(Ordering::SeqCst);
        loop {
            if current <= 0 {
                if current < 0 {
                    warn!("{label} counter underflowed, clamping to zero");
                    let _ = counter.compare_exchange_weak(current, 0, Ordering::SeqCst, Ordering::SeqCst);
                }
                return;
            }
            match counter.compare_exchange_weak(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    /// Reserves a global slot and a per-trunk slot atomically with respect
    /// to each other's failure modes; returns `false` without side effects
    /// if either cap is saturated.
    pub fn acquire(&self, trunk: &TrunkName) -> bool {
        let max_global = self.max_global.load(Ordering::SeqCst);
        if !Self::try_increment(&self.active_global, max_global) {
            return false;
        }

        let per_trunk_counter = self.trunk_counter(trunk);
        let max_per_trunk = self.max_per_trunk.load(Ordering::SeqCst);
        if Self::try_increment(&per_trunk_counter, max_per_trunk) {
            true
        } else {
            Self::decrement_clamped(&self.active_global, "global");
            false
        }
    }

    pub fn release(&self, trunk: &TrunkName) {
        Self::decrement_clamped(&self.active_global, "global");
        let per_trunk_counter = self.trunk_counter(trunk);
        Self::decrement_clamped(&per_trunk_counter, "per-trunk");
    }

    pub fn stats(&self) -> PoolStats {
        let max_global = self.max_global.load(Ordering::SeqCst);
        let active_global = self.active_global.load(Ordering::SeqCst);
        PoolStats {
            active_global,
            max_global,
            available_global: (max_global - active_global).max(0),
        }
    }

    pub fn set_max_global(&self, n: i64) {
        self.max_global.store(n, Ordering::SeqCst);
    }

    pub fn set_max_per_trunk(&self, n: i64) {
        self.max_per_trunk.store(n, Ordering::SeqCst);
    }
}
