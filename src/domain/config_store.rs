//! Operational configuration keys
//!
//! The `config` SQL table's key/value/description rows consumed by the
//! core at runtime: `max_cps`, `contacts_per_cycle`, `max_channels`,
//! `max_per_trunk`. Distinct from the boot-time layered config in
//! `crate::config` — these are re-read every 5 s so operators can retune
//! live without a restart.

use async_trait::async_trait;

use crate::domain::shared::Result;

pub const KEY_MAX_CPS: &str = "max_cps";
pub const KEY_CONTACTS_PER_CYCLE: &str = "contacts_per_cycle";
pub const KEY_MAX_CHANNELS: &str = "max_channels";
pub const KEY_MAX_PER_TRUNK: &str = "max_per_trunk";

#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get_int(&self, key: &str) -> Result<Option<i64>>;
}

/// Operational defaults applied when a key is absent from the `config`
/// table (a fresh install, or an operator who hasn't set it yet).
#[derive(Debug, Clone, Copy)]
pub struct OperationalDefaults {
    pub max_cps: i64,
    pub contacts_per_cycle: i64,
    pub max_channels: i64,
    pub max_per_trunk: i64,
}

impl Default for OperationalDefaults {
    fn default() -> Self {
        Self {
            max_cps: 10,
            contacts_per_cycle: 100,
            max_channels: 500,
            max_per_trunk: 100,
        }
    }
}
