//! Boot-time layered configuration
//!
//! Distinct from the live-reloaded operational keys in
//! `domain::config_store` (`max_cps`, `contacts_per_cycle`,
//! `max_channels`, `max_per_trunk`), which live in the `config` SQL table
//! and are polled every 5s rather than loaded once at startup. This is
//! the classic defaults → TOML file → environment-override layering,
//! built on the `config` crate with `serde` deserialization.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub pbx: PbxConfig,
    pub agi: AgiConfig,
}

/// Admission defaults the Engine seeds its in-memory pool and pacer with
/// at boot. Overridden live by the operational `config` table once
/// running — see `domain::config_store`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub initial_cps: i64,
    pub max_channels_global: i64,
    pub max_channels_per_trunk: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            initial_cps: 10,
            max_channels_global: 500,
            max_channels_per_trunk: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://postgres@localhost/dialcore".to_string(),
            max_connections: 20,
            min_connections: 4,
        }
    }
}

/// Which dispatch transport the Dispatcher is wired to. A deployment
/// picks exactly one, mirroring `engine::DispatchMode`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum PbxConfig {
    Management {
        addr: String,
        username: String,
        secret: String,
        originate_timeout_secs: u64,
    },
    Spool {
        staging_dir: String,
        spool_dir: String,
        extension: String,
        priority: i32,
        max_retries: i32,
        retry_time: i32,
        wait_time: i32,
    },
}

impl Default for PbxConfig {
    fn default() -> Self {
        Self::Spool {
            staging_dir: "/var/spool/dialcore/staging".to_string(),
            spool_dir: "/var/spool/asterisk/outgoing".to_string(),
            extension: "s".to_string(),
            priority: 1,
            max_retries: 0,
            retry_time: 300,
            wait_time: 30,
        }
    }
}

/// Inline-script (AGI-style) inbound server, answering the IVR leg the
/// PBX connects back to after a successful originate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgiConfig {
    pub bind_addr: String,
}

impl Default for AgiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4573".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            pbx: PbxConfig::default(),
            agi: AgiConfig::default(),
        }
    }
}

impl Config {
    /// Layers, in increasing precedence: compiled-in defaults, an
    /// optional `config.toml` in the working directory, then `DIALCORE__`
    /// prefixed environment variables (`DIALCORE__DATABASE__URL`, using
    /// `__` as the nesting separator since section names themselves may
    /// contain underscores).
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&Config::default())?;

        let built = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("DIALCORE").separator("__"))
            .build()?;

        built.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_the_config_crate() {
        let built = config::Config::try_from(&Config::default()).unwrap();
        let parsed: Config = built.try_deserialize().unwrap();
        assert_eq!(parsed.server.initial_cps, 10);
        assert_eq!(parsed.agi.bind_addr, "0.0.0.0:4573");
    }

    #[test]
    fn environment_override_wins_over_defaults() {
        std::env::set_var("DIALCORE_TEST__SERVER__INITIAL_CPS", "25");

        let built = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default()).unwrap())
            .add_source(config::Environment::with_prefix("DIALCORE_TEST").separator("__"))
            .build()
            .unwrap();
        let parsed: Config = built.try_deserialize().unwrap();

        assert_eq!(parsed.server.initial_cps, 25);
        std::env::remove_var("DIALCORE_TEST__SERVER__INITIAL_CPS");
    }
}
