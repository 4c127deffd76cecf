//! Project domain model
//!
//! A project is a dialing configuration: caller-id policy, prompt audio,
//! the expected DTMF digit, transfer destination, outbound trunks, and the
//! toggles (AMD, smart-CID) that shape how every call under it is placed.
//! The core treats a project as immutable within the lifetime of a single
//! call; mutation happens externally (the out-of-scope CLI/API layer).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{EngineError, ProjectId, Result, TrunkName};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub caller_id: String,
    pub prompt_audio: String,
    pub expected_dtmf: char,
    pub transfer_context: String,
    pub transfer_extension: String,
    pub trunks: String,
    pub dial_prefix: String,
    pub amd_enabled: bool,
    pub smart_cid_enabled: bool,
    pub max_retries: i32,
    pub retry_time: i32,
    pub authorized_ips: Vec<String>,
    pub timezone: String,
}

impl Project {
    /// The project's outbound trunk list, split from the stored
    /// comma-separated attribute.
    pub fn trunk_names(&self) -> Vec<TrunkName> {
        TrunkName::parse_list(&self.trunks)
    }

    pub fn is_ip_authorized(&self, ip: &str) -> bool {
        self.authorized_ips.is_empty() || self.authorized_ips.iter().any(|a| a == ip)
    }
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn get(&self, id: ProjectId) -> Result<Option<Project>>;
    async fn list_all(&self) -> Result<Vec<Project>>;
}

/// Convenience extension used by components that must treat a missing
/// project as an invariant violation rather than a plain `None`.
#[async_trait]
pub trait ProjectRepositoryExt: ProjectRepository {
    async fn require(&self, id: ProjectId) -> Result<Project> {
        self.get(id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("project {id}")))
    }
}

impl<T: ProjectRepository + ?Sized> ProjectRepositoryExt for T {}
