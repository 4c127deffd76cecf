//! Blacklist domain model
//!
//! A (project, phone) pair with an optional reason, unique per project.
//! Consulted by the Sweeper before a contact is handed to the Dispatcher.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{BlacklistId, ProjectId, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub id: BlacklistId,
    pub project_id: ProjectId,
    pub phone: String,
    pub reason: Option<String>,
}

#[async_trait]
pub trait BlacklistRepository: Send + Sync {
    async fn is_blacklisted(&self, project_id: ProjectId, phone: &str) -> Result<bool>;
}
