//! Trunk domain model
//!
//! The core only needs the trunk's name; host and credential details are
//! the PBX's concern and never cross into the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Result, TrunkName};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trunk {
    pub name: TrunkName,
}

#[async_trait]
pub trait TrunkRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<Trunk>>;
    async fn exists(&self, name: &TrunkName) -> Result<bool>;
}
