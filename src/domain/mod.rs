//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Entities: Project, Trunk, Campaign, Contact, Schedule, BlacklistEntry,
//!   ActiveCall, CallLog, CallerIdPattern
//! - Repository interfaces: ports for persistence, implemented under
//!   `infrastructure::persistence`
//! - Value objects: identifiers and other immutable pieces shared by the
//!   entities above

pub mod active_call;
pub mod blacklist;
pub mod call_log;
pub mod callerid_stats;
pub mod campaign;
pub mod config_store;
pub mod contact;
pub mod project;
pub mod schedule;
pub mod shared;
pub mod trunk;

// Re-export commonly used types
pub use shared::{EngineError, Result};
