//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Repository implementations backed by Postgres
//! - The PBX management-protocol client and inline-script (AGI) server
//! - The file-spool dispatch mechanism

pub mod pbx;
pub mod persistence;
