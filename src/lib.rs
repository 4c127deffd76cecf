//! dialcore - automated outbound calling engine core for a PBX
//!
//! Drives campaign-based outbound dialing against a PBX over either a
//! management-channel or file-spool transport, handles inbound
//! inline-script (AGI-style) sessions for the IVR flow, and reconciles
//! call state from the PBX's asynchronous event stream. See `engine` for
//! the object graph and `domain` for the business rules it enforces.

pub mod config;
pub mod domain;
pub mod engine;
pub mod infrastructure;

pub use domain::shared::error::EngineError;
pub use domain::shared::result::Result;
pub use engine::{BackgroundComponent, DispatchMode, Engine, EngineConfig, EngineHandle, Repositories};
