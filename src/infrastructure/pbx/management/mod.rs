//! PBX management protocol: wire framing, event bus, and TCP client

pub mod bus;
pub mod client;
pub mod protocol;

pub use bus::EventBus;
pub use client::{ManagementClient, OriginateOutcome, OriginateRequest};
pub use protocol::{ManagementEvent, ManagementMessage};
