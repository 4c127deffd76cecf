//! The PBX inline-script (AGI-style) protocol server

pub mod protocol;
pub mod server;

pub use protocol::{AgiSession, DigitResult};
pub use server::{AgiHandler, AgiServer};
