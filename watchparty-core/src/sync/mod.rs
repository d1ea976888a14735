//! Sync Engine
//!
//! Elects a single host, mirrors its transport events to every viewer and
//! routes the late-joiner reconciliation exchange.

mod hub;
mod protocol;
mod state;

pub use hub::*;
pub use protocol::*;
pub use state::*;
