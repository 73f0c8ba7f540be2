//! Shared type definitions for xssh.
//!
//! These types are deliberately free of transport and runtime dependencies so the
//! host store, the command surface, and the monitoring views can all share them
//! with the forwarding engine.

pub mod forwarding;
pub mod host;

pub use forwarding::{ForwardType, ForwardingRule, StatsSnapshot};
pub use host::Host;
