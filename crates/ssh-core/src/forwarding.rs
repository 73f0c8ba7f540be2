//! Port forwarding sessions and their lifecycle.
//!
//! This module provides:
//! - Local TCP forwarding (`-L`)
//! - Remote TCP forwarding (`-R`)
//! - Dynamic SOCKS5 proxies (`-D`)
//! - Per-session traffic statistics
//!
//! The main entry point is [`ForwardingManager`], which owns the session
//! registry and the pool of shared transports.

mod acceptor;
mod dynamic;
mod local;
mod manager;
mod parsing;
mod pump;
mod remote;
mod session;
mod socks;
mod stats;

// Re-export public API
pub use manager::ForwardingManager;
pub use parsing::{DEFAULT_BIND_HOST, parse_forwarding_rule};
pub use pump::{Direction, PumpOutcome, copy_with_stats, pump};
pub use session::ForwardingSession;
pub use socks::{SocksReply, SocksTarget, negotiate, write_reply};
pub use stats::{ConnectionGuard, ForwardingStats};
