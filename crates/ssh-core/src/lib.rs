pub mod config;
pub mod error;
pub mod forwarding;
pub mod keys;
pub mod transport;

pub use error::{SshCoreError, SshResult};
