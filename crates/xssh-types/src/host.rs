use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default SSH port used when a host record does not carry one.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// A host record as produced by the host-configuration store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Short name the user refers to the host by.
    pub alias: String,
    /// Hostname or IP address to dial.
    pub address: String,
    /// Remote login name.
    pub user: String,
    /// SSH port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Private key used for public-key authentication, if any.
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Host {
    pub fn new(alias: impl Into<String>, address: impl Into<String>, user: impl Into<String>, port: u16) -> Self {
        Self {
            alias: alias.into(),
            address: address.into(),
            user: user.into(),
            port,
            identity_file: None,
        }
    }

    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Identity used to share one transport between sessions: `user@host:port`.
    pub fn transport_key(&self) -> String {
        format!("{}@{}:{}", self.user, self.address, self.port)
    }
}
