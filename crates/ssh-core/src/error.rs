use thiserror::Error;

/// Errors that can occur in the forwarding engine
#[derive(Error, Debug)]
pub enum SshCoreError {
    /// A session with the same rule id is already registered
    #[error("forwarding session {0} already exists")]
    SessionExists(String),

    /// No session registered under the given id
    #[error("forwarding session {0} not found")]
    SessionNotFound(String),

    /// Invalid port number
    #[error("port must be a valid number between 0-65535: {0}")]
    InvalidPort(String),

    /// Invalid forwarding specification
    #[error("invalid {kind} forward spec: {message}")]
    InvalidForwardSpec { kind: String, message: String },

    /// Empty value where one is required
    #[error("{field} must not be empty")]
    EmptyValue { field: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SSH protocol error
    #[error("SSH protocol error: {0}")]
    Ssh(#[from] russh::Error),

    /// Network binding failed
    #[error("failed to listen on {address}: {source}")]
    BindFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection failed
    #[error("failed to connect to {address}: {source}")]
    ConnectionFailed {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The server rejected every authentication attempt
    #[error("authentication failed for {target}: {message}")]
    AuthFailed { target: String, message: String },

    /// Private key could not be read or decoded
    #[error("failed to load private key: {0}")]
    Key(String),

    /// Malformed or unsupported SOCKS5 exchange
    #[error("SOCKS5 handshake failed: {0}")]
    Socks(String),

    /// SOCKS5 address type other than IPv4 or domain name
    #[error("unsupported SOCKS5 address type 0x{0:02x}")]
    UnsupportedAddressType(u8),

    /// Remote listener was cancelled or its transport went away
    #[error("remote listener {0} closed")]
    ListenerClosed(String),

    /// Operation did not finish within its deadline
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for forwarding engine operations
pub type SshResult<T> = Result<T, SshCoreError>;

impl SshCoreError {
    /// Create an invalid forward spec error
    pub fn invalid_forward(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidForwardSpec {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an empty value error
    pub fn empty(field: impl Into<String>) -> Self {
        Self::EmptyValue { field: field.into() }
    }

    pub fn socks(message: impl Into<String>) -> Self {
        Self::Socks(message.into())
    }
}
