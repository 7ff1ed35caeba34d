//! Error types for the local proxy channel

use thiserror::Error;

/// Local channel errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalChannelError {
    /// Channel or pair allocation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// The dial string could not be used
    #[error("Invalid dial string: {0}")]
    InvalidDialString(String),

    /// The endpoint is no longer attached to its pair (normal after hangup)
    #[error("No longer valid: {0}")]
    NoLongerValid(String),

    /// A hangup tore the pair down while a frame was being relayed
    #[error("Local pair was torn down during frame relay")]
    PairGone,

    /// The dialplan has no such extension
    #[error("No such extension/context {exten}@{context}")]
    NoSuchExtension {
        exten: String,
        context: String,
    },

    /// The dialplan refused to start on the outbound channel
    #[error("Unable to start PBX: {0}")]
    PbxStart(String),

    /// A masquerade would have bridged the pair to itself
    #[error("A local channel can not be bridged to itself")]
    SelfBridge,

    /// Lookup failed
    #[error("Not found: {0}")]
    NotFound(String),

    /// Option not handled by this technology
    #[error("Unsupported option: {0}")]
    UnsupportedOption(String),

    /// Operation only valid on the outbound endpoint
    #[error("Not the outbound endpoint: {0}")]
    NotOutbound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bounded backoff loop gave up
    #[error("Lock contention: gave up after {attempts} attempts")]
    LockContention {
        attempts: u32,
    },

    /// Party information could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl LocalChannelError {
    /// Create a new Allocation error
    pub fn allocation<S: Into<String>>(msg: S) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a new NoLongerValid error
    pub fn no_longer_valid<S: Into<String>>(msg: S) -> Self {
        Self::NoLongerValid(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// True for outcomes callers should treat as an ordinary hangup race
    pub fn is_hangup_race(&self) -> bool {
        matches!(self, Self::NoLongerValid(_) | Self::PairGone)
    }
}

impl From<toml::de::Error> for LocalChannelError {
    fn from(e: toml::de::Error) -> Self {
        Self::Config(e.to_string())
    }
}

impl From<bincode::Error> for LocalChannelError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for local channel operations
pub type Result<T> = std::result::Result<T, LocalChannelError>;
