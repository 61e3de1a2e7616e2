//! Error types for the store and configuration layers.

/// Errors raised by the key-value tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvtError {
    /// Parameter names must start with `/`.
    InvalidName(String),
    /// No parameter is stored under the name.
    NotFound(String),
    /// The value cannot be persisted (a string holding a NUL byte).
    InvalidValue(String),
}

impl std::fmt::Display for KvtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid KVT parameter name: {name:?}"),
            Self::NotFound(name) => write!(f, "KVT parameter not found: {name}"),
            Self::InvalidValue(name) => write!(f, "invalid value for KVT parameter {name}"),
        }
    }
}

impl std::error::Error for KvtError {}

/// Errors raised while loading a [`ConfigFile`](crate::config::ConfigFile).
#[derive(Debug)]
pub enum ConfigError {
    /// The document is not valid TOML or does not match the schema.
    Parse(toml::de::Error),
    /// A field has an unacceptable value.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse(err) => write!(f, "config parse error: {err}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        Self::Parse(err)
    }
}

/// Result type for KVT operations.
pub type KvtResult<T> = std::result::Result<T, KvtError>;
