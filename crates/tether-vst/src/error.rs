//! Error types for bank encoding and decoding.

/// Reasons a bank is rejected or cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The chunk does not start with `'CcnK'`.
    BadChunkMagic(u32),
    /// The chunk is shorter than the fixed header or its size field says so.
    TooSmall(usize),
    /// The sub-format magic is not `'FBCh'`.
    BadFormatMagic(u32),
    /// The bank was written by another plugin.
    IdentityMismatch { expected: u32, found: u32 },
    /// The bank was written by a newer plugin version.
    UnsupportedVersion { supported: u32, found: u32 },
    /// Program banks are not supported.
    ProgramsPresent(u32),
    /// A KVT value cannot be persisted.
    InvalidKvtValue(String),
    /// Writing the bank failed.
    Io(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadChunkMagic(magic) => write!(f, "bad chunk magic: 0x{magic:08x}"),
            Self::TooSmall(size) => write!(f, "bank too small: {size} bytes"),
            Self::BadFormatMagic(magic) => write!(f, "bad bank format magic: 0x{magic:08x}"),
            Self::IdentityMismatch { expected, found } => write!(
                f,
                "bank belongs to another plugin: expected 0x{expected:08x}, found 0x{found:08x}"
            ),
            Self::UnsupportedVersion { supported, found } => write!(
                f,
                "bank version {found} is newer than supported version {supported}"
            ),
            Self::ProgramsPresent(count) => write!(f, "bank contains {count} programs"),
            Self::InvalidKvtValue(name) => write!(f, "KVT parameter {name} cannot be saved"),
            Self::Io(msg) => write!(f, "bank write failed: {msg}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<std::io::Error> for StateError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for bank operations.
pub type Result<T> = std::result::Result<T, StateError>;
