//! Error types for ProofNest.
//!
//! Every failure is a variant of [`LedgerError`], so call sites can catch
//! coarsely (`Result<T>`) or match on a single kind. Variants raised by the
//! chain and verifier always name the record index involved.
//! Private key material is never included in error messages.

/// Coarse classification of a [`LedgerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    TimestampViolation,
    ChainIntegrity,
    Signature,
    Identity,
    Anchor,
    Range,
    Storage,
    Config,
}

/// Ledger error types covering all operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Timestamp violation at index {index}: {attempted} is not after {previous}")]
    TimestampViolation {
        index: u64,
        previous: u64,
        attempted: u64,
    },

    #[error("Chain integrity violated at index {index}: {reason}")]
    ChainIntegrity { index: u64, reason: String },

    #[error("Signature error at index {index} ({scheme}): {reason}")]
    Signature {
        index: u64,
        scheme: String,
        reason: String,
    },

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Signer {signer} does not own chain of {owner}")]
    OwnerMismatch { owner: String, signer: String },

    #[error("Invalid agent name: {0}")]
    InvalidAgentName(String),

    #[error("Invalid decision payload: {0}")]
    InvalidPayload(String),

    #[error("Anchor submission failed: {0}")]
    AnchorSubmission(String),

    #[error("Anchoring method '{method}' is not implemented; use OPENTIMESTAMPS")]
    AnchorNotImplemented { method: String },

    #[error("Invalid anchor state: {0}")]
    AnchorState(String),

    #[error("Anchor polling cancelled")]
    Cancelled,

    #[error("Anchor polling timed out after {0} seconds")]
    Timeout(u64),

    #[error("Range [{start}, {end}] out of bounds for chain of length {len}")]
    Range { start: u64, end: u64, len: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    #[error("Unsupported format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("Invalid passphrase")]
    InvalidPassphrase,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// Return the coarse class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TimestampViolation { .. } => ErrorKind::TimestampViolation,
            Self::ChainIntegrity { .. } => ErrorKind::ChainIntegrity,
            Self::Signature { .. } => ErrorKind::Signature,
            Self::KeyGeneration(_)
            | Self::Signing(_)
            | Self::InvalidKey(_)
            | Self::OwnerMismatch { .. }
            | Self::InvalidAgentName(_)
            | Self::InvalidPayload(_) => ErrorKind::Identity,
            Self::AnchorSubmission(_)
            | Self::AnchorNotImplemented { .. }
            | Self::AnchorState(_)
            | Self::Cancelled
            | Self::Timeout(_) => ErrorKind::Anchor,
            Self::Range { .. } => ErrorKind::Range,
            Self::Config(_) => ErrorKind::Config,
            Self::NotFound(_)
            | Self::Serialization(_)
            | Self::InvalidFileFormat(_)
            | Self::UnsupportedVersion { .. }
            | Self::InvalidPassphrase
            | Self::DerivationFailed(_)
            | Self::EncryptionFailed(_)
            | Self::DecryptionFailed(_)
            | Self::Io(_) => ErrorKind::Storage,
        }
    }

    /// Whether a caller may retry the failed operation with backoff.
    ///
    /// Only anchor transport failures qualify; "not implemented" never does.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AnchorSubmission(_))
    }

    /// Record index named by this error, if any.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::TimestampViolation { index, .. }
            | Self::ChainIntegrity { index, .. }
            | Self::Signature { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, LedgerError>;
