//! Structured verification results.

use serde::Serialize;

use crate::anchor::record::{AnchorRange, AnchorStatus};
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};
use crate::identity::Did;

/// One problem found by the verifier.
///
/// Record issues carry the index they were found at; anchor issues carry
/// the anchor's range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationIssue {
    IndexGap {
        index: u64,
        expected: u64,
    },
    SelfHashMismatch {
        index: u64,
        stored: Hash256,
        computed: Hash256,
    },
    BrokenLink {
        index: u64,
        previous_hash: Hash256,
        expected: Hash256,
    },
    ForeignAuthor {
        index: u64,
        agent: Did,
    },
    TimestampNotIncreasing {
        index: u64,
        previous: u64,
        timestamp: u64,
    },
    MissingSignature {
        index: u64,
        scheme: String,
    },
    InvalidSignature {
        index: u64,
        scheme: String,
        reason: String,
    },
    UnknownScheme {
        index: u64,
        scheme: String,
    },
    UndeclaredKey {
        index: u64,
        scheme: String,
    },
    AnchorFormat {
        range: AnchorRange,
        reason: String,
    },
    AnchorInclusion {
        range: AnchorRange,
        index: u64,
        reason: String,
    },
    AnchorNetwork {
        range: AnchorRange,
        reason: String,
    },
}

impl VerificationIssue {
    /// Record index the issue names. Only inclusion failures name one for
    /// anchor issues.
    pub fn index(&self) -> Option<u64> {
        match self {
            Self::IndexGap { index, .. }
            | Self::SelfHashMismatch { index, .. }
            | Self::BrokenLink { index, .. }
            | Self::ForeignAuthor { index, .. }
            | Self::TimestampNotIncreasing { index, .. }
            | Self::MissingSignature { index, .. }
            | Self::InvalidSignature { index, .. }
            | Self::UnknownScheme { index, .. }
            | Self::UndeclaredKey { index, .. }
            | Self::AnchorInclusion { index, .. } => Some(*index),
            Self::AnchorFormat { .. } | Self::AnchorNetwork { .. } => None,
        }
    }

    pub fn is_anchor_issue(&self) -> bool {
        matches!(
            self,
            Self::AnchorFormat { .. } | Self::AnchorInclusion { .. } | Self::AnchorNetwork { .. }
        )
    }

    /// The error this issue corresponds to.
    pub fn to_error(&self) -> LedgerError {
        match self {
            Self::IndexGap { index, expected } => LedgerError::ChainIntegrity {
                index: *index,
                reason: format!("expected index {expected}"),
            },
            Self::SelfHashMismatch {
                index,
                stored,
                computed,
            } => LedgerError::ChainIntegrity {
                index: *index,
                reason: format!("self_hash {stored} does not match recomputed {computed}"),
            },
            Self::BrokenLink {
                index,
                previous_hash,
                expected,
            } => LedgerError::ChainIntegrity {
                index: *index,
                reason: format!("previous_hash {previous_hash} does not link to {expected}"),
            },
            Self::ForeignAuthor { index, agent } => LedgerError::Signature {
                index: *index,
                scheme: "identity".into(),
                reason: format!("record authored by {agent}, not the verifying identity"),
            },
            Self::TimestampNotIncreasing {
                index,
                previous,
                timestamp,
            } => LedgerError::TimestampViolation {
                index: *index,
                previous: *previous,
                attempted: *timestamp,
            },
            Self::MissingSignature { index, scheme } => LedgerError::Signature {
                index: *index,
                scheme: scheme.clone(),
                reason: "mandatory signature missing".into(),
            },
            Self::InvalidSignature {
                index,
                scheme,
                reason,
            } => LedgerError::Signature {
                index: *index,
                scheme: scheme.clone(),
                reason: reason.clone(),
            },
            Self::UnknownScheme { index, scheme } => LedgerError::Signature {
                index: *index,
                scheme: scheme.clone(),
                reason: "unknown signature scheme".into(),
            },
            Self::UndeclaredKey { index, scheme } => LedgerError::Signature {
                index: *index,
                scheme: scheme.clone(),
                reason: "identity declares no key for this scheme".into(),
            },
            Self::AnchorFormat { range, reason } => {
                LedgerError::AnchorState(format!("anchor {range} proof is malformed: {reason}"))
            }
            Self::AnchorInclusion {
                range,
                index,
                reason,
            } => LedgerError::AnchorState(format!(
                "record {index} is not included in anchor {range}: {reason}"
            )),
            Self::AnchorNetwork { range, reason } => {
                LedgerError::AnchorState(format!("anchor {range} rejected by network: {reason}"))
            }
        }
    }
}

impl std::fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_error())
    }
}

/// How much an anchor was actually checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Assurance {
    /// The proof blob is malformed or inclusion failed.
    None,
    /// The proof blob is well-formed; nothing ties the exported records to it.
    FormatOnly,
    /// Exported records are proven to be leaves of the anchored root.
    MerkleInclusion,
    /// As above, and an attested message matched a Bitcoin block header.
    NetworkConfirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorAssessment {
    pub range: AnchorRange,
    pub status: AnchorStatus,
    pub format_valid: bool,
    /// `None` when no inclusion proof covered an exported record.
    pub inclusion: Option<bool>,
    pub assurance: Assurance,
    /// Set whenever no live network lookup confirmed the anchor.
    pub reduced_assurance: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub records_checked: usize,
    pub first_index: Option<u64>,
    pub last_index: Option<u64>,
    pub issues: Vec<VerificationIssue>,
    pub anchors: Vec<AnchorAssessment>,
}

impl VerificationReport {
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn issues_at(&self, index: u64) -> Vec<&VerificationIssue> {
        self.issues
            .iter()
            .filter(|issue| issue.index() == Some(index))
            .collect()
    }

    /// Lowest record index with any issue.
    pub fn first_failing_index(&self) -> Option<u64> {
        self.issues.iter().filter_map(|i| i.index()).min()
    }

    /// The first issue in discovery order, as an error.
    pub fn first_error(&self) -> Option<LedgerError> {
        self.issues.first().map(VerificationIssue::to_error)
    }

    pub fn into_result(self) -> Result<Self> {
        match self.first_error() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}
