//! Anchor records and their lifecycle.
//!
//! An [`AnchorRecord`] is created `PENDING` when a batch is submitted and
//! moves once, to `CONFIRMED` or `FAILED`. Transitions consume the record and
//! refuse to leave a terminal state.

use serde::{Deserialize, Serialize};

use crate::crypto::encoding::base64_bytes;
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};

/// Proof system name for OpenTimestamps blobs.
pub const OTS_SYSTEM: &str = "opentimestamps";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

impl AnchorStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for AnchorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// How a batch root is bound to the external timestamp source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMethod {
    /// OpenTimestamps calendar aggregation into Bitcoin.
    #[default]
    OpenTimestamps,
    /// Direct OP_RETURN embedding. Not implemented: every call fails.
    OpReturn,
}

impl AnchorMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenTimestamps => "opentimestamps",
            Self::OpReturn => "op_return",
        }
    }
}

impl std::fmt::Display for AnchorMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnchorMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "opentimestamps" | "ots" => Ok(Self::OpenTimestamps),
            "op_return" | "opreturn" => Ok(Self::OpReturn),
            other => Err(LedgerError::Config(format!("unknown anchor method: {other}"))),
        }
    }
}

/// Inclusive range of record indices covered by a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnchorRange {
    pub start: u64,
    pub end: u64,
}

impl AnchorRange {
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(LedgerError::AnchorState(format!(
                "anchor range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: u64) -> bool {
        self.start <= index && index <= self.end
    }

    pub fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start <= end && start <= self.end
    }
}

impl std::fmt::Display for AnchorRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Opaque proof material from the anchoring network.
///
/// Being well-formed says nothing about cryptographic inclusion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBlob {
    /// Proof system the bytes are encoded for, e.g. `opentimestamps`.
    pub system: String,
    /// Where the proof came from (calendar URL), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl ProofBlob {
    pub fn opentimestamps(data: Vec<u8>, source: Option<String>) -> Self {
        Self {
            system: OTS_SYSTEM.to_string(),
            source,
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorRecord {
    batch_root: Hash256,
    range: AnchorRange,
    method: AnchorMethod,
    status: AnchorStatus,
    proof_blob: ProofBlob,
    submitted_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    block_height: Option<u64>,
    #[serde(default)]
    poll_attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure: Option<String>,
}

impl AnchorRecord {
    /// A freshly submitted batch.
    pub fn pending(
        batch_root: Hash256,
        range: AnchorRange,
        method: AnchorMethod,
        proof_blob: ProofBlob,
        submitted_at: u64,
    ) -> Self {
        Self {
            batch_root,
            range,
            method,
            status: AnchorStatus::Pending,
            proof_blob,
            submitted_at,
            block_height: None,
            poll_attempts: 0,
            failure: None,
        }
    }

    pub fn batch_root(&self) -> &Hash256 {
        &self.batch_root
    }

    pub fn range(&self) -> AnchorRange {
        self.range
    }

    pub fn method(&self) -> AnchorMethod {
        self.method
    }

    pub fn status(&self) -> AnchorStatus {
        self.status
    }

    pub fn proof_blob(&self) -> &ProofBlob {
        &self.proof_blob
    }

    pub fn submitted_at(&self) -> u64 {
        self.submitted_at
    }

    pub fn block_height(&self) -> Option<u64> {
        self.block_height
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn ensure_pending(&self, transition: &str) -> Result<()> {
        if self.status.is_terminal() {
            return Err(LedgerError::AnchorState(format!(
                "cannot {transition} anchor {} in state {}",
                self.range, self.status
            )));
        }
        Ok(())
    }

    /// PENDING -> CONFIRMED with the final proof material.
    pub(crate) fn confirm(mut self, proof_blob: ProofBlob, block_height: u64) -> Result<Self> {
        self.ensure_pending("confirm")?;
        self.status = AnchorStatus::Confirmed;
        self.proof_blob = proof_blob;
        self.block_height = Some(block_height);
        self.poll_attempts += 1;
        Ok(self)
    }

    /// Record a poll that left the anchor pending, keeping any upgraded proof.
    pub(crate) fn note_poll(mut self, proof_blob: Option<ProofBlob>) -> Result<Self> {
        self.ensure_pending("poll")?;
        if let Some(blob) = proof_blob {
            self.proof_blob = blob;
        }
        self.poll_attempts += 1;
        Ok(self)
    }

    /// PENDING -> FAILED.
    pub(crate) fn fail(mut self, reason: impl Into<String>) -> Result<Self> {
        self.ensure_pending("fail")?;
        self.status = AnchorStatus::Failed;
        self.failure = Some(reason.into());
        Ok(self)
    }
}
