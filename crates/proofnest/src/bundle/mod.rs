//! Portable proof bundles for offline, third-party verification.
//!
//! A bundle holds a contiguous record range, the author's public identity
//! and every confirmed anchor overlapping the range, each with Merkle
//! inclusion proofs for the exported records it covers. Serialization is
//! deterministic: export, import and re-export yield identical bytes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::anchor::merkle::MerkleProof;
use crate::anchor::record::AnchorRecord;
use crate::chain::{Chain, DecisionRecord};
use crate::error::{LedgerError, Result};
use crate::identity::AgentIdentity;
use crate::verify::{VerificationReport, Verifier};

/// Current bundle format version.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Inclusion proof of one exported record in an anchored batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordInclusion {
    pub index: u64,
    pub proof: MerkleProof,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundledAnchor {
    pub anchor: AnchorRecord,
    pub inclusion_proofs: Vec<RecordInclusion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    pub format_version: u32,
    pub identity: AgentIdentity,
    pub records: Vec<DecisionRecord>,
    pub anchors: Vec<BundledAnchor>,
}

#[derive(Deserialize)]
struct VersionHeader {
    format_version: Option<u32>,
}

impl ProofBundle {
    /// Export records `[start, end]` of `chain` with their anchor evidence.
    pub fn export(chain: &Chain, start: u64, end: u64) -> Result<Self> {
        let records = chain.range(start, end)?.as_slice().to_vec();
        let anchors = chain.anchor_evidence(start, end)?;
        tracing::debug!(
            start,
            end,
            anchors = anchors.len(),
            "exported proof bundle"
        );
        Ok(Self {
            format_version: BUNDLE_FORMAT_VERSION,
            identity: chain.owner().clone(),
            records,
            anchors,
        })
    }

    /// First and last exported index.
    pub fn range(&self) -> Option<(u64, u64)> {
        Some((self.records.first()?.index(), self.records.last()?.index()))
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a bundle. The version is checked before the body so a newer
    /// format is reported as such rather than as a parse error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header: VersionHeader = serde_json::from_slice(bytes)
            .map_err(|e| LedgerError::InvalidFileFormat(format!("not a proof bundle: {e}")))?;
        match header.format_version {
            Some(BUNDLE_FORMAT_VERSION) => {}
            Some(found) => {
                return Err(LedgerError::UnsupportedVersion {
                    found,
                    expected: BUNDLE_FORMAT_VERSION,
                })
            }
            None => {
                return Err(LedgerError::InvalidFileFormat(
                    "proof bundle has no format_version".into(),
                ))
            }
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(LedgerError::NotFound(path.display().to_string()));
        }
        Self::from_bytes(&std::fs::read(path)?)
    }

    /// Verify offline with the default schemes.
    pub fn verify(&self) -> VerificationReport {
        Verifier::default().verify_bundle(self)
    }
}
