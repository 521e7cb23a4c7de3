//! Immutable decision records and their hash preimage.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash256;
use crate::identity::{Did, SignatureSet};
use crate::time::micros_to_rfc3339;

/// `previous_hash` of the record at index 0.
pub const GENESIS_HASH: Hash256 = Hash256::ZERO;

const RECORD_DOMAIN: &[u8] = b"proofnest/record/v1";

/// Digest of a decision payload.
pub fn content_hash(content: &[u8]) -> Hash256 {
    Hash256::digest(content)
}

/// Compute the self-hash of a record from its linked fields.
///
/// Variable-length fields are length-prefixed so that no two distinct
/// records share a preimage.
pub fn compute_self_hash(
    previous_hash: &Hash256,
    index: u64,
    timestamp: u64,
    content_hash: &Hash256,
    agent: &Did,
    alternatives: &[String],
) -> Hash256 {
    let index_be = index.to_be_bytes();
    let timestamp_be = timestamp.to_be_bytes();
    let agent_len = (agent.as_str().len() as u32).to_be_bytes();
    let alt_count = (alternatives.len() as u32).to_be_bytes();

    let alt_lens: Vec<[u8; 4]> = alternatives
        .iter()
        .map(|a| (a.len() as u32).to_be_bytes())
        .collect();

    let mut parts: Vec<&[u8]> = vec![
        RECORD_DOMAIN,
        previous_hash.as_bytes(),
        &index_be,
        &timestamp_be,
        content_hash.as_bytes(),
        &agent_len,
        agent.as_str().as_bytes(),
        &alt_count,
    ];
    for (alt, len) in alternatives.iter().zip(&alt_lens) {
        parts.push(len);
        parts.push(alt.as_bytes());
    }
    Hash256::digest_parts(&parts)
}

/// One signed, hash-linked entry in a chain.
///
/// Records have no setters. They are built once by `Chain::append` (or read
/// back from storage or a bundle) and are only ever inspected afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    index: u64,
    timestamp: u64,
    agent: Did,
    content_hash: Hash256,
    previous_hash: Hash256,
    self_hash: Hash256,
    signatures: SignatureSet,
    alternatives: Vec<String>,
}

impl DecisionRecord {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        index: u64,
        timestamp: u64,
        agent: Did,
        content_hash: Hash256,
        previous_hash: Hash256,
        self_hash: Hash256,
        signatures: SignatureSet,
        alternatives: Vec<String>,
    ) -> Self {
        Self {
            index,
            timestamp,
            agent,
            content_hash,
            previous_hash,
            self_hash,
            signatures,
            alternatives,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    /// Microseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn timestamp_rfc3339(&self) -> String {
        micros_to_rfc3339(self.timestamp)
    }

    pub fn agent(&self) -> &Did {
        &self.agent
    }

    pub fn content_hash(&self) -> &Hash256 {
        &self.content_hash
    }

    pub fn previous_hash(&self) -> &Hash256 {
        &self.previous_hash
    }

    /// The stored self-hash. Use [`recomputed_self_hash`](Self::recomputed_self_hash)
    /// to check it.
    pub fn self_hash(&self) -> &Hash256 {
        &self.self_hash
    }

    pub fn signatures(&self) -> &SignatureSet {
        &self.signatures
    }

    pub fn alternatives(&self) -> &[String] {
        &self.alternatives
    }

    /// Re-derive the self-hash from the record's other fields.
    pub fn recomputed_self_hash(&self) -> Hash256 {
        compute_self_hash(
            &self.previous_hash,
            self.index,
            self.timestamp,
            &self.content_hash,
            &self.agent,
            &self.alternatives,
        )
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }
}
