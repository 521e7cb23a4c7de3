//! Merkle batching of record self-hashes.
//!
//! Leaves and inner nodes are domain-separated (`0x00` / `0x01` prefix) so a
//! leaf can never be reinterpreted as an inner node. A level with an odd
//! number of nodes pairs its last node with itself.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};

const LEAF_PREFIX: &[u8] = &[0x00];
const NODE_PREFIX: &[u8] = &[0x01];

pub fn leaf_hash(value: &Hash256) -> Hash256 {
    Hash256::digest_parts(&[LEAF_PREFIX, value.as_bytes()])
}

pub fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    Hash256::digest_parts(&[NODE_PREFIX, left.as_bytes(), right.as_bytes()])
}

fn next_level(level: &[Hash256]) -> Vec<Hash256> {
    level
        .chunks(2)
        .map(|pair| node_hash(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect()
}

/// Merkle root over a non-empty batch of hashes.
pub fn merkle_root(values: &[Hash256]) -> Result<Hash256> {
    if values.is_empty() {
        return Err(LedgerError::AnchorState(
            "cannot build a Merkle root over an empty batch".into(),
        ));
    }
    let mut level: Vec<Hash256> = values.iter().map(leaf_hash).collect();
    while level.len() > 1 {
        level = next_level(&level);
    }
    Ok(level[0])
}

/// Which side of the running hash a sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub side: Side,
    pub hash: Hash256,
}

/// Inclusion proof for one leaf of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub leaf_count: u64,
    pub path: Vec<ProofStep>,
}

/// Build the inclusion proof for `values[index]`.
pub fn prove(values: &[Hash256], index: usize) -> Result<MerkleProof> {
    if index >= values.len() {
        return Err(LedgerError::Range {
            start: index as u64,
            end: index as u64,
            len: values.len() as u64,
        });
    }

    let mut level: Vec<Hash256> = values.iter().map(leaf_hash).collect();
    let mut idx = index;
    let mut path = Vec::new();
    while level.len() > 1 {
        let step = if idx % 2 == 0 {
            let sibling = level.get(idx + 1).copied().unwrap_or(level[idx]);
            ProofStep {
                side: Side::Right,
                hash: sibling,
            }
        } else {
            ProofStep {
                side: Side::Left,
                hash: level[idx - 1],
            }
        };
        path.push(step);
        level = next_level(&level);
        idx /= 2;
    }

    Ok(MerkleProof {
        leaf_index: index as u64,
        leaf_count: values.len() as u64,
        path,
    })
}

impl MerkleProof {
    /// Fold the path over `value` and return the implied root.
    ///
    /// Returns `None` when the path shape is inconsistent with
    /// `leaf_index`/`leaf_count`, including a duplicated-node step whose
    /// sibling differs from the running hash.
    pub fn compute_root(&self, value: &Hash256) -> Option<Hash256> {
        if self.leaf_count == 0 || self.leaf_index >= self.leaf_count {
            return None;
        }

        let mut current = leaf_hash(value);
        let mut idx = self.leaf_index;
        let mut width = self.leaf_count;
        let mut steps = self.path.iter();

        while width > 1 {
            let step = steps.next()?;
            let expected_side = if idx % 2 == 0 { Side::Right } else { Side::Left };
            if step.side != expected_side {
                return None;
            }
            let duplicated = idx % 2 == 0 && idx + 1 == width;
            if duplicated && step.hash != current {
                return None;
            }
            current = match step.side {
                Side::Right => node_hash(&current, &step.hash),
                Side::Left => node_hash(&step.hash, &current),
            };
            idx /= 2;
            width = width.div_ceil(2);
        }

        if steps.next().is_some() {
            return None;
        }
        Some(current)
    }

    pub fn verify(&self, value: &Hash256, root: &Hash256) -> bool {
        self.compute_root(value).as_ref() == Some(root)
    }
}
