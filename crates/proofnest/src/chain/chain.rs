//! The chain: single-writer, append-only sequence of decision records.
//!
//! `append` either pushes one fully signed record or leaves the chain
//! untouched. Readers (`head`, `range`, verification) take `&self` and so
//! see the chain before or after an append, never in between. Callers that
//! share a chain across threads wrap it in a lock.

use std::sync::Arc;

use crate::anchor::merkle::{self, merkle_root};
use crate::anchor::record::{AnchorRecord, AnchorStatus};
use crate::bundle::{BundledAnchor, RecordInclusion};
use crate::chain::record::{compute_self_hash, content_hash, DecisionRecord, GENESIS_HASH};
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};
use crate::identity::{AgentIdentity, AgentSigner};
use crate::time::{Clock, SystemClock};
use crate::verify::Verifier;

/// The last record of a chain, or the empty state of a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Head<'a> {
    Empty,
    Record(&'a DecisionRecord),
}

impl<'a> Head<'a> {
    /// Hash the next record must link to.
    pub fn hash(&self) -> Hash256 {
        match self {
            Self::Empty => GENESIS_HASH,
            Self::Record(r) => *r.self_hash(),
        }
    }

    pub fn next_index(&self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Record(r) => r.index() + 1,
        }
    }

    pub fn timestamp(&self) -> Option<u64> {
        match self {
            Self::Empty => None,
            Self::Record(r) => Some(r.timestamp()),
        }
    }

    pub fn record(&self) -> Option<&'a DecisionRecord> {
        match self {
            Self::Empty => None,
            Self::Record(r) => Some(r),
        }
    }
}

/// A bounded, restartable view over `[start, end]` of a chain.
///
/// Nothing is copied; each call to [`iter`](Self::iter) starts again from
/// `start`.
#[derive(Debug, Clone, Copy)]
pub struct RecordRange<'a> {
    records: &'a [DecisionRecord],
}

impl<'a> RecordRange<'a> {
    pub fn iter(&self) -> std::slice::Iter<'a, DecisionRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn as_slice(&self) -> &'a [DecisionRecord] {
        self.records
    }
}

impl<'a> IntoIterator for RecordRange<'a> {
    type Item = &'a DecisionRecord;
    type IntoIter = std::slice::Iter<'a, DecisionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

impl<'a, 'r> IntoIterator for &'r RecordRange<'a> {
    type Item = &'a DecisionRecord;
    type IntoIter = std::slice::Iter<'a, DecisionRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// One agent's decision chain plus its anchor log.
#[derive(Clone)]
pub struct Chain {
    owner: AgentIdentity,
    records: Vec<DecisionRecord>,
    anchors: Vec<AnchorRecord>,
    clock: Arc<dyn Clock>,
}

impl Chain {
    /// A new, empty chain owned by `owner`, timestamped by the system clock.
    pub fn new(owner: AgentIdentity) -> Self {
        Self::with_clock(owner, Arc::new(SystemClock::new()))
    }

    pub fn with_clock(owner: AgentIdentity, clock: Arc<dyn Clock>) -> Self {
        Self {
            owner,
            records: Vec::new(),
            anchors: Vec::new(),
            clock,
        }
    }

    /// Rebuild a chain from stored records and anchors.
    ///
    /// The records are fully verified and each anchor goes through the same
    /// checks as [`attach_anchor`](Self::attach_anchor); the first problem
    /// found is returned as an error.
    pub fn from_parts(
        owner: AgentIdentity,
        records: Vec<DecisionRecord>,
        anchors: Vec<AnchorRecord>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if let Some(first) = records.first() {
            if first.index() != 0 {
                return Err(LedgerError::ChainIntegrity {
                    index: first.index(),
                    reason: "stored chain does not start at index 0".into(),
                });
            }
        }
        Verifier::default()
            .verify_records(&owner, &records, &[])
            .into_result()?;

        let mut chain = Self {
            owner,
            records,
            anchors: Vec::new(),
            clock,
        };
        for anchor in anchors {
            chain.attach_anchor(anchor)?;
        }
        Ok(chain)
    }

    pub fn owner(&self) -> &AgentIdentity {
        &self.owner
    }

    /// Append a new record for `content`, signed by `signer`.
    ///
    /// Fails without modifying the chain if the signer is not the owner,
    /// if the clock does not advance past the head's timestamp, or if
    /// signing fails.
    pub fn append(
        &mut self,
        content: &[u8],
        signer: &AgentSigner,
        alternatives: Vec<String>,
    ) -> Result<&DecisionRecord> {
        let record = self.prepare(content, signer, alternatives)?;
        self.commit(record)
    }

    /// Build and sign the next record without adding it.
    ///
    /// Callers that must persist a record before it becomes visible call
    /// this, write the record, then [`commit`](Self::commit) it.
    pub fn prepare(
        &self,
        content: &[u8],
        signer: &AgentSigner,
        alternatives: Vec<String>,
    ) -> Result<DecisionRecord> {
        if signer.identity() != &self.owner {
            return Err(LedgerError::OwnerMismatch {
                owner: self.owner.identifier().to_string(),
                signer: signer.identity().identifier().to_string(),
            });
        }

        let head = self.head();
        let index = head.next_index();
        let previous_hash = head.hash();
        let timestamp = self.clock.now_micros();

        if let Some(previous) = head.timestamp() {
            if timestamp <= previous {
                return Err(LedgerError::TimestampViolation {
                    index,
                    previous,
                    attempted: timestamp,
                });
            }
        }

        let content_hash = content_hash(content);
        let agent = self.owner.identifier().clone();
        let self_hash = compute_self_hash(
            &previous_hash,
            index,
            timestamp,
            &content_hash,
            &agent,
            &alternatives,
        );
        let signatures = signer.sign(&self_hash)?;

        Ok(DecisionRecord::new(
            index,
            timestamp,
            agent,
            content_hash,
            previous_hash,
            self_hash,
            signatures,
            alternatives,
        ))
    }

    /// Add a record from [`prepare`](Self::prepare).
    ///
    /// The record must still extend the current head.
    pub fn commit(&mut self, record: DecisionRecord) -> Result<&DecisionRecord> {
        let head = self.head();
        if record.index() != head.next_index() || record.previous_hash() != &head.hash() {
            return Err(LedgerError::ChainIntegrity {
                index: record.index(),
                reason: format!("record does not extend the head at index {}", head.next_index()),
            });
        }
        tracing::debug!(index = record.index(), hash = %record.self_hash(), "appended decision record");
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    pub fn head(&self) -> Head<'_> {
        match self.records.last() {
            Some(r) => Head::Record(r),
            None => Head::Empty,
        }
    }

    /// Records `[start, end]`, inclusive.
    pub fn range(&self, start: u64, end: u64) -> Result<RecordRange<'_>> {
        self.check_range(start, end)?;
        Ok(RecordRange {
            records: &self.records[start as usize..=end as usize],
        })
    }

    pub fn get(&self, index: u64) -> Option<&DecisionRecord> {
        self.records.get(usize::try_from(index).ok()?)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[DecisionRecord] {
        &self.records
    }

    /// Self-hashes of records `[start, end]`, the leaves of an anchor batch.
    pub fn self_hashes(&self, start: u64, end: u64) -> Result<Vec<Hash256>> {
        Ok(self
            .range(start, end)?
            .iter()
            .map(|r| *r.self_hash())
            .collect())
    }

    fn check_range(&self, start: u64, end: u64) -> Result<()> {
        let len = self.records.len() as u64;
        if start > end || end >= len {
            return Err(LedgerError::Range { start, end, len });
        }
        Ok(())
    }

    // ── Anchor log ──────────────────────────────────────────────────

    /// Attach a confirmed anchor to the log.
    ///
    /// Only `CONFIRMED` anchors whose range lies inside the chain and whose
    /// batch root matches this chain's own self-hashes are accepted.
    pub fn attach_anchor(&mut self, anchor: AnchorRecord) -> Result<()> {
        if anchor.status() != AnchorStatus::Confirmed {
            return Err(LedgerError::AnchorState(format!(
                "only confirmed anchors can be attached (anchor {} is {})",
                anchor.range(),
                anchor.status()
            )));
        }
        let range = anchor.range();
        let root = merkle_root(&self.self_hashes(range.start, range.end)?)?;
        if &root != anchor.batch_root() {
            return Err(LedgerError::AnchorState(format!(
                "anchor {} root {} does not match chain root {}",
                range,
                anchor.batch_root(),
                root
            )));
        }
        if self
            .anchors
            .iter()
            .any(|a| a.range() == range && a.batch_root() == anchor.batch_root())
        {
            return Err(LedgerError::AnchorState(format!(
                "anchor {range} is already attached"
            )));
        }

        tracing::info!(range = %range, root = %root, "attached confirmed anchor");
        self.anchors.push(anchor);
        Ok(())
    }

    pub fn anchors(&self) -> &[AnchorRecord] {
        &self.anchors
    }

    pub fn anchors_overlapping(&self, start: u64, end: u64) -> Vec<&AnchorRecord> {
        self.anchors
            .iter()
            .filter(|a| a.range().overlaps(start, end))
            .collect()
    }

    /// Highest index covered by an attached anchor.
    pub fn last_anchored_index(&self) -> Option<u64> {
        self.anchors.iter().map(|a| a.range().end).max()
    }

    /// Anchors overlapping `[start, end]` with an inclusion proof for every
    /// record of that range they cover.
    pub fn anchor_evidence(&self, start: u64, end: u64) -> Result<Vec<BundledAnchor>> {
        self.check_range(start, end)?;
        self.anchors_overlapping(start, end)
            .into_iter()
            .map(|anchor| self.evidence_for(anchor, start, end))
            .collect()
    }

    /// `anchor` with inclusion proofs for the records of `[start, end]` it
    /// covers. Fails if the anchor's batch is not fully present here.
    pub fn evidence_for(&self, anchor: &AnchorRecord, start: u64, end: u64) -> Result<BundledAnchor> {
        let range = anchor.range();
        let leaves = self.self_hashes(range.start, range.end)?;
        let mut inclusion_proofs = Vec::new();
        for index in range.start.max(start)..=range.end.min(end) {
            let proof = merkle::prove(&leaves, (index - range.start) as usize)?;
            inclusion_proofs.push(RecordInclusion { index, proof });
        }
        Ok(BundledAnchor {
            anchor: anchor.clone(),
            inclusion_proofs,
        })
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("owner", self.owner.identifier())
            .field("len", &self.records.len())
            .field("anchors", &self.anchors.len())
            .finish()
    }
}
