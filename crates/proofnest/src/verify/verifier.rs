//! Stateless verification of records, bundles and anchors.
//!
//! Nothing here mutates its input or keeps state between calls, so one
//! `Verifier` can be shared by any number of concurrent readers. Every
//! check runs to completion and reports all issues it finds.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::anchor::blocks::BlockSource;
use crate::anchor::merkle::MerkleProof;
use crate::anchor::network::{AnchorNetwork, NetworkStatus};
use crate::anchor::ots::{self, DetachedProof, ProofSummary};
use crate::anchor::record::{AnchorRecord, AnchorStatus, ProofBlob, OTS_SYSTEM};
use crate::bundle::{BundledAnchor, ProofBundle};
use crate::chain::{Chain, DecisionRecord, GENESIS_HASH};
use crate::crypto::hash::Hash256;
use crate::crypto::signing::{SchemeRegistry, SignatureScheme};
use crate::error::{LedgerError, Result};
use crate::identity::AgentIdentity;
use crate::verify::report::{
    AnchorAssessment, Assurance, VerificationIssue, VerificationReport,
};

pub struct Verifier {
    schemes: SchemeRegistry,
    network: Option<Arc<dyn AnchorNetwork>>,
    blocks: Option<Arc<dyn BlockSource>>,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new(SchemeRegistry::default())
    }
}

impl Verifier {
    pub fn new(schemes: SchemeRegistry) -> Self {
        Self {
            schemes,
            network: None,
            blocks: None,
        }
    }

    /// Let [`verify_online`](Self::verify_online) fetch upgraded proofs.
    pub fn with_network(mut self, network: Arc<dyn AnchorNetwork>) -> Self {
        self.network = Some(network);
        self
    }

    /// Let [`verify_online`](Self::verify_online) check attestations
    /// against Bitcoin block headers.
    pub fn with_block_source(mut self, blocks: Arc<dyn BlockSource>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    // ── Records ──────────────────────────────────────────────────────

    /// Verify a whole chain, including inclusion of every record in the
    /// anchors attached to it.
    pub fn verify_chain(&self, chain: &Chain) -> VerificationReport {
        let mut evidence = Vec::new();
        let mut unassessed = Vec::new();
        if let Some(last) = (chain.len() as u64).checked_sub(1) {
            for anchor in chain.anchors() {
                match chain.evidence_for(anchor, 0, last) {
                    Ok(bundled) => evidence.push(bundled),
                    Err(e) => {
                        warn!(range = %anchor.range(), error = %e, "could not build anchor evidence");
                        unassessed.push(VerificationIssue::AnchorFormat {
                            range: anchor.range(),
                            reason: format!("anchor cannot be assessed against this chain: {e}"),
                        });
                    }
                }
            }
        }
        let mut report = self.verify_records(chain.owner(), chain.records(), &evidence);
        report.issues.extend(unassessed);
        report
    }

    pub fn verify_bundle(&self, bundle: &ProofBundle) -> VerificationReport {
        self.verify_records(&bundle.identity, &bundle.records, &bundle.anchors)
    }

    /// Verify a contiguous run of records claimed to be authored by
    /// `identity`, plus any anchors covering them.
    ///
    /// The run may start mid-chain; only a run starting at index 0 has its
    /// first link checked against the genesis value.
    pub fn verify_records(
        &self,
        identity: &AgentIdentity,
        records: &[DecisionRecord],
        anchors: &[BundledAnchor],
    ) -> VerificationReport {
        let mut report = VerificationReport {
            records_checked: records.len(),
            first_index: records.first().map(|r| r.index()),
            last_index: records.last().map(|r| r.index()),
            ..VerificationReport::default()
        };

        let mut previous: Option<(&DecisionRecord, Hash256)> = None;
        for record in records {
            let computed = record.recomputed_self_hash();
            check_linkage(record, &computed, previous, &mut report.issues);
            if record.agent() != identity.identifier() {
                report.issues.push(VerificationIssue::ForeignAuthor {
                    index: record.index(),
                    agent: record.agent().clone(),
                });
            }
            self.check_signatures(identity, record, &computed, &mut report.issues);
            previous = Some((record, computed));
        }

        for bundled in anchors {
            let assessment = self.assess_anchor(bundled, records, &mut report.issues);
            report.anchors.push(assessment);
        }

        debug!(
            records = report.records_checked,
            anchors = report.anchors.len(),
            issues = report.issues.len(),
            "verification pass complete"
        );
        report
    }

    fn check_signatures(
        &self,
        identity: &AgentIdentity,
        record: &DecisionRecord,
        message: &Hash256,
        issues: &mut Vec<VerificationIssue>,
    ) {
        let index = record.index();
        let mandatory = SignatureScheme::MANDATORY.as_str();
        if !record.signatures().contains(mandatory) {
            issues.push(VerificationIssue::MissingSignature {
                index,
                scheme: mandatory.to_string(),
            });
        }

        for (scheme, signature) in record.signatures().iter() {
            let Some(verifier) = self.schemes.get(scheme) else {
                issues.push(VerificationIssue::UnknownScheme {
                    index,
                    scheme: scheme.to_string(),
                });
                continue;
            };
            let Some(public_key) = identity.public_key_for(scheme) else {
                issues.push(VerificationIssue::UndeclaredKey {
                    index,
                    scheme: scheme.to_string(),
                });
                continue;
            };
            if let Err(failure) = verifier.verify(public_key, message.as_bytes(), signature) {
                issues.push(VerificationIssue::InvalidSignature {
                    index,
                    scheme: scheme.to_string(),
                    reason: failure.to_string(),
                });
            }
        }
    }

    // ── Anchors ──────────────────────────────────────────────────────

    /// Structural validation of an anchor's proof blob.
    ///
    /// This only establishes that the blob is a well-formed proof for its
    /// proof system that commits to this anchor's batch root, and that a
    /// record claiming `CONFIRMED` carries a block attestation. It does NOT
    /// establish that any record is included in the batch, nor that the
    /// attested block exists. Use
    /// [`verify_anchor_inclusion`](Self::verify_anchor_inclusion) and
    /// [`verify_online`](Self::verify_online) for those.
    pub fn validate_anchor_format(&self, anchor: &AnchorRecord) -> Result<ProofSummary> {
        let blob = anchor.proof_blob();
        if blob.system != OTS_SYSTEM {
            return Err(LedgerError::AnchorState(format!(
                "unsupported proof system '{}'",
                blob.system
            )));
        }
        let summary = ots::inspect(&blob.data, &ots::sha256(anchor.batch_root().as_bytes()))?;

        if anchor.status() == AnchorStatus::Confirmed {
            if !summary.has_bitcoin() {
                return Err(LedgerError::AnchorState(
                    "anchor claims CONFIRMED but its proof has no bitcoin attestation".into(),
                ));
            }
            if let Some(height) = anchor.block_height() {
                if !summary.bitcoin_heights.contains(&height) {
                    return Err(LedgerError::AnchorState(format!(
                        "anchor claims block {height} but its proof attests {:?}",
                        summary.bitcoin_heights
                    )));
                }
            }
        }
        Ok(summary)
    }

    /// Check that `record` is the leaf at its position in the anchored batch.
    ///
    /// The leaf value is the record's recomputed self-hash, so a record whose
    /// fields were altered after anchoring fails here as well.
    pub fn verify_anchor_inclusion(
        &self,
        anchor: &AnchorRecord,
        record: &DecisionRecord,
        proof: &MerkleProof,
    ) -> std::result::Result<(), String> {
        let range = anchor.range();
        if !range.contains(record.index()) {
            return Err(format!("record index is outside anchor range {range}"));
        }
        if proof.leaf_count != range.len() {
            return Err(format!(
                "proof is for a batch of {} leaves, anchor covers {}",
                proof.leaf_count,
                range.len()
            ));
        }
        if proof.leaf_index != record.index() - range.start {
            return Err(format!(
                "proof is for leaf {}, record sits at leaf {}",
                proof.leaf_index,
                record.index() - range.start
            ));
        }
        if !proof.verify(&record.recomputed_self_hash(), anchor.batch_root()) {
            return Err("merkle path does not reach the batch root".into());
        }
        Ok(())
    }

    fn assess_anchor(
        &self,
        bundled: &BundledAnchor,
        records: &[DecisionRecord],
        issues: &mut Vec<VerificationIssue>,
    ) -> AnchorAssessment {
        let anchor = &bundled.anchor;
        let range = anchor.range();

        let format_valid = match self.validate_anchor_format(anchor) {
            Ok(_) => true,
            Err(e) => {
                issues.push(VerificationIssue::AnchorFormat {
                    range,
                    reason: e.to_string(),
                });
                false
            }
        };

        let by_index: HashMap<u64, &DecisionRecord> =
            records.iter().map(|r| (r.index(), r)).collect();
        let mut checked = 0usize;
        let mut included = true;
        for inclusion in &bundled.inclusion_proofs {
            let Some(record) = by_index.get(&inclusion.index) else {
                continue;
            };
            checked += 1;
            if let Err(reason) = self.verify_anchor_inclusion(anchor, record, &inclusion.proof) {
                included = false;
                issues.push(VerificationIssue::AnchorInclusion {
                    range,
                    index: inclusion.index,
                    reason,
                });
            }
        }
        let inclusion = (checked > 0).then_some(included);

        let assurance = match (format_valid, inclusion) {
            (false, _) | (_, Some(false)) => Assurance::None,
            (true, None) => Assurance::FormatOnly,
            (true, Some(true)) => Assurance::MerkleInclusion,
        };

        AnchorAssessment {
            range,
            status: anchor.status(),
            format_valid,
            inclusion,
            assurance,
            reduced_assurance: true,
        }
    }

    /// [`verify_bundle`](Self::verify_bundle), then check every anchor that
    /// passed the offline checks against live sources.
    ///
    /// The anchor network, if configured, is asked for a newer proof. The
    /// Bitcoin attestations in the resulting proof are then compared with
    /// the block merkle roots reported by the block source. Only a match
    /// raises an anchor to `NetworkConfirmed`; an attestation that merely
    /// appears inside the proof never does. Without a block source, or
    /// when a lookup fails, the anchor keeps its offline assurance and
    /// stays flagged `reduced_assurance`.
    pub async fn verify_online(&self, bundle: &ProofBundle) -> VerificationReport {
        let mut report = self.verify_bundle(bundle);
        if self.network.is_none() && self.blocks.is_none() {
            debug!("no live sources configured, offline assurance only");
            return report;
        }

        for (assessment, bundled) in report.anchors.iter_mut().zip(&bundle.anchors) {
            if assessment.assurance == Assurance::None {
                continue;
            }
            let anchor = &bundled.anchor;
            let mut blob = anchor.proof_blob().clone();

            if let Some(network) = &self.network {
                match network.status(&blob).await {
                    Ok(NetworkStatus::Confirmed { proof, .. }) => blob = proof,
                    Ok(NetworkStatus::Pending { proof }) => {
                        if assessment.status == AnchorStatus::Confirmed {
                            report.issues.push(VerificationIssue::AnchorNetwork {
                                range: assessment.range,
                                reason: "anchor claims CONFIRMED but the network reports it pending"
                                    .into(),
                            });
                            assessment.assurance = Assurance::None;
                            continue;
                        }
                        blob = proof;
                    }
                    Ok(NetworkStatus::Failed { reason }) => {
                        report.issues.push(VerificationIssue::AnchorNetwork {
                            range: assessment.range,
                            reason,
                        });
                        assessment.assurance = Assurance::None;
                        continue;
                    }
                    Err(e) => {
                        warn!(range = %assessment.range, error = %e, "network lookup failed, using bundled proof");
                    }
                }
            }

            let Some(blocks) = &self.blocks else {
                continue;
            };
            match check_against_blocks(blocks.as_ref(), anchor, &blob).await {
                BlockCheck::Confirmed(block_height) => {
                    debug!(range = %assessment.range, block_height, "anchor matches block header");
                    if assessment.assurance == Assurance::MerkleInclusion {
                        assessment.assurance = Assurance::NetworkConfirmed;
                        assessment.reduced_assurance = false;
                    }
                }
                BlockCheck::Contradicted(reason) => {
                    report.issues.push(VerificationIssue::AnchorNetwork {
                        range: assessment.range,
                        reason,
                    });
                    assessment.assurance = Assurance::None;
                }
                BlockCheck::Unchecked => {}
            }
        }
        report
    }
}

/// Outcome of comparing a proof's Bitcoin attestations with block headers.
enum BlockCheck {
    /// An attested message equals the merkle root of the block at this height.
    Confirmed(u64),
    /// The proof is bad or every attestation disagrees with the chain.
    Contradicted(String),
    /// Nothing to check yet, or no lookup succeeded.
    Unchecked,
}

async fn check_against_blocks(
    blocks: &dyn BlockSource,
    anchor: &AnchorRecord,
    blob: &ProofBlob,
) -> BlockCheck {
    let proof = match DetachedProof::parse(&blob.data) {
        Ok(p) => p,
        Err(e) => return BlockCheck::Contradicted(e.to_string()),
    };
    if proof.digest != ots::sha256(anchor.batch_root().as_bytes()) {
        return BlockCheck::Contradicted("proof does not commit to the anchor's batch root".into());
    }

    let commitments = proof.bitcoin_commitments();
    if commitments.is_empty() {
        return BlockCheck::Unchecked;
    }
    let mut contradictions = Vec::new();
    for (height, message) in commitments {
        match blocks.merkle_root(height).await {
            Ok(Some(root)) if root.as_slice() == message.as_slice() => {
                return BlockCheck::Confirmed(height);
            }
            Ok(Some(_)) => contradictions.push(format!("block {height} has a different merkle root")),
            Ok(None) => contradictions.push(format!("no block at height {height}")),
            Err(e) => warn!(height, error = %e, "block lookup failed"),
        }
    }
    if contradictions.is_empty() {
        BlockCheck::Unchecked
    } else {
        BlockCheck::Contradicted(contradictions.join("; "))
    }
}

fn check_linkage(
    record: &DecisionRecord,
    computed: &Hash256,
    previous: Option<(&DecisionRecord, Hash256)>,
    issues: &mut Vec<VerificationIssue>,
) {
    let index = record.index();
    if computed != record.self_hash() {
        issues.push(VerificationIssue::SelfHashMismatch {
            index,
            stored: *record.self_hash(),
            computed: *computed,
        });
    }

    match previous {
        None => {
            if index == 0 && record.previous_hash() != &GENESIS_HASH {
                issues.push(VerificationIssue::BrokenLink {
                    index,
                    previous_hash: *record.previous_hash(),
                    expected: GENESIS_HASH,
                });
            }
        }
        Some((prev, prev_computed)) => {
            let expected_index = prev.index().saturating_add(1);
            if index != expected_index {
                issues.push(VerificationIssue::IndexGap {
                    index,
                    expected: expected_index,
                });
            }
            if record.previous_hash() != &prev_computed {
                issues.push(VerificationIssue::BrokenLink {
                    index,
                    previous_hash: *record.previous_hash(),
                    expected: prev_computed,
                });
            }
            if record.timestamp() <= prev.timestamp() {
                issues.push(VerificationIssue::TimestampNotIncreasing {
                    index,
                    previous: prev.timestamp(),
                    timestamp: record.timestamp(),
                });
            }
        }
    }
}
