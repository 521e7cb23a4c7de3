//! Integration test: anchoring a persistent chain end to end.
//!
//! A fake calendar stands in for OpenTimestamps. It answers submissions
//! with a pending proof and confirms on the N-th status query with a
//! Bitcoin attestation, so the proofs that reach the verifier are real
//! OTS encodings. A fake block source plays the Bitcoin header lookup.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use proofnest::anchor::ots::{self, Attestation, DetachedProof, Item, Op, Timestamp};
use proofnest::anchor::{
    AnchorMethod, AnchorNetwork, AnchorScheduler, AnchorService, BackoffPolicy, BatchPlanner,
    BlockSource, ManualTrigger, NetworkStatus, OpReturnNetwork, ProofBlob, Tick,
};
use proofnest::chain::{Actor, DecisionPayload, RiskLevel};
use proofnest::config::AnchorConfig;
use proofnest::crypto::Hash256;
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::storage::ChainStore;
use proofnest::time::SystemClock;
use proofnest::verify::Assurance;
use proofnest::{AnchorStatus, ErrorKind, Ledger, LedgerError, ProofBundle, Verifier};

const HEIGHT: u64 = 840_000;

fn attested(attestation: Attestation) -> Timestamp {
    Timestamp {
        items: vec![Item::Op(
            Op::Append(vec![0x5a; 16]),
            Timestamp {
                items: vec![Item::Op(
                    Op::Sha256,
                    Timestamp {
                        items: vec![Item::Attestation(attestation)],
                    },
                )],
            },
        )],
    }
}

struct FakeCalendar {
    confirm_after: usize,
    polls: AtomicUsize,
    submits: AtomicUsize,
}

impl FakeCalendar {
    fn new(confirm_after: usize) -> Self {
        Self {
            confirm_after,
            polls: AtomicUsize::new(0),
            submits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl AnchorNetwork for FakeCalendar {
    fn method(&self) -> AnchorMethod {
        AnchorMethod::OpenTimestamps
    }

    async fn submit(&self, batch_root: &Hash256) -> proofnest::Result<ProofBlob> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        let proof = DetachedProof::new(
            ots::sha256(batch_root.as_bytes()),
            attested(Attestation::Pending {
                uri: "https://fake.calendar".into(),
            }),
        );
        Ok(ProofBlob::opentimestamps(
            proof.to_bytes(),
            Some("https://fake.calendar".into()),
        ))
    }

    async fn status(&self, proof: &ProofBlob) -> proofnest::Result<NetworkStatus> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let detached = DetachedProof::parse(&proof.data)?;
        if polls < self.confirm_after {
            return Ok(NetworkStatus::Pending {
                proof: proof.clone(),
            });
        }
        let upgraded = DetachedProof::new(
            detached.digest,
            attested(Attestation::Bitcoin { height: HEIGHT }),
        );
        Ok(NetworkStatus::Confirmed {
            proof: ProofBlob::opentimestamps(upgraded.to_bytes(), proof.source.clone()),
            block_height: HEIGHT,
        })
    }
}

struct FakeBlocks {
    height: u64,
    merkle_root: [u8; 32],
}

#[async_trait]
impl BlockSource for FakeBlocks {
    async fn merkle_root(&self, height: u64) -> proofnest::Result<Option<[u8; 32]>> {
        Ok((height == self.height).then_some(self.merkle_root))
    }
}

fn config(batch_size: usize) -> AnchorConfig {
    AnchorConfig {
        batch_size,
        max_polls: 10,
        ..AnchorConfig::default()
    }
}

fn service(network: Arc<dyn AnchorNetwork>, batch_size: usize) -> AnchorService {
    AnchorService::new(network, &config(batch_size)).with_backoff(BackoffPolicy::immediate(2))
}

fn record_decisions(store: &ChainStore, signer: AgentSigner, n: usize) {
    let mut ledger = Ledger::open("anchorer", signer, store.clone()).unwrap();
    for i in 0..n {
        let payload = DecisionPayload::new(
            Actor::ai("anchorer", None),
            format!("action-{i}"),
            "batch me",
            RiskLevel::Low,
        )
        .unwrap();
        ledger.decide(&payload, vec![]).unwrap();
    }
}

#[tokio::test]
async fn scheduled_anchor_confirms_and_travels_in_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let store = ChainStore::open(dir.path()).unwrap();
    let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let identity = signer.identity().clone();
    record_decisions(&store, signer, 5);

    let chain = store
        .load_chain(identity.clone(), Arc::new(SystemClock::new()))
        .unwrap();
    let chain = Arc::new(RwLock::new(chain));
    let calendar = Arc::new(FakeCalendar::new(2));
    let mut scheduler = AnchorScheduler::new(
        Arc::clone(&chain),
        service(calendar.clone(), 4),
        BatchPlanner::new(4, 8).unwrap(),
    )
    .unwrap()
    .with_store(store.clone());

    // First tick submits [0, 3]; record 4 waits for a full batch.
    let report = scheduler.run_once(Tick::Regular).await.unwrap();
    assert_eq!(report.submitted.map(|r| (r.start, r.end)), Some((0, 3)));
    assert_eq!(store.pending_anchors().unwrap().len(), 1);

    // Second tick polls (still pending), third confirms.
    let report = scheduler.run_once(Tick::Regular).await.unwrap();
    assert!(report.confirmed.is_empty());
    let report = scheduler.run_once(Tick::Regular).await.unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert!(report.submitted.is_none());
    assert!(store.pending_anchors().unwrap().is_empty());
    assert_eq!(calendar.submits.load(Ordering::SeqCst), 1);

    // The chain carries the anchor and a reload from disk sees it too.
    assert_eq!(chain.read().unwrap().last_anchored_index(), Some(3));
    let reloaded = store
        .load_chain(identity, Arc::new(SystemClock::new()))
        .unwrap();
    assert_eq!(reloaded.anchors().len(), 1);
    assert_eq!(reloaded.anchors()[0].block_height(), Some(HEIGHT));

    // A bundle over [2, 4] carries the anchor with proofs for 2 and 3.
    let bundle = ProofBundle::export(&reloaded, 2, 4).unwrap();
    assert_eq!(bundle.anchors.len(), 1);
    let indices: Vec<u64> = bundle.anchors[0]
        .inclusion_proofs
        .iter()
        .map(|p| p.index)
        .collect();
    assert_eq!(indices, vec![2, 3]);

    let report = bundle.verify();
    assert!(report.is_valid(), "{:?}", report.issues);
    assert_eq!(report.anchors.len(), 1);
    assert_eq!(report.anchors[0].assurance, Assurance::MerkleInclusion);
    assert!(report.anchors[0].reduced_assurance);

    // The calendar alone cannot vouch for the block.
    let calendar_only = Verifier::default()
        .with_network(calendar.clone())
        .verify_online(&bundle)
        .await;
    assert!(calendar_only.is_valid(), "{:?}", calendar_only.issues);
    assert_eq!(calendar_only.anchors[0].assurance, Assurance::MerkleInclusion);
    assert!(calendar_only.anchors[0].reduced_assurance);

    // A matching block header upgrades the assurance.
    let proof = DetachedProof::parse(&bundle.anchors[0].anchor.proof_blob().data).unwrap();
    let (height, message) = proof.bitcoin_commitments().remove(0);
    assert_eq!(height, HEIGHT);
    let blocks = FakeBlocks {
        height,
        merkle_root: message.try_into().unwrap(),
    };
    let online = Verifier::default()
        .with_network(calendar.clone())
        .with_block_source(Arc::new(blocks))
        .verify_online(&bundle)
        .await;
    assert!(online.is_valid(), "{:?}", online.issues);
    assert_eq!(online.anchors[0].assurance, Assurance::NetworkConfirmed);
    assert!(!online.anchors[0].reduced_assurance);
}

#[tokio::test]
async fn pending_anchors_resume_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = ChainStore::open(dir.path()).unwrap();
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let identity = signer.identity().clone();
    record_decisions(&store, signer, 2);

    let load = || {
        Arc::new(RwLock::new(
            store
                .load_chain(identity.clone(), Arc::new(SystemClock::new()))
                .unwrap(),
        ))
    };

    // First process submits with a flush and exits.
    let calendar = Arc::new(FakeCalendar::new(1));
    let mut first = AnchorScheduler::new(
        load(),
        service(calendar.clone(), 4),
        BatchPlanner::new(4, 8).unwrap(),
    )
    .unwrap()
    .with_store(store.clone());
    let report = first.run_once(Tick::Flush).await.unwrap();
    assert_eq!(report.submitted.map(|r| (r.start, r.end)), Some((0, 1)));
    drop(first);

    // Second process resumes from the stored pending anchor.
    let chain = load();
    let mut second = AnchorScheduler::new(
        Arc::clone(&chain),
        service(calendar.clone(), 4),
        BatchPlanner::new(4, 8).unwrap(),
    )
    .unwrap()
    .with_store(store.clone());
    second.resume(store.pending_anchors().unwrap());
    assert_eq!(second.next_index(), 2);

    let report = second.run_once(Tick::Regular).await.unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(calendar.submits.load(Ordering::SeqCst), 1);
    assert_eq!(chain.read().unwrap().anchors().len(), 1);
}

#[tokio::test]
async fn scheduler_runs_from_manual_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let store = ChainStore::open(dir.path()).unwrap();
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let identity = signer.identity().clone();
    record_decisions(&store, signer, 3);
    let chain = store
        .load_chain(identity, Arc::new(SystemClock::new()))
        .unwrap();
    let chain = Arc::new(RwLock::new(chain));

    let (handle, trigger) = ManualTrigger::channel(4);
    let scheduler = AnchorScheduler::new(
        Arc::clone(&chain),
        service(Arc::new(FakeCalendar::new(1)), 4),
        BatchPlanner::new(4, 8).unwrap(),
    )
    .unwrap();
    let task = tokio::spawn(scheduler.run(trigger));

    handle.send(Tick::Regular).await.unwrap();
    handle.send(Tick::Flush).await.unwrap();
    handle.send(Tick::Regular).await.unwrap();
    drop(handle);

    let pending = task.await.unwrap();
    assert!(pending.is_empty());
    assert_eq!(chain.read().unwrap().last_anchored_index(), Some(2));
}

#[tokio::test]
async fn wait_for_confirmation_stops_on_cancel_and_timeout() {
    let calendar = Arc::new(FakeCalendar::new(usize::MAX));
    let patient = AnchorConfig {
        max_polls: 1_000_000,
        ..config(4)
    };
    let svc = AnchorService::new(calendar, &patient).with_backoff(BackoffPolicy::immediate(2));
    let pending = svc
        .submit_batch(0, &[Hash256::digest(b"a"), Hash256::digest(b"b")])
        .await
        .unwrap();
    assert_eq!(pending.status(), AnchorStatus::Pending);

    let (_tx, rx) = watch::channel(false);
    let err = svc
        .wait_for_confirmation(&pending, Duration::from_millis(5), rx, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Timeout(_)));
    assert_eq!(err.kind(), ErrorKind::Anchor);

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let err = svc
        .wait_for_confirmation(&pending, Duration::from_secs(60), rx, Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Cancelled));
}

#[tokio::test]
async fn op_return_is_never_anchored() {
    let svc = AnchorService::new(Arc::new(OpReturnNetwork), &config(4));
    let err = svc
        .submit_batch(0, &[Hash256::digest(b"x")])
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AnchorNotImplemented { .. }));
    assert!(!err.is_retryable());
}
