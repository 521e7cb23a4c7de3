//! Integration test: full end-to-end workflow.
//!
//! Tests the complete lifecycle:
//! 1. Create an agent key and persist it encrypted
//! 2. Record decisions through a persistent ledger
//! 3. Reopen the ledger from disk and keep appending
//! 4. Verify the chain and export a bundle
//! 5. Verify the bundle as a third party

use proofnest::chain::{content_hash, Actor, DecisionPayload, RiskLevel, GENESIS_HASH};
use proofnest::identity::{AgentSigner, KeyOptions, DID_PREFIX};
use proofnest::storage::{load_signer, read_public_identity, save_signer, ChainStore};
use proofnest::{Ledger, LedgerError, ProofBundle, Verifier};

fn payload(action: &str, risk: RiskLevel) -> DecisionPayload {
    DecisionPayload::new(
        Actor::ai("planner", Some("test-model".to_string())),
        action,
        format!("reasoning for {action}"),
        risk,
    )
    .expect("payload should build")
}

#[test]
fn full_workflow_key_to_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("agent.pnk");

    // ── Step 1: Create and store an identity ────────────────────────────
    let signer = AgentSigner::generate(KeyOptions::dual()).expect("keygen should succeed");
    let did = signer.identity().identifier().clone();
    assert!(did.as_str().starts_with(DID_PREFIX));
    save_signer(&signer, &key_path, "correct horse").expect("key should save");

    let public = read_public_identity(&key_path).expect("public identity should be readable");
    assert_eq!(public.identifier(), &did);

    // ── Step 2: Record decisions ────────────────────────────────────────
    let first = payload("approve-deploy", RiskLevel::High);
    {
        let store = ChainStore::open(dir.path()).unwrap();
        let mut ledger = Ledger::open("planner", signer, store).expect("ledger should open");
        let record = ledger
            .decide(&first, vec!["reject-deploy".into(), "defer".into()])
            .expect("decision should record");
        assert_eq!(record.index(), 0);
        assert_eq!(record.previous_hash(), &GENESIS_HASH);
        assert_eq!(record.content_hash(), &content_hash(&first.to_bytes().unwrap()));
        assert_eq!(record.alternatives().len(), 2);

        ledger.decide(&payload("notify-team", RiskLevel::Low), vec![]).unwrap();
    }

    // ── Step 3: Reopen from disk ────────────────────────────────────────
    let signer = load_signer(&key_path, "correct horse").expect("key should unlock");
    assert_eq!(signer.identity().identifier(), &did);
    assert!(signer.has_classical());

    let store = ChainStore::open(dir.path()).unwrap();
    let mut ledger = Ledger::open("planner", signer, store).unwrap();
    assert_eq!(ledger.chain().len(), 2);
    let third = ledger
        .decide(&payload("rollback", RiskLevel::Critical), vec![])
        .unwrap();
    assert_eq!(third.index(), 2);

    let records = ledger.chain().records();
    assert_eq!(records[1].previous_hash(), records[0].self_hash());
    assert_eq!(records[2].previous_hash(), records[1].self_hash());
    assert!(records[0].timestamp() < records[1].timestamp());
    assert!(records[1].timestamp() < records[2].timestamp());

    // ── Step 4: Verify and export ───────────────────────────────────────
    let report = ledger.verify();
    assert!(report.is_valid(), "chain should verify: {:?}", report.issues);
    assert_eq!(report.records_checked, 3);

    let bundle_path = dir.path().join("bundle.json");
    ledger
        .export_bundle(1, 2)
        .expect("export should succeed")
        .write_to(&bundle_path)
        .unwrap();

    // ── Step 5: Third-party verification ────────────────────────────────
    let bundle = ProofBundle::read_from(&bundle_path).expect("bundle should load");
    assert_eq!(bundle.range(), Some((1, 2)));
    assert_eq!(bundle.identity.identifier(), &did);

    let report = Verifier::default().verify_bundle(&bundle);
    assert!(report.is_valid(), "bundle should verify: {:?}", report.issues);
    assert_eq!(report.first_index, Some(1));
    assert_eq!(report.last_index, Some(2));
}

#[test]
fn wrong_passphrase_does_not_unlock() {
    let dir = tempfile::tempdir().unwrap();
    let key_path = dir.path().join("agent.pnk");
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    save_signer(&signer, &key_path, "right").unwrap();

    let err = load_signer(&key_path, "wrong").unwrap_err();
    assert!(matches!(err, LedgerError::InvalidPassphrase));
}

#[test]
fn two_agents_have_independent_chains() {
    let alice = AgentSigner::generate(KeyOptions::default()).unwrap();
    let bob = AgentSigner::generate(KeyOptions::default()).unwrap();
    assert_ne!(alice.identity().identifier(), bob.identity().identifier());

    let bob_identity = bob.identity().clone();
    let mut a = Ledger::new("alice", alice).unwrap();
    let mut b = Ledger::new("bob", bob).unwrap();
    a.decide(&payload("a-1", RiskLevel::Low), vec![]).unwrap();
    b.decide(&payload("b-1", RiskLevel::Low), vec![]).unwrap();

    assert_eq!(a.chain().records()[0].previous_hash(), &GENESIS_HASH);
    assert_eq!(b.chain().records()[0].previous_hash(), &GENESIS_HASH);

    // Alice's records do not verify under Bob's identity.
    let report = Verifier::default().verify_records(&bob_identity, a.chain().records(), &[]);
    assert!(!report.is_valid());
    assert_eq!(report.first_failing_index(), Some(0));
}
