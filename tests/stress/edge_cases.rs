//! Edge case tests: clocks, empty and single-record chains, signature
//! sets, alternatives, payload bounds and agent names.

use std::sync::Arc;

use serde_json::json;

use proofnest::chain::{Actor, Chain, DecisionPayload, DecisionRecord, RiskLevel};
use proofnest::identity::{identifier_for, AgentSigner, KeyOptions};
use proofnest::ledger::{validate_agent_name, MAX_AGENT_NAME_LEN};
use proofnest::time::ManualClock;
use proofnest::{ErrorKind, Ledger, LedgerError, ProofBundle, VerificationIssue, Verifier};

fn manual_chain(signer: &AgentSigner, start: u64) -> (Chain, ManualClock) {
    let clock = ManualClock::new(start);
    let chain = Chain::with_clock(signer.identity().clone(), Arc::new(clock.clone()));
    (chain, clock)
}

fn with_field(record: &DecisionRecord, field: &str, value: serde_json::Value) -> DecisionRecord {
    let mut json = serde_json::to_value(record).unwrap();
    json[field] = value;
    serde_json::from_value(json).unwrap()
}

// === Clock edge cases ===

#[test]
fn edge_same_timestamp_rejected_and_chain_unchanged() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 100);
    chain.append(b"first", &signer, vec![]).unwrap();
    let head = *chain.head().hash().as_bytes();

    let err = chain.append(b"second", &signer, vec![]).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::TimestampViolation {
            index: 1,
            previous: 100,
            attempted: 100
        }
    ));
    assert_eq!(err.kind(), ErrorKind::TimestampViolation);
    assert_eq!(chain.len(), 1);
    assert_eq!(chain.head().hash().as_bytes(), &head);

    clock.advance(1);
    assert_eq!(chain.append(b"second", &signer, vec![]).unwrap().index(), 1);
}

#[test]
fn edge_clock_going_backwards_rejected() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 5_000);
    chain.append(b"a", &signer, vec![]).unwrap();
    clock.set(4_999);
    let err = chain.append(b"b", &signer, vec![]).unwrap_err();
    assert_eq!(err.index(), Some(1));
    assert_eq!(chain.len(), 1);
}

// === Chain shape edge cases ===

#[test]
fn edge_empty_chain() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let chain = Chain::new(signer.identity().clone());
    let report = Verifier::default().verify_chain(&chain);
    assert!(report.is_valid());
    assert_eq!(report.records_checked, 0);
    assert_eq!(report.first_index, None);
    assert_eq!(chain.head().next_index(), 0);

    let err = ProofBundle::export(&chain, 0, 0).unwrap_err();
    assert!(matches!(err, LedgerError::Range { len: 0, .. }));
}

#[test]
fn edge_single_record_bundle() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 1);
    for _ in 0..3 {
        clock.advance(1);
        chain.append(b"x", &signer, vec![]).unwrap();
    }
    // Identical content still yields distinct records.
    assert_ne!(chain.records()[0].self_hash(), chain.records()[1].self_hash());

    let bundle = ProofBundle::export(&chain, 1, 1).unwrap();
    assert_eq!(bundle.range(), Some((1, 1)));
    assert!(bundle.verify().is_valid());
}

#[test]
fn edge_foreign_signer_cannot_append() {
    let owner = AgentSigner::generate(KeyOptions::default()).unwrap();
    let intruder = AgentSigner::generate(KeyOptions::default()).unwrap();
    let mut chain = Chain::new(owner.identity().clone());
    let err = chain.append(b"x", &intruder, vec![]).unwrap_err();
    assert!(matches!(err, LedgerError::OwnerMismatch { .. }));
    assert!(chain.is_empty());
}

// === Alternatives ===

#[test]
fn edge_alternatives_order_and_emptiness_matter() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let variants: Vec<Vec<String>> = vec![
        vec![],
        vec![String::new()],
        vec!["a".into(), "b".into()],
        vec!["b".into(), "a".into()],
        vec!["ab".into()],
        vec!["拒否".into(), "🚫".into()],
    ];
    let mut hashes = std::collections::HashSet::new();
    for alternatives in variants {
        let (mut chain, clock) = manual_chain(&signer, 1);
        clock.advance(1);
        let record = chain.append(b"same", &signer, alternatives.clone()).unwrap();
        assert_eq!(record.alternatives(), alternatives.as_slice());
        assert!(hashes.insert(*record.self_hash()), "{alternatives:?}");
    }
}

// === Signature sets ===

#[test]
fn edge_missing_pq_signature_is_reported() {
    let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 1);
    clock.advance(1);
    chain.append(b"x", &signer, vec![]).unwrap();

    let mut sigs = serde_json::to_value(chain.records()[0].signatures()).unwrap();
    sigs.as_object_mut().unwrap().remove("dilithium3");
    let stripped = with_field(&chain.records()[0], "signatures", sigs);

    let report = Verifier::default().verify_records(signer.identity(), &[stripped], &[]);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, VerificationIssue::MissingSignature { index: 0, .. })));
}

#[test]
fn edge_classical_signature_without_declared_key() {
    let dual = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let pq_only = AgentSigner::generate(KeyOptions::default()).unwrap();
    assert!(!pq_only.has_classical());

    // Graft a dual signer's ed25519 signature onto a pq-only record.
    let (mut chain, clock) = manual_chain(&pq_only, 1);
    clock.advance(1);
    chain.append(b"x", &pq_only, vec![]).unwrap();
    let record = &chain.records()[0];
    let extra = dual.sign(record.self_hash()).unwrap();
    let mut sigs = serde_json::to_value(record.signatures()).unwrap();
    sigs["ed25519"] = serde_json::to_value(extra).unwrap()["ed25519"].clone();
    let grafted = with_field(record, "signatures", sigs);

    let report = Verifier::default().verify_records(pq_only.identity(), &[grafted], &[]);
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, VerificationIssue::UndeclaredKey { .. })));
}

#[test]
fn edge_unknown_scheme_is_an_issue_not_a_parse_error() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 1);
    clock.advance(1);
    chain.append(b"x", &signer, vec![]).unwrap();
    let mut sigs = serde_json::to_value(chain.records()[0].signatures()).unwrap();
    sigs["sphincs"] = json!("AAAA");
    let record = with_field(&chain.records()[0], "signatures", sigs);

    let report = Verifier::default().verify_records(signer.identity(), &[record], &[]);
    assert_eq!(report.issues.len(), 1);
    assert!(matches!(
        &report.issues[0],
        VerificationIssue::UnknownScheme { scheme, .. } if scheme == "sphincs"
    ));
}

// === Identity ===

#[test]
fn edge_identifier_depends_on_every_key() {
    let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let identity = signer.identity();
    let with_classical =
        identifier_for(identity.pq_public_key(), identity.classical_public_key()).unwrap();
    let without = identifier_for(identity.pq_public_key(), None).unwrap();
    assert_eq!(&with_classical, identity.identifier());
    assert_ne!(with_classical, without);
}

// === Payloads and names ===

#[test]
fn edge_payload_bounds() {
    let actor = Actor::ai("edge", None);
    for confidence in [0.0, 0.5, 1.0] {
        let payload = DecisionPayload::new(actor.clone(), "act", "", RiskLevel::Low)
            .unwrap()
            .with_confidence(confidence);
        assert!(payload.validate().is_ok(), "{confidence}");
    }
    for confidence in [-0.01, 1.01, f64::NAN] {
        let payload = DecisionPayload::new(actor.clone(), "act", "", RiskLevel::Low)
            .unwrap()
            .with_confidence(confidence);
        assert!(payload.validate().is_err(), "{confidence}");
    }
    let blank = DecisionPayload::new(actor, "   ", "", RiskLevel::Low).unwrap();
    assert!(matches!(blank.validate(), Err(LedgerError::InvalidPayload(_))));
}

#[test]
fn edge_agent_names() {
    assert!(validate_agent_name(&"a".repeat(MAX_AGENT_NAME_LEN)).is_ok());
    assert!(validate_agent_name(&"a".repeat(MAX_AGENT_NAME_LEN + 1)).is_err());

    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let err = Ledger::new("../../etc/passwd", signer).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidAgentName(_)));
}

#[test]
fn edge_large_content_is_only_hashed() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let (mut chain, clock) = manual_chain(&signer, 1);
    clock.advance(1);
    let big = vec![0x42u8; 4 * 1024 * 1024];
    let record = chain.append(&big, &signer, vec![]).unwrap();
    let json = serde_json::to_vec(record).unwrap();
    assert!(json.len() < 64 * 1024, "record should not embed content");
}
