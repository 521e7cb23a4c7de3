//! Stress test: every single-field edit anywhere in a chain is detected
//! at the edited record.

use std::sync::Arc;

use serde_json::{json, Value};

use proofnest::chain::{Chain, DecisionRecord};
use proofnest::crypto::Hash256;
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::time::ManualClock;
use proofnest::{AgentIdentity, VerificationIssue, Verifier};

const LEN: usize = 60;

fn build() -> (AgentIdentity, Vec<DecisionRecord>) {
    let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let clock = ManualClock::new(1_000);
    let mut chain = Chain::with_clock(signer.identity().clone(), Arc::new(clock.clone()));
    for i in 0..LEN {
        clock.advance(10);
        chain
            .append(format!("d{i}").as_bytes(), &signer, vec![format!("alt{i}")])
            .unwrap();
    }
    (signer.identity().clone(), chain.records().to_vec())
}

fn edit(record: &DecisionRecord, field: &str, value: Value) -> DecisionRecord {
    let mut json = serde_json::to_value(record).unwrap();
    json[field] = value;
    serde_json::from_value(json).unwrap()
}

fn assert_detected_at(identity: &AgentIdentity, records: &[DecisionRecord], index: usize, what: &str) {
    let report = Verifier::default().verify_records(identity, records, &[]);
    assert!(!report.is_valid(), "{what} at {index} went unnoticed");
    assert_eq!(
        report.first_failing_index(),
        Some(index as u64),
        "{what} at {index}: {:?}",
        report.issues
    );
}

#[test]
fn stress_content_edits_detected_everywhere() {
    let (identity, records) = build();
    let forged = Hash256::digest(b"forged").to_hex();
    for i in 0..LEN {
        let mut copy = records.clone();
        copy[i] = edit(&copy[i], "content_hash", json!(forged));
        assert_detected_at(&identity, &copy, i, "content edit");
    }
}

#[test]
fn stress_timestamp_and_alternative_edits_detected() {
    let (identity, records) = build();
    for i in (0..LEN).step_by(7) {
        let mut copy = records.clone();
        copy[i] = edit(&copy[i], "timestamp", json!(copy[i].timestamp() + 1));
        assert_detected_at(&identity, &copy, i, "timestamp edit");

        let mut copy = records.clone();
        copy[i] = edit(&copy[i], "alternatives", json!([]));
        assert_detected_at(&identity, &copy, i, "alternatives edit");
    }
}

#[test]
fn stress_rehashed_forgery_breaks_signature() {
    // A forger who recomputes the self hash still cannot re-sign it.
    let (identity, records) = build();
    for i in (0..LEN).step_by(11) {
        let mut copy = records.clone();
        let forged = edit(&copy[i], "alternatives", json!(["forged"]));
        let rehashed = forged.recomputed_self_hash();
        copy[i] = edit(&forged, "self_hash", json!(rehashed.to_hex()));

        let report = Verifier::default().verify_records(&identity, &copy, &[]);
        assert_eq!(report.first_failing_index(), Some(i as u64));
        assert!(report
            .issues_at(i as u64)
            .iter()
            .any(|issue| matches!(issue, VerificationIssue::InvalidSignature { .. })));
    }
}

#[test]
fn stress_reordering_and_deletion_detected() {
    let (identity, records) = build();

    let mut swapped = records.clone();
    swapped.swap(20, 21);
    assert_detected_at(&identity, &swapped, 20, "swap");

    // Issues name the index the record claims, so a gap is reported at
    // the record after it and a replay at the replayed index.
    let mut deleted = records.clone();
    deleted.remove(30);
    assert_detected_at(&identity, &deleted, 31, "deletion");

    let mut duplicated = records.clone();
    duplicated.insert(40, records[39].clone());
    assert_detected_at(&identity, &duplicated, 39, "duplicate");
}
