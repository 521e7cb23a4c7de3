//! Integration test: proof bundles leave the process and come back intact.

use std::sync::Arc;

use proofnest::chain::Chain;
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::time::ManualClock;
use proofnest::{ErrorKind, LedgerError, ProofBundle, VerificationIssue};

fn chain(n: usize, options: KeyOptions) -> Chain {
    let signer = AgentSigner::generate(options).unwrap();
    let clock = ManualClock::new(1_700_000_000_000_000);
    let mut chain = Chain::with_clock(signer.identity().clone(), Arc::new(clock.clone()));
    for i in 0..n {
        clock.advance(250);
        chain
            .append(
                format!("{{\"action\":\"step-{i}\"}}").as_bytes(),
                &signer,
                vec![format!("skip-{i}")],
            )
            .unwrap();
    }
    chain
}

#[test]
fn bundle_bytes_are_stable_across_reexport() {
    let chain = chain(6, KeyOptions::dual());
    let bundle = ProofBundle::export(&chain, 2, 4).unwrap();
    let bytes = bundle.to_bytes().unwrap();

    let parsed = ProofBundle::from_bytes(&bytes).unwrap();
    assert_eq!(parsed, bundle);
    assert_eq!(parsed.to_bytes().unwrap(), bytes);
    assert!(parsed.verify().is_valid());
}

#[test]
fn bundle_survives_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bundle.json");
    let chain = chain(3, KeyOptions::default());
    let bundle = ProofBundle::export(&chain, 0, 2).unwrap();
    bundle.write_to(&path).unwrap();

    let loaded = ProofBundle::read_from(&path).unwrap();
    assert_eq!(loaded, bundle);
    assert_eq!(std::fs::read(&path).unwrap(), loaded.to_bytes().unwrap());
}

#[test]
fn missing_bundle_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = ProofBundle::read_from(&dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));
}

#[test]
fn future_format_version_is_rejected() {
    let chain = chain(1, KeyOptions::default());
    let mut json: serde_json::Value =
        serde_json::to_value(ProofBundle::export(&chain, 0, 0).unwrap()).unwrap();
    json["format_version"] = serde_json::json!(2);

    let err = ProofBundle::from_bytes(&serde_json::to_vec(&json).unwrap()).unwrap_err();
    assert!(matches!(
        err,
        LedgerError::UnsupportedVersion {
            found: 2,
            expected: 1
        }
    ));
}

#[test]
fn garbage_is_invalid_format() {
    for bytes in [&b"not json"[..], b"{}", b"\"bundle\""] {
        let err = ProofBundle::from_bytes(bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage, "{bytes:?}");
    }
}

#[test]
fn out_of_range_export_fails() {
    let chain = chain(3, KeyOptions::default());
    for (start, end) in [(0, 3), (2, 1), (5, 9)] {
        let err = ProofBundle::export(&chain, start, end).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range, "[{start}, {end}]");
    }
}

#[test]
fn edited_bundle_reports_the_edited_record() {
    let chain = chain(4, KeyOptions::dual());
    let mut json = serde_json::to_value(ProofBundle::export(&chain, 0, 3).unwrap()).unwrap();
    json["records"][2]["alternatives"] = serde_json::json!(["something else"]);

    let bundle = ProofBundle::from_bytes(&serde_json::to_vec(&json).unwrap()).unwrap();
    let report = bundle.verify();
    assert!(!report.is_valid());
    assert_eq!(report.first_failing_index(), Some(2));
    assert!(report
        .issues_at(2)
        .iter()
        .any(|i| matches!(i, VerificationIssue::SelfHashMismatch { .. })));
    assert!(report.issues_at(0).is_empty());
    assert!(report.issues_at(1).is_empty());
}

#[test]
fn swapped_identity_fails_every_record() {
    let chain = chain(2, KeyOptions::default());
    let other = AgentSigner::generate(KeyOptions::default()).unwrap();
    let mut bundle = ProofBundle::export(&chain, 0, 1).unwrap();
    bundle.identity = other.identity().clone();

    let report = bundle.verify();
    assert!(!report.is_valid());
    assert!(!report.issues_at(0).is_empty());
    assert!(!report.issues_at(1).is_empty());
}
