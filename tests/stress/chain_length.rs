//! Stress test: build a chain of 1000 dual-signed decisions, verify it in
//! full and in slices, and ensure it completes in reasonable time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use proofnest::chain::{Chain, GENESIS_HASH};
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::time::ManualClock;
use proofnest::{ProofBundle, Verifier};

const LEN: usize = 1000;

fn build(len: usize) -> Chain {
    let signer = AgentSigner::generate(KeyOptions::dual()).expect("keygen should succeed");
    let clock = ManualClock::new(1);
    let mut chain = Chain::with_clock(signer.identity().clone(), Arc::new(clock.clone()));
    for i in 0..len {
        clock.advance(1);
        chain
            .append(format!("decision {i}").as_bytes(), &signer, vec![])
            .unwrap_or_else(|e| panic!("append {i} should succeed: {e}"));
    }
    chain
}

#[test]
fn stress_chain_1000() {
    let start = Instant::now();
    let chain = build(LEN);
    let build_elapsed = start.elapsed();
    assert_eq!(chain.len(), LEN);

    let records = chain.records();
    assert_eq!(records[0].previous_hash(), &GENESIS_HASH);
    for i in 1..records.len() {
        assert_eq!(
            records[i].previous_hash(),
            records[i - 1].self_hash(),
            "record {i} should link to record {}",
            i - 1
        );
        assert!(records[i].timestamp() > records[i - 1].timestamp());
    }

    let verify_start = Instant::now();
    let report = Verifier::default().verify_chain(&chain);
    let verify_elapsed = verify_start.elapsed();
    assert!(report.is_valid(), "chain of {LEN} should verify: {:?}", report.issues);
    assert_eq!(report.records_checked, LEN);

    let total_elapsed = start.elapsed();
    assert!(
        total_elapsed.as_secs() < 120,
        "{LEN}-record chain should complete in under 120 seconds, took {:?}",
        total_elapsed
    );

    eprintln!(
        "Chain stress test: build={:?}, verify={:?}, total={:?}",
        build_elapsed, verify_elapsed, total_elapsed
    );
}

#[test]
fn stress_chain_self_hashes_unique() {
    let chain = build(LEN);
    let mut seen = HashSet::new();
    for record in chain.records() {
        assert!(
            seen.insert(*record.self_hash()),
            "duplicate self hash at index {}",
            record.index()
        );
    }
    assert_eq!(seen.len(), LEN);
}

#[test]
fn stress_chain_slices_verify_independently() {
    let chain = build(200);
    let verifier = Verifier::default();
    for (start, end) in [(0, 49), (50, 50), (73, 151), (150, 199)] {
        let bundle = ProofBundle::export(&chain, start, end).unwrap();
        let report = verifier.verify_bundle(&bundle);
        assert!(report.is_valid(), "slice [{start}, {end}]: {:?}", report.issues);
        assert_eq!(report.records_checked as u64, end - start + 1);
    }
}
