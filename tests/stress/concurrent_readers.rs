//! Stress test: one writer appends while many readers snapshot and verify
//! a shared chain, and many threads verify the same bundle at once.

use std::sync::{Arc, RwLock};
use std::thread;

use proofnest::chain::Chain;
use proofnest::identity::{AgentSigner, KeyOptions};
use proofnest::time::SystemClock;
use proofnest::{ProofBundle, Verifier};

const WRITES: usize = 200;
const READERS: usize = 8;

#[test]
fn stress_readers_see_valid_prefixes_while_writer_appends() {
    let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
    let chain = Arc::new(RwLock::new(Chain::with_clock(
        signer.identity().clone(),
        Arc::new(SystemClock::new()),
    )));

    thread::scope(|s| {
        let writer_chain = Arc::clone(&chain);
        let signer = &signer;
        s.spawn(move || {
            for i in 0..WRITES {
                writer_chain
                    .write()
                    .unwrap()
                    .append(format!("w{i}").as_bytes(), signer, vec![])
                    .unwrap_or_else(|e| panic!("append {i} should succeed: {e}"));
            }
        });

        for reader in 0..READERS {
            let chain = Arc::clone(&chain);
            s.spawn(move || {
                let verifier = Verifier::default();
                let mut last_len = 0;
                while last_len < WRITES {
                    let snapshot = chain.read().unwrap().clone();
                    assert!(snapshot.len() >= last_len, "reader {reader} saw the chain shrink");
                    let report = verifier.verify_chain(&snapshot);
                    assert!(
                        report.is_valid(),
                        "reader {reader} saw an invalid prefix of length {}: {:?}",
                        snapshot.len(),
                        report.issues
                    );
                    last_len = snapshot.len();
                    thread::yield_now();
                }
            });
        }
    });

    assert_eq!(chain.read().unwrap().len(), WRITES);
}

#[test]
fn stress_parallel_bundle_verification() {
    let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
    let mut chain = Chain::with_clock(signer.identity().clone(), Arc::new(SystemClock::new()));
    for i in 0..50 {
        chain.append(format!("b{i}").as_bytes(), &signer, vec![]).unwrap();
    }
    let bundle = Arc::new(ProofBundle::export(&chain, 0, 49).unwrap());
    let bytes = bundle.to_bytes().unwrap();
    let verifier = Arc::new(Verifier::default());

    let handles: Vec<_> = (0..READERS)
        .map(|_| {
            let bundle = Arc::clone(&bundle);
            let verifier = Arc::clone(&verifier);
            let bytes = bytes.clone();
            thread::spawn(move || {
                let parsed = ProofBundle::from_bytes(&bytes).unwrap();
                assert_eq!(&parsed, bundle.as_ref());
                verifier.verify_bundle(&parsed).is_valid()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().expect("verifier thread panicked"));
    }
}
