//! ProofNest: a tamper-evident decision ledger for autonomous agents.
//!
//! Every decision an agent makes becomes an immutable record, hash-linked
//! to its predecessor and signed with a post-quantum (Dilithium3) key and
//! optionally a classical (Ed25519) key. Chain segments can be exported as
//! self-contained bundles and verified offline by a third party, and
//! batches of records can be anchored to Bitcoin through OpenTimestamps.

pub mod anchor;
pub mod bundle;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod storage;
pub mod time;
pub mod verify;

// Re-export primary types
pub use error::{ErrorKind, LedgerError, Result};
pub use identity::{AgentIdentity, AgentSigner, Did, KeyOptions, SignatureSet};
pub use chain::{Chain, DecisionPayload, DecisionRecord, Head, RiskLevel};
pub use verify::{VerificationIssue, VerificationReport, Verifier};
pub use bundle::ProofBundle;
pub use ledger::Ledger;
pub use config::ProofnestConfig;

// Re-export anchoring types
pub use anchor::{
    AnchorMethod, AnchorNetwork, AnchorRecord, AnchorScheduler, AnchorService, AnchorStatus,
    OtsCalendarClient,
};
