//! Append-only, hash-linked decision chains.

#[allow(clippy::module_inception)]
pub mod chain;
pub mod payload;
pub mod record;

pub use chain::{Chain, Head, RecordRange};
pub use payload::{Actor, ActorKind, DecisionPayload, RiskLevel};
pub use record::{compute_self_hash, content_hash, DecisionRecord, GENESIS_HASH};
