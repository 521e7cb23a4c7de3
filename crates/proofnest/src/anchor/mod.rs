//! External anchoring of chain segments.
//!
//! Records are batched into a Merkle root ([`merkle`]), the root is
//! submitted to a timestamping network ([`network`], [`calendar`]) and the
//! resulting proof is tracked until it is final ([`service`]). The
//! [`scheduler`] runs this periodically against a shared chain.
//! [`blocks`] checks Bitcoin attestations against real block headers.
//!
//! Anchoring only ever adds to a chain that is already valid. A failure
//! here never touches the chain's records.

pub mod blocks;
pub mod calendar;
pub mod merkle;
pub mod network;
pub mod ots;
pub mod record;
pub mod scheduler;
pub mod service;

pub use blocks::{BlockSource, EsploraClient};
pub use calendar::OtsCalendarClient;
pub use merkle::{merkle_root, MerkleProof};
pub use network::{AnchorNetwork, NetworkStatus, OpReturnNetwork};
pub use record::{AnchorMethod, AnchorRange, AnchorRecord, AnchorStatus, ProofBlob};
pub use scheduler::{
    AnchorScheduler, BatchPlanner, IntervalTrigger, ManualTrigger, Tick, TickReport, Trigger,
    TriggerHandle,
};
pub use service::{AnchorService, BackoffPolicy};
