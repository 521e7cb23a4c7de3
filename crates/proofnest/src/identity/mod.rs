//! Agent identity: keys, dual signatures and `did:pn:` identifiers.
//!
//! [`AgentIdentity`] is the public half: the `did:pn:` identifier and the
//! declared public keys. [`AgentSigner`] is the signing capability that
//! wraps the private keys and never exposes them through the ledger API.

pub mod agent;
pub mod signer;

pub use agent::{identifier_for, AgentIdentity, Did, DID_PREFIX};
pub use signer::{generate, AgentSigner, KeyOptions, SignatureBytes, SignatureSet};
