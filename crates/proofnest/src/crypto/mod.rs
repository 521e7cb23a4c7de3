//! Cryptographic primitives for ProofNest.
//!
//! This module provides:
//! - SHA3-256 digests (`Hash256`) for records, identifiers and Merkle nodes
//! - Dilithium3 (post-quantum) and Ed25519 (classical) key pairs
//! - Signing and per-scheme verification routines
//! - HKDF-SHA256 and Argon2id key derivation
//! - ChaCha20-Poly1305 authenticated encryption for key files
//! - Cryptographically secure random number generation

pub mod derivation;
pub mod encoding;
pub mod encryption;
pub mod hash;
pub mod keys;
pub mod random;
pub mod signing;

pub use hash::Hash256;
pub use signing::{SchemeRegistry, SchemeVerifier, SignatureScheme};
