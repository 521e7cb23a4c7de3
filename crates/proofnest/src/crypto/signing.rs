//! Signature schemes and per-scheme verification.
//!
//! Verification is polymorphic over the scheme: a [`SchemeRegistry`] maps
//! each scheme name to a [`SchemeVerifier`]. Dilithium3 is mandatory on
//! every record; Ed25519 is strictly additive.

use std::collections::BTreeMap;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::DetachedSignature as _;
use serde::{Deserialize, Serialize};

use crate::crypto::keys::{DilithiumKeyPair, Ed25519KeyPair};

/// Supported signature schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureScheme {
    /// Post-quantum lattice signature (ML-DSA-65 class). Mandatory.
    Dilithium3,
    /// Classical Ed25519. Optional, deprecated path.
    Ed25519,
}

impl SignatureScheme {
    /// The scheme every record must carry.
    pub const MANDATORY: Self = Self::Dilithium3;

    /// Return the stable scheme name used as the signature map key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dilithium3 => "dilithium3",
            Self::Ed25519 => "ed25519",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "dilithium3" => Some(Self::Dilithium3),
            "ed25519" => Some(Self::Ed25519),
            _ => None,
        }
    }

    pub fn is_post_quantum(&self) -> bool {
        matches!(self, Self::Dilithium3)
    }
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a signature did not verify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyFailure {
    MalformedKey(String),
    MalformedSignature(String),
    Mismatch,
}

impl std::fmt::Display for VerifyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedKey(e) => write!(f, "malformed public key: {e}"),
            Self::MalformedSignature(e) => write!(f, "malformed signature: {e}"),
            Self::Mismatch => f.write_str("signature does not verify"),
        }
    }
}

/// Sign a message with Ed25519. Returns 64 signature bytes.
pub fn sign_ed25519(signing_key: &SigningKey, message: &[u8]) -> Vec<u8> {
    signing_key.sign(message).to_bytes().to_vec()
}

/// Verify an Ed25519 signature given raw key and signature bytes.
pub fn verify_ed25519(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerifyFailure> {
    let key = Ed25519KeyPair::verifying_key_from_bytes(public_key)
        .map_err(|e| VerifyFailure::MalformedKey(e.to_string()))?;
    let sig = Signature::from_slice(signature)
        .map_err(|e| VerifyFailure::MalformedSignature(e.to_string()))?;
    key.verify(message, &sig).map_err(|_| VerifyFailure::Mismatch)
}

/// Sign a message with Dilithium3 (detached signature).
pub fn sign_dilithium(key_pair: &DilithiumKeyPair, message: &[u8]) -> Vec<u8> {
    dilithium3::detached_sign(message, key_pair.secret_key())
        .as_bytes()
        .to_vec()
}

/// Verify a detached Dilithium3 signature given raw key and signature bytes.
pub fn verify_dilithium(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), VerifyFailure> {
    let key = DilithiumKeyPair::public_key_from_bytes(public_key)
        .map_err(|e| VerifyFailure::MalformedKey(e.to_string()))?;
    if signature.len() != dilithium3::signature_bytes() {
        return Err(VerifyFailure::MalformedSignature(format!(
            "expected {} bytes, got {}",
            dilithium3::signature_bytes(),
            signature.len()
        )));
    }
    let sig = dilithium3::DetachedSignature::from_bytes(signature)
        .map_err(|e| VerifyFailure::MalformedSignature(e.to_string()))?;
    dilithium3::verify_detached_signature(&sig, message, &key).map_err(|_| VerifyFailure::Mismatch)
}

/// A verification routine for one signature scheme.
pub trait SchemeVerifier: Send + Sync {
    fn scheme(&self) -> SignatureScheme;
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8])
        -> Result<(), VerifyFailure>;
}

struct Dilithium3Verifier;

impl SchemeVerifier for Dilithium3Verifier {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Dilithium3
    }

    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), VerifyFailure> {
        verify_dilithium(public_key, message, signature)
    }
}

struct Ed25519Verifier;

impl SchemeVerifier for Ed25519Verifier {
    fn scheme(&self) -> SignatureScheme {
        SignatureScheme::Ed25519
    }

    fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), VerifyFailure> {
        verify_ed25519(public_key, message, signature)
    }
}

/// Mapping from scheme name to verification routine.
pub struct SchemeRegistry {
    verifiers: BTreeMap<&'static str, Box<dyn SchemeVerifier>>,
}

impl SchemeRegistry {
    /// A registry with no schemes at all.
    pub fn empty() -> Self {
        Self {
            verifiers: BTreeMap::new(),
        }
    }

    /// Register (or replace) the routine for a scheme.
    pub fn register(&mut self, verifier: Box<dyn SchemeVerifier>) {
        self.verifiers.insert(verifier.scheme().as_str(), verifier);
    }

    /// Look up the routine for a scheme name.
    pub fn get(&self, name: &str) -> Option<&dyn SchemeVerifier> {
        self.verifiers.get(name).map(|v| v.as_ref())
    }

    pub fn schemes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.verifiers.keys().copied()
    }
}

impl Default for SchemeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(Dilithium3Verifier));
        registry.register(Box::new(Ed25519Verifier));
        registry
    }
}
