//! Public agent identity and DID derivation.
//!
//! The identifier is a pure function of the public key material:
//! `did:pn:` + base58(SHA3-256(domain || pq_public_key || classical_public_key)).

use serde::{Deserialize, Serialize};

use crate::crypto::encoding::{base64_bytes, base64_bytes_opt};
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{DilithiumKeyPair, Ed25519KeyPair};
use crate::crypto::SignatureScheme;
use crate::error::{LedgerError, Result};

/// Prefix of every ProofNest identifier.
pub const DID_PREFIX: &str = "did:pn:";

const DID_DOMAIN: &[u8] = b"proofnest/did/v1";

/// DID-style agent identifier, e.g. `did:pn:7Kf3...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Did(String);

impl Did {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Did {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the identifier for a set of public keys.
///
/// Fails with `InvalidKey` if either key is not a well-formed public key
/// for its scheme.
pub fn identifier_for(pq_public_key: &[u8], classical_public_key: Option<&[u8]>) -> Result<Did> {
    DilithiumKeyPair::public_key_from_bytes(pq_public_key)?;
    if let Some(classical) = classical_public_key {
        Ed25519KeyPair::verifying_key_from_bytes(classical)?;
    }

    let hash = Hash256::digest_parts(&[
        DID_DOMAIN,
        pq_public_key,
        classical_public_key.unwrap_or_default(),
    ]);
    let encoded = bs58::encode(hash.as_bytes()).into_string();
    Ok(Did(format!("{DID_PREFIX}{encoded}")))
}

/// Public identity of an agent. Contains no private key material.
///
/// Deserialization re-derives the identifier and rejects documents whose
/// `identifier` does not match their keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "IdentityWire")]
pub struct AgentIdentity {
    identifier: Did,
    #[serde(with = "base64_bytes")]
    pq_public_key: Vec<u8>,
    #[serde(with = "base64_bytes_opt")]
    classical_public_key: Option<Vec<u8>>,
}

impl AgentIdentity {
    /// Build an identity from its public keys.
    pub fn from_public_keys(
        pq_public_key: Vec<u8>,
        classical_public_key: Option<Vec<u8>>,
    ) -> Result<Self> {
        let identifier = identifier_for(&pq_public_key, classical_public_key.as_deref())?;
        Ok(Self {
            identifier,
            pq_public_key,
            classical_public_key,
        })
    }

    pub fn identifier(&self) -> &Did {
        &self.identifier
    }

    pub fn pq_public_key(&self) -> &[u8] {
        &self.pq_public_key
    }

    pub fn classical_public_key(&self) -> Option<&[u8]> {
        self.classical_public_key.as_deref()
    }

    /// The declared public key for a scheme name, if this identity has one.
    pub fn public_key_for(&self, scheme: &str) -> Option<&[u8]> {
        match SignatureScheme::from_name(scheme)? {
            SignatureScheme::Dilithium3 => Some(&self.pq_public_key),
            SignatureScheme::Ed25519 => self.classical_public_key.as_deref(),
        }
    }

    /// Schemes this identity declares keys for, mandatory scheme first.
    pub fn schemes(&self) -> Vec<SignatureScheme> {
        let mut schemes = vec![SignatureScheme::Dilithium3];
        if self.classical_public_key.is_some() {
            schemes.push(SignatureScheme::Ed25519);
        }
        schemes
    }
}

#[derive(Deserialize)]
struct IdentityWire {
    identifier: Did,
    #[serde(with = "base64_bytes")]
    pq_public_key: Vec<u8>,
    #[serde(default, with = "base64_bytes_opt")]
    classical_public_key: Option<Vec<u8>>,
}

impl TryFrom<IdentityWire> for AgentIdentity {
    type Error = LedgerError;

    fn try_from(wire: IdentityWire) -> Result<Self> {
        let identity = Self::from_public_keys(wire.pq_public_key, wire.classical_public_key)?;
        if identity.identifier != wire.identifier {
            return Err(LedgerError::InvalidKey(format!(
                "identifier {} does not match declared keys (expected {})",
                wire.identifier, identity.identifier
            )));
        }
        Ok(identity)
    }
}
