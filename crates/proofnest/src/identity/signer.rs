//! Signing capability for an agent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::crypto::encoding::base64_bytes;
use crate::crypto::hash::Hash256;
use crate::crypto::keys::{DilithiumKeyPair, Ed25519KeyPair};
use crate::crypto::signing::{self, SignatureScheme};
use crate::error::{LedgerError, Result};
use crate::identity::agent::AgentIdentity;

/// Which keys to generate for a new agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyOptions {
    /// Also generate a classical Ed25519 key.
    pub classical: bool,
}

impl KeyOptions {
    /// Post-quantum plus classical key.
    pub fn dual() -> Self {
        Self { classical: true }
    }
}

/// Raw signature bytes, serialized as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBytes(#[serde(with = "base64_bytes")] pub Vec<u8>);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Signatures over one message, keyed by scheme name.
///
/// Keys are kept as strings so that a document carrying an unknown scheme
/// still deserializes and the verifier can report it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignatureSet(BTreeMap<String, SignatureBytes>);

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scheme: &str, signature: Vec<u8>) {
        self.0.insert(scheme.to_string(), SignatureBytes(signature));
    }

    pub fn get(&self, scheme: &str) -> Option<&[u8]> {
        self.0.get(scheme).map(SignatureBytes::as_bytes)
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.0.contains_key(scheme)
    }

    pub fn remove(&mut self, scheme: &str) -> Option<Vec<u8>> {
        self.0.remove(scheme).map(|s| s.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_bytes()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Holds an agent's private keys and produces signature sets.
///
/// The private keys are never exposed through the public API. Storage
/// reaches them through crate-private accessors only.
pub struct AgentSigner {
    identity: AgentIdentity,
    pq: DilithiumKeyPair,
    classical: Option<Ed25519KeyPair>,
}

impl AgentSigner {
    /// Generate fresh keys from OS entropy.
    pub fn generate(options: KeyOptions) -> Result<Self> {
        let pq = DilithiumKeyPair::generate()?;
        let classical = if options.classical {
            Some(Ed25519KeyPair::generate()?)
        } else {
            None
        };
        let identity = AgentIdentity::from_public_keys(
            pq.public_key_bytes(),
            classical.as_ref().map(|k| k.verifying_key_bytes().to_vec()),
        )?;
        tracing::debug!(agent = %identity.identifier(), classical = options.classical, "generated agent keys");
        Ok(Self {
            identity,
            pq,
            classical,
        })
    }

    /// Rebuild a signer from stored key material.
    ///
    /// A check message is signed and verified with every key so that a
    /// mismatched public/secret pair is rejected here instead of producing
    /// unverifiable records later.
    pub fn from_key_material(
        pq_public: &[u8],
        pq_secret: &[u8],
        classical_secret: Option<&[u8; 32]>,
    ) -> Result<Self> {
        let pq = DilithiumKeyPair::from_bytes(pq_public, pq_secret)?;
        let classical = classical_secret.map(Ed25519KeyPair::from_signing_key_bytes);
        let identity = AgentIdentity::from_public_keys(
            pq.public_key_bytes(),
            classical.as_ref().map(|k| k.verifying_key_bytes().to_vec()),
        )?;
        let signer = Self {
            identity,
            pq,
            classical,
        };

        let check = Hash256::digest(b"proofnest/key-check");
        let signatures = signer
            .sign(&check)
            .map_err(|e| LedgerError::InvalidKey(format!("dilithium3 key pair mismatch: {e}")))?;
        if let Some(classical) = &signer.classical {
            let sig = signatures
                .get(SignatureScheme::Ed25519.as_str())
                .ok_or_else(|| LedgerError::InvalidKey("ed25519 check signature missing".into()))?;
            signing::verify_ed25519(&classical.verifying_key_bytes(), check.as_bytes(), sig)
                .map_err(|e| LedgerError::InvalidKey(format!("ed25519 key pair mismatch: {e}")))?;
        }
        Ok(signer)
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn has_classical(&self) -> bool {
        self.classical.is_some()
    }

    /// Sign a record hash with every held key.
    ///
    /// The post-quantum signature is verified before returning; a failure
    /// there is reported as `Signing` and no partial set is returned.
    pub fn sign(&self, message: &Hash256) -> Result<SignatureSet> {
        let msg = message.as_bytes();
        let mut set = SignatureSet::new();

        let pq_sig = signing::sign_dilithium(&self.pq, msg);
        signing::verify_dilithium(&self.pq.public_key_bytes(), msg, &pq_sig)
            .map_err(|e| LedgerError::Signing(format!("dilithium3: {e}")))?;
        set.insert(SignatureScheme::Dilithium3.as_str(), pq_sig);

        if let Some(classical) = &self.classical {
            let sig = signing::sign_ed25519(classical.signing_key(), msg);
            set.insert(SignatureScheme::Ed25519.as_str(), sig);
        }
        Ok(set)
    }

    pub(crate) fn pq_public_key_bytes(&self) -> Vec<u8> {
        self.pq.public_key_bytes()
    }

    pub(crate) fn pq_secret_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        self.pq.secret_key_bytes()
    }

    pub(crate) fn classical_secret_key_bytes(&self) -> Option<Zeroizing<[u8; 32]>> {
        self.classical.as_ref().map(Ed25519KeyPair::signing_key_bytes)
    }
}

impl std::fmt::Debug for AgentSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSigner")
            .field("identity", self.identity.identifier())
            .field("classical", &self.classical.is_some())
            .finish_non_exhaustive()
    }
}

/// Generate a new agent: its public identity and its signing capability.
pub fn generate(options: KeyOptions) -> Result<(AgentIdentity, AgentSigner)> {
    let signer = AgentSigner::generate(options)?;
    Ok((signer.identity().clone(), signer))
}
