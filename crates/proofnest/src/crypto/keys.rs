//! Dilithium3 and Ed25519 key pair generation.
//!
//! Dilithium3 is the mandatory post-quantum signing key of every agent.
//! Ed25519 is the optional classical key kept for compatibility.

use ed25519_dalek::{SigningKey, VerifyingKey};
use pqcrypto_dilithium::dilithium3;
use pqcrypto_traits::sign::{PublicKey as _, SecretKey as _};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::random;
use crate::error::{LedgerError, Result};

/// An Ed25519 key pair for classical signatures.
///
/// `SigningKey` wipes its secret on drop.
pub struct Ed25519KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Ed25519KeyPair {
    /// Generate a new random Ed25519 key pair from OS entropy.
    pub fn generate() -> Result<Self> {
        let mut seed: [u8; 32] = random::random_bytes()?;
        let signing_key = SigningKey::from_bytes(&seed);
        seed.zeroize();
        let verifying_key = signing_key.verifying_key();
        Ok(Self {
            signing_key,
            verifying_key,
        })
    }

    /// Reconstruct a key pair from raw signing key bytes.
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Reconstruct a verifying key from raw bytes.
    pub fn verifying_key_from_bytes(bytes: &[u8]) -> Result<VerifyingKey> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| LedgerError::InvalidKey("ed25519 public key must be 32 bytes".into()))?;
        VerifyingKey::from_bytes(&arr)
            .map_err(|e| LedgerError::InvalidKey(format!("invalid ed25519 public key: {e}")))
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Return the signing key bytes, wiped when the wrapper drops.
    pub fn signing_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

/// A Dilithium3 key pair for post-quantum signatures.
pub struct DilithiumKeyPair {
    public: dilithium3::PublicKey,
    secret: dilithium3::SecretKey,
}

impl DilithiumKeyPair {
    /// Generate a new Dilithium3 key pair.
    ///
    /// The OS entropy source is tested first so that an unavailable source
    /// is reported as `KeyGeneration` rather than aborting inside the
    /// underlying implementation.
    pub fn generate() -> Result<Self> {
        let _entropy: [u8; 32] = random::random_bytes()?;
        let (public, secret) = dilithium3::keypair();
        Ok(Self { public, secret })
    }

    /// Reconstruct from stored public and secret key bytes.
    pub fn from_bytes(public: &[u8], secret: &[u8]) -> Result<Self> {
        let public = dilithium3::PublicKey::from_bytes(public)
            .map_err(|e| LedgerError::InvalidKey(format!("invalid dilithium3 public key: {e}")))?;
        let secret = dilithium3::SecretKey::from_bytes(secret)
            .map_err(|e| LedgerError::InvalidKey(format!("invalid dilithium3 secret key: {e}")))?;
        Ok(Self { public, secret })
    }

    /// Parse a Dilithium3 public key.
    pub fn public_key_from_bytes(bytes: &[u8]) -> Result<dilithium3::PublicKey> {
        dilithium3::PublicKey::from_bytes(bytes)
            .map_err(|e| LedgerError::InvalidKey(format!("invalid dilithium3 public key: {e}")))
    }

    pub fn public_key(&self) -> &dilithium3::PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &dilithium3::SecretKey {
        &self.secret
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public.as_bytes().to_vec()
    }

    /// Return the secret key bytes, wiped when the wrapper drops.
    pub fn secret_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.secret.as_bytes().to_vec())
    }
}
