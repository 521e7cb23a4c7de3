//! Symmetric encryption using ChaCha20-Poly1305 and passphrase-based
//! key derivation using Argon2id.
//!
//! Used for sealing private signing keys at rest in `.pnk` key files.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use crate::crypto::random::random_nonce_12;
use crate::error::{LedgerError, Result};

/// Argon2id parameters for passphrase-based key derivation.
const ARGON2_M_COST: u32 = 65536; // 64 MiB
const ARGON2_T_COST: u32 = 3;
const ARGON2_P_COST: u32 = 4;

/// Derive a 32-byte encryption key from a passphrase and salt using Argon2id.
pub fn derive_passphrase_key(passphrase: &[u8], salt: &[u8; 16]) -> Result<[u8; 32]> {
    let params = Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(32))
        .map_err(|e| LedgerError::DerivationFailed(format!("Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt, &mut output)
        .map_err(|e| LedgerError::DerivationFailed(format!("Argon2 hash: {e}")))?;

    Ok(output)
}

/// Encrypt plaintext with ChaCha20-Poly1305.
///
/// Returns `(nonce, ciphertext)`. The nonce must be stored alongside
/// the ciphertext for decryption.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    let nonce_bytes = random_nonce_12().map_err(|e| LedgerError::EncryptionFailed(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| LedgerError::EncryptionFailed(format!("cipher init: {e}")))?;
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| LedgerError::EncryptionFailed(format!("encrypt: {e}")))?;
    Ok((nonce_bytes.to_vec(), ciphertext))
}

/// Decrypt ciphertext with ChaCha20-Poly1305.
///
/// An authentication failure is reported as `InvalidPassphrase`.
pub fn decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != 12 {
        return Err(LedgerError::DecryptionFailed("nonce must be 12 bytes".into()));
    }
    let nonce = Nonce::from_slice(nonce);
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| LedgerError::DecryptionFailed(format!("cipher init: {e}")))?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| LedgerError::InvalidPassphrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let key = [7u8; 32];
        let (nonce, ct) = encrypt(&key, b"secret key bytes").unwrap();
        assert_eq!(decrypt(&key, &nonce, &ct).unwrap(), b"secret key bytes");
    }

    #[test]
    fn test_decrypt_wrong_key_is_invalid_passphrase() {
        let (nonce, ct) = encrypt(&[7u8; 32], b"secret").unwrap();
        assert!(matches!(
            decrypt(&[8u8; 32], &nonce, &ct),
            Err(LedgerError::InvalidPassphrase)
        ));
    }

    #[test]
    fn test_decrypt_bad_nonce_length() {
        assert!(matches!(
            decrypt(&[7u8; 32], &[0u8; 5], b"x"),
            Err(LedgerError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_passphrase_key_depends_on_salt() {
        let a = derive_passphrase_key(b"pass", &[1u8; 16]).unwrap();
        let b = derive_passphrase_key(b"pass", &[2u8; 16]).unwrap();
        assert_ne!(a, b);
    }
}
