//! Key derivation using HKDF-SHA256.
//!
//! Turns a passphrase-derived master key into purpose-scoped keys, so the
//! same master never encrypts two kinds of material.

use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{LedgerError, Result};

/// Derive a 32-byte child key from a root key and context string.
///
/// Uses HKDF-SHA256 (RFC 5869) with the root key as IKM and
/// the context as info.
pub fn derive_key(root_key_bytes: &[u8; 32], context: &str) -> Result<[u8; 32]> {
    let hk = Hkdf::<Sha256>::new(None, root_key_bytes);
    let mut output = [0u8; 32];
    hk.expand(context.as_bytes(), &mut output)
        .map_err(|e| LedgerError::DerivationFailed(format!("HKDF expand failed: {e}")))?;
    Ok(output)
}

/// Derivation context for the key that seals a signer key file.
pub fn key_file_context() -> String {
    "proofnest/key-file/v1".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hkdf_derivation_deterministic() {
        let root = [42u8; 32];
        let a = derive_key(&root, "test/context").unwrap();
        let b = derive_key(&root, "test/context").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_hkdf_different_context_different_key() {
        let root = [42u8; 32];
        let a = derive_key(&root, &key_file_context()).unwrap();
        let b = derive_key(&root, "proofnest/other").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hkdf_different_root_different_key() {
        let a = derive_key(&[1u8; 32], "same-context").unwrap();
        let b = derive_key(&[2u8; 32], "same-context").unwrap();
        assert_ne!(a, b);
    }
}
