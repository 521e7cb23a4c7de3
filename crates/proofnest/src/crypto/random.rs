//! Secure random number generation.
//!
//! Draws directly from the operating system's entropy source so that an
//! unavailable source surfaces as an error instead of a panic.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{LedgerError, Result};

/// Fill a buffer with OS randomness.
pub fn try_fill_random(buf: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| LedgerError::KeyGeneration(format!("OS random source unavailable: {e}")))
}

/// Generate a fixed-size array of OS random bytes.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    try_fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random 12-byte nonce (for ChaCha20-Poly1305).
pub fn random_nonce_12() -> Result<[u8; 12]> {
    random_bytes()
}

/// Generate a random 16-byte salt.
pub fn random_salt_16() -> Result<[u8; 16]> {
    random_bytes()
}
