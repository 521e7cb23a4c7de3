//! .pnk file format: encrypted signer key storage.
//!
//! A `.pnk` file holds an agent's private keys encrypted with
//! ChaCha20-Poly1305 under a key derived from a passphrase via Argon2id
//! and HKDF-SHA256, next to the public identity in plaintext so it can be
//! inspected without the passphrase.
//!
//! File format (JSON):
//! ```json
//! {
//!     "version": 1,
//!     "format": "pnk-v1",
//!     "encryption": {
//!         "algorithm": "chacha20-poly1305",
//!         "kdf": "argon2id",
//!         "salt": "<base64-16-bytes>",
//!         "nonce": "<base64-12-bytes>"
//!     },
//!     "encrypted_keys": "<base64-ciphertext>",
//!     "identity": { ... AgentIdentity ... }
//! }
//! ```
//!
//! On Unix the file is created with mode `0600`.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::crypto::encoding::{from_base64, to_base64};
use crate::crypto::{derivation, encryption, random};
use crate::error::{LedgerError, Result};
use crate::identity::{AgentIdentity, AgentSigner};

// ── File format constants ─────────────────────────────────────────────────────

const PNK_VERSION: u32 = 1;
const PNK_FORMAT: &str = "pnk-v1";
const PNK_ALGORITHM: &str = "chacha20-poly1305";
const PNK_KDF: &str = "argon2id";

// ── On-disk structures ────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct KeyFile {
    pub version: u32,
    pub format: String,
    pub encryption: EncryptionMetadata,
    /// Base64 ciphertext of the private key material.
    pub encrypted_keys: String,
    /// Public identity (no private key material).
    pub identity: AgentIdentity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EncryptionMetadata {
    pub algorithm: String,
    pub kdf: String,
    pub salt: String,
    pub nonce: String,
}

/// Private key material, serialized and then encrypted.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct PrivateKeys {
    pq_secret_b64: String,
    classical_secret_b64: Option<String>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Save a signer's keys to a `.pnk` file, encrypted under `passphrase`.
///
/// The file is written atomically through a sibling temp file, so a reader
/// never sees a partial write.
pub fn save_signer(signer: &AgentSigner, path: &Path, passphrase: &str) -> Result<()> {
    let private = PrivateKeys {
        pq_secret_b64: to_base64(&signer.pq_secret_key_bytes()),
        classical_secret_b64: signer
            .classical_secret_key_bytes()
            .map(|bytes| to_base64(&bytes[..])),
    };
    let plaintext = Zeroizing::new(serde_json::to_vec(&private)?);

    // passphrase -> Argon2id(passphrase, salt) -> master
    // HKDF-SHA256(master, key-file context) -> encryption key
    let salt = random::random_salt_16()?;
    let master = Zeroizing::new(encryption::derive_passphrase_key(passphrase.as_bytes(), &salt)?);
    let key = Zeroizing::new(derivation::derive_key(&master, &derivation::key_file_context())?);
    let (nonce, ciphertext) = encryption::encrypt(&key, &plaintext)?;

    let file = KeyFile {
        version: PNK_VERSION,
        format: PNK_FORMAT.to_string(),
        encryption: EncryptionMetadata {
            algorithm: PNK_ALGORITHM.to_string(),
            kdf: PNK_KDF.to_string(),
            salt: to_base64(&salt),
            nonce: to_base64(&nonce),
        },
        encrypted_keys: to_base64(&ciphertext),
        identity: signer.identity().clone(),
    };

    let json = serde_json::to_string_pretty(&file)?;
    write_private(path, json.as_bytes())?;
    tracing::debug!(path = %path.display(), identity = %signer.identity().identifier(), "saved key file");
    Ok(())
}

/// Load a signer from a `.pnk` file.
///
/// A wrong passphrase fails AEAD authentication and is reported as
/// `InvalidPassphrase`. The restored keys must re-derive the stored identity.
pub fn load_signer(path: &Path, passphrase: &str) -> Result<AgentSigner> {
    let file = read_key_file(path)?;

    let salt: [u8; 16] = decode(&file.encryption.salt, "salt")?
        .try_into()
        .map_err(|_| LedgerError::InvalidFileFormat("salt must be 16 bytes".into()))?;
    let nonce = decode(&file.encryption.nonce, "nonce")?;
    let ciphertext = decode(&file.encrypted_keys, "ciphertext")?;

    let master = Zeroizing::new(encryption::derive_passphrase_key(passphrase.as_bytes(), &salt)?);
    let key = Zeroizing::new(derivation::derive_key(&master, &derivation::key_file_context())?);
    let plaintext = Zeroizing::new(encryption::decrypt(&key, &nonce, &ciphertext)?);

    let private: PrivateKeys = serde_json::from_slice(&plaintext)
        .map_err(|e| LedgerError::InvalidFileFormat(format!("key data: {e}")))?;
    let pq_secret = Zeroizing::new(
        from_base64(&private.pq_secret_b64)
            .map_err(|e| LedgerError::InvalidKey(format!("invalid dilithium3 secret: {e}")))?,
    );
    let classical_secret = match &private.classical_secret_b64 {
        Some(b64) => {
            let mut bytes = from_base64(b64)
                .map_err(|e| LedgerError::InvalidKey(format!("invalid ed25519 secret: {e}")))?;
            let key: std::result::Result<[u8; 32], _> = bytes.as_slice().try_into();
            bytes.zeroize();
            let key =
                key.map_err(|_| LedgerError::InvalidKey("ed25519 secret must be 32 bytes".into()))?;
            Some(Zeroizing::new(key))
        }
        None => None,
    };

    let signer = AgentSigner::from_key_material(
        file.identity.pq_public_key(),
        &pq_secret,
        classical_secret.as_deref(),
    )?;
    if signer.identity() != &file.identity {
        return Err(LedgerError::InvalidFileFormat(
            "stored keys do not match the stored identity".into(),
        ));
    }
    Ok(signer)
}

/// Read the public identity without the passphrase.
pub fn read_public_identity(path: &Path) -> Result<AgentIdentity> {
    Ok(read_key_file(path)?.identity)
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn read_key_file(path: &Path) -> Result<KeyFile> {
    if !path.exists() {
        return Err(LedgerError::NotFound(format!(
            "key file not found: {}",
            path.display()
        )));
    }
    let bytes = std::fs::read(path)?;
    let file: KeyFile = serde_json::from_slice(&bytes)
        .map_err(|e| LedgerError::InvalidFileFormat(format!("failed to parse .pnk file: {e}")))?;
    if file.version != PNK_VERSION || file.format != PNK_FORMAT {
        return Err(LedgerError::InvalidFileFormat(format!(
            "unsupported .pnk file version={} format={}",
            file.version, file.format
        )));
    }
    Ok(file)
}

fn decode(value: &str, what: &str) -> Result<Vec<u8>> {
    from_base64(value).map_err(|e| LedgerError::InvalidFileFormat(format!("invalid {what} base64: {e}")))
}

/// Write `data` to `path` atomically, readable only by the owner.
fn write_private(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("pnk.tmp");

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(&tmp_path)?;
    file.write_all(data)?;
    file.sync_all()?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
