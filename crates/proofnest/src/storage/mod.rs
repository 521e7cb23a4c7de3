//! File storage for key files, chains and anchors.
//!
//! The ledger core never depends on this module; it is one possible
//! backend for the CLI and for long-running agents.
//!
//! # Directory layout
//!
//! By convention the data directory is `~/.proofnest/`:
//!
//! ```text
//! ~/.proofnest/
//! ├── config.toml
//! ├── agent.pnk
//! ├── records.jsonl
//! └── anchors/
//!     └── {root[..16]}_{start}-{end}.json
//! ```

pub mod chain_store;
pub mod key_file;

pub use chain_store::ChainStore;
pub use key_file::{load_signer, read_public_identity, save_signer, EncryptionMetadata, KeyFile};
