//! The anchoring network contract.

use async_trait::async_trait;

use crate::anchor::record::{AnchorMethod, ProofBlob};
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};

/// What the network reports for a submitted proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Not final yet. `proof` may have been upgraded with partial progress.
    Pending { proof: ProofBlob },
    Confirmed { proof: ProofBlob, block_height: u64 },
    Failed { reason: String },
}

/// An external timestamping network.
///
/// `submit` hands a batch root to the network and returns the initial
/// proof handle; `status` reports how far that proof has progressed.
/// Transport failures are returned as `AnchorSubmission` so callers can
/// retry them.
#[async_trait]
pub trait AnchorNetwork: Send + Sync {
    fn method(&self) -> AnchorMethod;

    async fn submit(&self, batch_root: &Hash256) -> Result<ProofBlob>;

    async fn status(&self, proof: &ProofBlob) -> Result<NetworkStatus>;
}

/// Direct OP_RETURN embedding.
///
/// There is no transaction builder behind this; every call fails with
/// `AnchorNotImplemented` so it can never produce a handle or a
/// confirmation.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpReturnNetwork;

impl OpReturnNetwork {
    fn not_implemented() -> LedgerError {
        LedgerError::AnchorNotImplemented {
            method: AnchorMethod::OpReturn.as_str().to_string(),
        }
    }
}

#[async_trait]
impl AnchorNetwork for OpReturnNetwork {
    fn method(&self) -> AnchorMethod {
        AnchorMethod::OpReturn
    }

    async fn submit(&self, _batch_root: &Hash256) -> Result<ProofBlob> {
        Err(Self::not_implemented())
    }

    async fn status(&self, _proof: &ProofBlob) -> Result<NetworkStatus> {
        Err(Self::not_implemented())
    }
}
