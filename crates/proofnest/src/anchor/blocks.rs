//! Bitcoin block header lookups.
//!
//! A Bitcoin attestation inside an OpenTimestamps proof only claims that
//! some message is the merkle root of the block at a height. A
//! [`BlockSource`] answers what that merkle root actually is, which is the
//! only thing that turns an attestation into a confirmation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{LedgerError, Result};

/// Public Esplora API.
pub const DEFAULT_ESPLORA_URL: &str = "https://blockstream.info/api";

/// Source of Bitcoin block merkle roots.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Merkle root of the main-chain block at `height`, in the internal
    /// byte order OpenTimestamps commits to. `None` if there is no such
    /// block yet.
    async fn merkle_root(&self, height: u64) -> Result<Option<[u8; 32]>>;
}

#[derive(Debug, Deserialize)]
struct EsploraBlock {
    merkle_root: String,
}

/// [`BlockSource`] backed by an Esplora HTTP API.
pub struct EsploraClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl EsploraClient {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(LedgerError::Config("empty block explorer url".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LedgerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            base_url,
            http_client,
        })
    }

    async fn get(&self, url: &str) -> Result<Option<reqwest::Response>> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response)),
            status => Err(LedgerError::AnchorSubmission(format!("{url} returned {status}"))),
        }
    }
}

#[async_trait]
impl BlockSource for EsploraClient {
    async fn merkle_root(&self, height: u64) -> Result<Option<[u8; 32]>> {
        let url = format!("{}/block-height/{height}", self.base_url);
        let Some(response) = self.get(&url).await? else {
            return Ok(None);
        };
        let block_hash = response
            .text()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;

        let url = format!("{}/block/{}", self.base_url, block_hash.trim());
        let Some(response) = self.get(&url).await? else {
            return Ok(None);
        };
        let body = response
            .bytes()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;
        let block: EsploraBlock = serde_json::from_slice(&body)
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;

        // Explorers display the root byte-reversed.
        let mut root: [u8; 32] = hex::decode(&block.merkle_root)
            .ok()
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| {
                LedgerError::AnchorSubmission(format!("{url} returned a malformed merkle root"))
            })?;
        root.reverse();
        debug!(height, "fetched block merkle root");
        Ok(Some(root))
    }
}
