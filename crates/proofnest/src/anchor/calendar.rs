//! OpenTimestamps calendar client.
//!
//! Submits `SHA-256(batch_root)` to every configured calendar and combines
//! the answers into one detached proof. Upgrades ask each pending
//! calendar for the completed timestamp of its commitment; a `404` means
//! the calendar has not reached a block yet.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::anchor::network::{AnchorNetwork, NetworkStatus};
use crate::anchor::ots::{self, DetachedProof, Timestamp};
use crate::anchor::record::{AnchorMethod, ProofBlob, OTS_SYSTEM};
use crate::config::AnchorConfig;
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};

const ACCEPT: &str = "application/vnd.opentimestamps.v1";
const USER_AGENT: &str = concat!("proofnest/", env!("CARGO_PKG_VERSION"));

fn normalize(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

pub struct OtsCalendarClient {
    calendars: Vec<String>,
    http_client: reqwest::Client,
}

impl OtsCalendarClient {
    pub fn new(calendars: Vec<String>, request_timeout: Duration) -> Result<Self> {
        if calendars.is_empty() {
            return Err(LedgerError::Config("no OpenTimestamps calendars configured".into()));
        }
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| LedgerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            calendars: calendars.iter().map(|c| normalize(c)).collect(),
            http_client,
        })
    }

    pub fn from_config(config: &AnchorConfig) -> Result<Self> {
        Self::new(
            config.calendar_urls.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn calendars(&self) -> &[String] {
        &self.calendars
    }

    async fn submit_to(&self, calendar: &str, digest: &[u8; 32]) -> Result<Timestamp> {
        let url = format!("{calendar}/digest");
        let response = self
            .http_client
            .post(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .body(digest.to_vec())
            .send()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LedgerError::AnchorSubmission(format!("{url} returned {status}")));
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;
        Timestamp::from_bytes(&body)
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url} returned a malformed timestamp: {e}")))
    }

    /// Fetch the upgraded timestamp for `commitment`, or `None` if the
    /// calendar has nothing newer yet.
    async fn fetch_upgrade(&self, calendar: &str, commitment: &[u8]) -> Result<Option<Timestamp>> {
        let url = format!("{calendar}/timestamp/{}", hex::encode(commitment));
        let response = self
            .http_client
            .get(&url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| LedgerError::AnchorSubmission(format!("{url}: {e}")))?;
                let ts = Timestamp::from_bytes(&body).map_err(|e| {
                    LedgerError::AnchorSubmission(format!("{url} returned a malformed timestamp: {e}"))
                })?;
                Ok(Some(ts))
            }
            status => Err(LedgerError::AnchorSubmission(format!("{url} returned {status}"))),
        }
    }

    fn is_known_calendar(&self, uri: &str) -> bool {
        let uri = normalize(uri);
        self.calendars.iter().any(|c| *c == uri)
    }
}

#[async_trait]
impl AnchorNetwork for OtsCalendarClient {
    fn method(&self) -> AnchorMethod {
        AnchorMethod::OpenTimestamps
    }

    async fn submit(&self, batch_root: &Hash256) -> Result<ProofBlob> {
        let digest = ots::sha256(batch_root.as_bytes());
        let mut combined: Option<Timestamp> = None;
        let mut source = None;
        let mut last_error = None;

        for calendar in &self.calendars {
            match self.submit_to(calendar, &digest).await {
                Ok(ts) => {
                    debug!(calendar = %calendar, "calendar accepted digest");
                    source.get_or_insert_with(|| calendar.clone());
                    match combined.as_mut() {
                        Some(existing) => existing.merge(&ts),
                        None => combined = Some(ts),
                    }
                }
                Err(e) => {
                    warn!(calendar = %calendar, error = %e, "calendar submission failed");
                    last_error = Some(e);
                }
            }
        }

        match combined {
            Some(timestamp) => {
                let proof = DetachedProof::new(digest, timestamp);
                info!(root = %batch_root, "submitted batch root to OpenTimestamps");
                Ok(ProofBlob::opentimestamps(proof.to_bytes(), source))
            }
            None => Err(last_error.unwrap_or_else(|| {
                LedgerError::AnchorSubmission("no calendar accepted the digest".into())
            })),
        }
    }

    async fn status(&self, proof: &ProofBlob) -> Result<NetworkStatus> {
        if proof.system != OTS_SYSTEM {
            return Err(LedgerError::AnchorState(format!(
                "cannot poll a {} proof with the OpenTimestamps client",
                proof.system
            )));
        }
        let mut detached = match DetachedProof::parse(&proof.data) {
            Ok(p) => p,
            Err(e) => {
                return Ok(NetworkStatus::Failed {
                    reason: e.to_string(),
                })
            }
        };

        // Reports the proof's own state; nothing here checks the block.
        if let Some(height) = detached.earliest_bitcoin_height() {
            return Ok(NetworkStatus::Confirmed {
                proof: proof.clone(),
                block_height: height,
            });
        }

        let pending = detached.pending_commitments();
        if pending.is_empty() {
            return Ok(NetworkStatus::Failed {
                reason: "proof has neither pending nor bitcoin attestations".into(),
            });
        }

        let mut answered = 0usize;
        let mut upgraded = false;
        let mut last_error = None;
        for (uri, commitment) in pending {
            if !self.is_known_calendar(&uri) {
                warn!(calendar = %uri, "skipping pending attestation from unconfigured calendar");
                continue;
            }
            match self.fetch_upgrade(&normalize(&uri), &commitment).await {
                Ok(Some(ts)) => {
                    answered += 1;
                    let digest = detached.digest;
                    upgraded |= detached.timestamp.merge_at(&digest, &commitment, &ts);
                }
                Ok(None) => answered += 1,
                Err(e) => {
                    warn!(calendar = %uri, error = %e, "calendar upgrade failed");
                    last_error = Some(e);
                }
            }
        }

        if answered == 0 {
            return Err(last_error.unwrap_or_else(|| {
                LedgerError::AnchorSubmission("no configured calendar holds this proof".into())
            }));
        }

        let blob = if upgraded {
            ProofBlob::opentimestamps(detached.to_bytes(), proof.source.clone())
        } else {
            proof.clone()
        };
        match detached.earliest_bitcoin_height() {
            Some(block_height) => {
                info!(block_height, "OpenTimestamps proof reached a bitcoin block");
                Ok(NetworkStatus::Confirmed {
                    proof: blob,
                    block_height,
                })
            }
            None => Ok(NetworkStatus::Pending { proof: blob }),
        }
    }
}
