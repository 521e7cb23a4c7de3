//! Anchor submission and confirmation tracking.
//!
//! The service is the only part of the ledger with a retry policy: network
//! calls are retried with bounded exponential backoff, and a record that
//! stays pending past its poll budget is marked `FAILED`. Nothing here
//! touches a chain; confirmed records are handed back to the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::anchor::calendar::OtsCalendarClient;
use crate::anchor::merkle::merkle_root;
use crate::anchor::network::{AnchorNetwork, NetworkStatus, OpReturnNetwork};
use crate::anchor::record::{AnchorMethod, AnchorRange, AnchorRecord};
use crate::config::AnchorConfig;
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};
use crate::time::now_micros;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    pub initial: Duration,
    pub max: Duration,
}

impl BackoffPolicy {
    pub fn from_config(config: &AnchorConfig) -> Self {
        Self {
            attempts: config.submit_attempts.max(1),
            initial: Duration::from_millis(config.initial_backoff_ms),
            max: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// No waiting between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            initial: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

/// Resolves once the cancel flag reads `true`. A dropped sender can no
/// longer cancel, so the future then never resolves.
async fn cancellation(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct AnchorService {
    network: Arc<dyn AnchorNetwork>,
    backoff: BackoffPolicy,
    max_polls: u32,
    max_batch_size: usize,
}

impl AnchorService {
    pub fn new(network: Arc<dyn AnchorNetwork>, config: &AnchorConfig) -> Self {
        Self {
            network,
            backoff: BackoffPolicy::from_config(config),
            max_polls: config.max_polls.max(1),
            max_batch_size: config.max_batch_size.max(1),
        }
    }

    /// Build the network named by `config.method`.
    pub fn from_config(config: &AnchorConfig) -> Result<Self> {
        config.validate()?;
        let network: Arc<dyn AnchorNetwork> = match config.method {
            AnchorMethod::OpenTimestamps => Arc::new(OtsCalendarClient::from_config(config)?),
            AnchorMethod::OpReturn => Arc::new(OpReturnNetwork),
        };
        Ok(Self::new(network, config))
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn method(&self) -> AnchorMethod {
        self.network.method()
    }

    pub fn network(&self) -> Arc<dyn AnchorNetwork> {
        Arc::clone(&self.network)
    }

    async fn with_retry<T, F, Fut>(&self, what: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut retry = 0;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retry + 1 < self.backoff.attempts => {
                    let delay = self.backoff.delay_for(retry);
                    warn!(error = %e, attempt = retry + 1, ?delay, "{what} failed, retrying");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                Err(e) => {
                    warn!(error = %e, "{what} failed");
                    return Err(e);
                }
            }
        }
    }

    /// Merkle-batch `hashes` (the self-hashes of records `start..`) and
    /// submit the root. Returns a `PENDING` record.
    pub async fn submit_batch(&self, start: u64, hashes: &[Hash256]) -> Result<AnchorRecord> {
        if hashes.is_empty() {
            return Err(LedgerError::AnchorState("cannot anchor an empty batch".into()));
        }
        if hashes.len() > self.max_batch_size {
            return Err(LedgerError::AnchorState(format!(
                "batch of {} exceeds max batch size {}",
                hashes.len(),
                self.max_batch_size
            )));
        }
        let range = AnchorRange::new(start, start + hashes.len() as u64 - 1)?;
        let root = merkle_root(hashes)?;

        let blob = self
            .with_retry("anchor submission", || self.network.submit(&root))
            .await?;
        info!(range = %range, root = %root, method = %self.method(), "anchor batch submitted");
        Ok(AnchorRecord::pending(
            root,
            range,
            self.method(),
            blob,
            now_micros(),
        ))
    }

    /// Query the network once (with transport retries) and return the
    /// record's next state.
    ///
    /// Terminal records are returned unchanged. A poll whose transport
    /// retries are exhausted counts toward the poll budget like a PENDING
    /// answer, so an unreachable network still ends in FAILED. Other
    /// errors are returned and the caller keeps the record as it was.
    pub async fn poll_status(&self, record: &AnchorRecord) -> Result<AnchorRecord> {
        if record.status().is_terminal() {
            debug!(range = %record.range(), status = %record.status(), "anchor already final");
            return Ok(record.clone());
        }

        let status = match self
            .with_retry("anchor status", || self.network.status(record.proof_blob()))
            .await
        {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                let updated = record.clone().note_poll(None)?;
                if updated.poll_attempts() >= self.max_polls {
                    warn!(range = %record.range(), polls = updated.poll_attempts(), "anchor network unreachable, poll budget exhausted");
                    let reason = format!("network unreachable after {} polls: {e}", updated.poll_attempts());
                    return updated.fail(reason);
                }
                return Ok(updated);
            }
            Err(e) => return Err(e),
        };

        match status {
            NetworkStatus::Confirmed {
                proof,
                block_height,
            } => {
                info!(range = %record.range(), block_height, "anchor confirmed");
                record.clone().confirm(proof, block_height)
            }
            NetworkStatus::Pending { proof } => {
                let updated = record.clone().note_poll(Some(proof))?;
                if updated.poll_attempts() >= self.max_polls {
                    warn!(range = %record.range(), polls = updated.poll_attempts(), "anchor poll budget exhausted");
                    let reason = format!("still pending after {} polls", updated.poll_attempts());
                    return updated.fail(reason);
                }
                debug!(range = %record.range(), polls = updated.poll_attempts(), "anchor still pending");
                Ok(updated)
            }
            NetworkStatus::Failed { reason } => {
                warn!(range = %record.range(), reason = %reason, "anchor failed");
                record.clone().fail(reason)
            }
        }
    }

    /// Poll every `poll_interval` until the record is final.
    ///
    /// Stops with `Cancelled` as soon as `cancel` reads `true` (including
    /// mid-request) and with `Timeout` once `timeout` has elapsed.
    pub async fn wait_for_confirmation(
        &self,
        record: &AnchorRecord,
        poll_interval: Duration,
        mut cancel: watch::Receiver<bool>,
        timeout: Duration,
    ) -> Result<AnchorRecord> {
        let polling = async {
            let mut current = record.clone();
            loop {
                tokio::select! {
                    _ = cancellation(&mut cancel) => return Err(LedgerError::Cancelled),
                    next = self.poll_status(&current) => {
                        current = next?;
                    }
                }
                if current.status().is_terminal() {
                    return Ok(current);
                }
                tokio::select! {
                    _ = cancellation(&mut cancel) => return Err(LedgerError::Cancelled),
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
        };

        match tokio::time::timeout(timeout, polling).await {
            Ok(result) => result,
            Err(_) => {
                warn!(range = %record.range(), ?timeout, "gave up waiting for anchor confirmation");
                Err(LedgerError::Timeout(timeout.as_secs()))
            }
        }
    }
}
