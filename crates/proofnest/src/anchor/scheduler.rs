//! Periodic anchoring of a shared chain.
//!
//! [`BatchPlanner`] decides which records to anchor next; it is pure and
//! knows nothing about time. [`AnchorScheduler`] drives planner and service
//! from an injectable [`Trigger`], so tests step it by hand while a
//! process uses [`IntervalTrigger`].
//!
//! The chain lock is only taken to read self-hashes and to attach confirmed
//! anchors, never across a network call.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::anchor::record::{AnchorRange, AnchorRecord, AnchorStatus};
use crate::anchor::service::AnchorService;
use crate::chain::Chain;
use crate::config::AnchorConfig;
use crate::error::{LedgerError, Result};
use crate::storage::ChainStore;

/// Why the scheduler woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Submit only when a full batch is waiting.
    Regular,
    /// Submit whatever is waiting, even a partial batch.
    Flush,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlanner {
    batch_size: usize,
    max_batch_size: usize,
}

impl BatchPlanner {
    pub fn new(batch_size: usize, max_batch_size: usize) -> Result<Self> {
        if batch_size == 0 || batch_size > max_batch_size {
            return Err(LedgerError::Config(format!(
                "invalid batch sizes: batch_size={batch_size}, max_batch_size={max_batch_size}"
            )));
        }
        Ok(Self {
            batch_size,
            max_batch_size,
        })
    }

    pub fn from_config(config: &AnchorConfig) -> Result<Self> {
        Self::new(config.batch_size, config.max_batch_size)
    }

    /// The next contiguous range starting at `next_index`, if one is due.
    ///
    /// A regular tick takes exactly `batch_size` records once that many
    /// are waiting. A flush takes whatever is waiting, up to
    /// `max_batch_size`.
    pub fn next_batch(&self, next_index: u64, chain_len: u64, tick: Tick) -> Option<AnchorRange> {
        let available = chain_len.saturating_sub(next_index);
        if available == 0 {
            return None;
        }
        let take = match tick {
            Tick::Regular if available < self.batch_size as u64 => return None,
            Tick::Regular => self.batch_size as u64,
            Tick::Flush => available.min(self.max_batch_size as u64),
        };
        AnchorRange::new(next_index, next_index + take - 1).ok()
    }
}

/// Source of scheduler wake-ups. `None` stops the scheduler.
#[async_trait]
pub trait Trigger: Send {
    async fn next_tick(&mut self) -> Option<Tick>;
}

/// Fires a regular tick every `period`, first after one full period.
pub struct IntervalTrigger {
    interval: tokio::time::Interval,
}

impl IntervalTrigger {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Trigger for IntervalTrigger {
    async fn next_tick(&mut self) -> Option<Tick> {
        self.interval.tick().await;
        Some(Tick::Regular)
    }
}

/// Trigger fed by a [`TriggerHandle`]; stops once every handle is dropped.
pub struct ManualTrigger {
    rx: mpsc::Receiver<Tick>,
}

#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<Tick>,
}

impl ManualTrigger {
    pub fn channel(buffer: usize) -> (TriggerHandle, ManualTrigger) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (TriggerHandle { tx }, ManualTrigger { rx })
    }
}

impl TriggerHandle {
    pub async fn send(&self, tick: Tick) -> Result<()> {
        self.tx
            .send(tick)
            .await
            .map_err(|_| LedgerError::AnchorState("anchor scheduler has stopped".into()))
    }
}

#[async_trait]
impl Trigger for ManualTrigger {
    async fn next_tick(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }
}

/// What one scheduler pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub submitted: Option<AnchorRange>,
    pub confirmed: Vec<AnchorRange>,
    pub failed: Vec<AnchorRange>,
}

pub struct AnchorScheduler {
    chain: Arc<RwLock<Chain>>,
    service: AnchorService,
    planner: BatchPlanner,
    store: Option<ChainStore>,
    pending: Vec<AnchorRecord>,
    next_index: u64,
}

impl AnchorScheduler {
    /// Start after the last anchor already attached to `chain`.
    pub fn new(chain: Arc<RwLock<Chain>>, service: AnchorService, planner: BatchPlanner) -> Result<Self> {
        let next_index = {
            let guard = chain
                .read()
                .map_err(|_| LedgerError::AnchorState("chain lock poisoned".into()))?;
            guard.last_anchored_index().map_or(0, |i| i + 1)
        };
        Ok(Self {
            chain,
            service,
            planner,
            store: None,
            pending: Vec::new(),
            next_index,
        })
    }

    /// Persist every anchor state change to `store`.
    pub fn with_store(mut self, store: ChainStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Resume tracking anchors that were pending when the process stopped.
    pub fn resume(&mut self, pending: impl IntoIterator<Item = AnchorRecord>) {
        for record in pending {
            if record.status() == AnchorStatus::Pending {
                self.next_index = self.next_index.max(record.range().end + 1);
                self.pending.push(record);
            }
        }
    }

    pub fn pending(&self) -> &[AnchorRecord] {
        &self.pending
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    fn read_chain(&self) -> Result<RwLockReadGuard<'_, Chain>> {
        self.chain
            .read()
            .map_err(|_| LedgerError::AnchorState("chain lock poisoned".into()))
    }

    fn write_chain(&self) -> Result<RwLockWriteGuard<'_, Chain>> {
        self.chain
            .write()
            .map_err(|_| LedgerError::AnchorState("chain lock poisoned".into()))
    }

    fn persist(&self, record: &AnchorRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save_anchor(record) {
                warn!(range = %record.range(), error = %e, "failed to persist anchor");
            }
        }
    }

    /// Poll outstanding anchors, then submit the next batch if one is due.
    ///
    /// Poll errors are logged and the anchor stays outstanding; an
    /// unreachable network uses up the anchor's poll budget. A failed
    /// anchor rewinds the planner so its records are batched again. A
    /// submission failure is returned.
    pub async fn run_once(&mut self, tick: Tick) -> Result<TickReport> {
        let mut report = TickReport::default();

        for record in std::mem::take(&mut self.pending) {
            let range = record.range();
            let updated = match self.service.poll_status(&record).await {
                Ok(updated) => updated,
                Err(e) => {
                    warn!(range = %range, error = %e, "anchor poll failed, will retry");
                    self.pending.push(record);
                    continue;
                }
            };
            self.persist(&updated);

            match updated.status() {
                AnchorStatus::Pending => self.pending.push(updated),
                AnchorStatus::Confirmed => {
                    let attached = self
                        .write_chain()
                        .and_then(|mut chain| chain.attach_anchor(updated));
                    match attached {
                        Ok(()) => report.confirmed.push(range),
                        Err(e) => {
                            warn!(range = %range, error = %e, "confirmed anchor rejected by chain");
                            report.failed.push(range);
                            self.next_index = self.next_index.min(range.start);
                        }
                    }
                }
                AnchorStatus::Failed => {
                    warn!(range = %range, reason = updated.failure().unwrap_or(""), "anchor failed, re-batching");
                    report.failed.push(range);
                    self.next_index = self.next_index.min(range.start);
                }
            }
        }

        let chain_len = self.read_chain()?.len() as u64;
        if let Some(range) = self.planner.next_batch(self.next_index, chain_len, tick) {
            let hashes = self.read_chain()?.self_hashes(range.start, range.end)?;
            let record = self.service.submit_batch(range.start, &hashes).await?;
            self.persist(&record);
            self.pending.push(record);
            self.next_index = range.end + 1;
            report.submitted = Some(range);
        }

        debug!(?report, pending = self.pending.len(), "anchor tick complete");
        Ok(report)
    }

    /// Run until the trigger stops. Returns anchors still pending.
    pub async fn run<T: Trigger>(mut self, mut trigger: T) -> Vec<AnchorRecord> {
        info!(next_index = self.next_index, "anchor scheduler started");
        while let Some(tick) = trigger.next_tick().await {
            if let Err(e) = self.run_once(tick).await {
                warn!(error = %e, "anchor tick failed");
            }
        }
        info!(pending = self.pending.len(), "anchor scheduler stopped");
        self.pending
    }
}
