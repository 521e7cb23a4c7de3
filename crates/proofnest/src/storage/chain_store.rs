//! Chain persistence: an append-only record log plus one file per anchor.
//!
//! Layout under the store root:
//!
//! ```text
//! records.jsonl                      one DecisionRecord per line
//! anchors/{root[..16]}_{s}-{e}.json  latest state of each submitted batch
//! ```
//!
//! Records are only ever appended. Anchor files are rewritten as the
//! batch moves from PENDING to a final state.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::anchor::record::{AnchorRecord, AnchorStatus};
use crate::chain::{Chain, DecisionRecord};
use crate::crypto::hash::Hash256;
use crate::error::{LedgerError, Result};
use crate::identity::AgentIdentity;
use crate::time::Clock;

// ── File format constants ─────────────────────────────────────────────────────

const ANCHOR_FILE_VERSION: u32 = 1;
const RECORDS_FILE: &str = "records.jsonl";
const ANCHORS_DIR: &str = "anchors";

#[derive(Debug, Serialize, Deserialize)]
struct AnchorFile {
    version: u32,
    anchor: AnchorRecord,
}

// ── ChainStore ────────────────────────────────────────────────────────────────

/// Filesystem-backed store for one agent's chain.
///
/// Safe for a single writing process. Nothing here coordinates concurrent
/// writers across processes.
#[derive(Debug, Clone)]
pub struct ChainStore {
    root: PathBuf,
}

impl ChainStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(ANCHORS_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn records_path(&self) -> PathBuf {
        self.root.join(RECORDS_FILE)
    }

    fn anchors_dir(&self) -> PathBuf {
        self.root.join(ANCHORS_DIR)
    }

    fn anchor_path(&self, anchor: &AnchorRecord) -> PathBuf {
        let range = anchor.range();
        self.anchors_dir().join(format!(
            "{}_{}-{}.json",
            root_prefix(anchor.batch_root()),
            range.start,
            range.end
        ))
    }

    // ── Records ──────────────────────────────────────────────────────

    /// Append one record to the log and flush it to disk.
    ///
    /// A write that fails part way is cut back off, so the log never ends
    /// in a partial line.
    pub fn append_record(&self, record: &DecisionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())?;
        let length = file.metadata()?.len();
        if let Err(e) = file.write_all(&line).and_then(|_| file.sync_data()) {
            if let Err(truncate) = file.set_len(length) {
                tracing::error!(error = %truncate, "could not truncate partial record");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Every stored record, in log order. A missing log is an empty chain.
    pub fn load_records(&self) -> Result<Vec<DecisionRecord>> {
        let path = self.records_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(std::fs::File::open(&path)?);
        let mut records = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: DecisionRecord = serde_json::from_str(&line).map_err(|e| {
                LedgerError::InvalidFileFormat(format!("{} line {}: {e}", RECORDS_FILE, n + 1))
            })?;
            records.push(record);
        }
        Ok(records)
    }

    // ── Anchors ──────────────────────────────────────────────────────

    /// Write the anchor's current state, replacing any earlier state of the
    /// same batch. Returns the file written.
    pub fn save_anchor(&self, anchor: &AnchorRecord) -> Result<PathBuf> {
        let file = AnchorFile {
            version: ANCHOR_FILE_VERSION,
            anchor: anchor.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        let path = self.anchor_path(anchor);
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())?;
        std::fs::rename(&tmp_path, &path)?;
        Ok(path)
    }

    /// Every saved anchor, ordered by range start.
    pub fn load_anchors(&self) -> Result<Vec<AnchorRecord>> {
        self.load_anchors_matching(|_| true)
    }

    /// Saved anchors whose batch root is `root`.
    pub fn anchors_for_root(&self, root: &Hash256) -> Result<Vec<AnchorRecord>> {
        let prefix = root_prefix(root);
        Ok(self
            .load_anchors_matching(|name| name.starts_with(&prefix))?
            .into_iter()
            .filter(|a| a.batch_root() == root)
            .collect())
    }

    /// Anchors still waiting for confirmation.
    pub fn pending_anchors(&self) -> Result<Vec<AnchorRecord>> {
        Ok(self
            .load_anchors()?
            .into_iter()
            .filter(|a| a.status() == AnchorStatus::Pending)
            .collect())
    }

    fn load_anchors_matching(&self, keep: impl Fn(&str) -> bool) -> Result<Vec<AnchorRecord>> {
        let mut anchors = Vec::new();
        for entry in std::fs::read_dir(self.anchors_dir())? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".json") || !keep(name) {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            let file: AnchorFile = serde_json::from_slice(&bytes).map_err(|e| {
                LedgerError::InvalidFileFormat(format!("anchor file {name}: {e}"))
            })?;
            if file.version != ANCHOR_FILE_VERSION {
                return Err(LedgerError::UnsupportedVersion {
                    found: file.version,
                    expected: ANCHOR_FILE_VERSION,
                });
            }
            anchors.push(file.anchor);
        }
        anchors.sort_by_key(|a| (a.range().start, a.range().end, a.submitted_at()));
        Ok(anchors)
    }

    // ── Chain ────────────────────────────────────────────────────────

    /// Rebuild the chain owned by `owner` from disk.
    ///
    /// Records are fully re-verified and confirmed anchors re-attached, so
    /// a tampered log fails here instead of producing a chain.
    pub fn load_chain(&self, owner: AgentIdentity, clock: Arc<dyn Clock>) -> Result<Chain> {
        let records = self.load_records()?;
        let confirmed = self
            .load_anchors()?
            .into_iter()
            .filter(|a| a.status() == AnchorStatus::Confirmed)
            .collect();
        let chain = Chain::from_parts(owner, records, confirmed, clock)?;
        tracing::debug!(
            root = %self.root.display(),
            records = chain.len(),
            anchors = chain.anchors().len(),
            "loaded chain"
        );
        Ok(chain)
    }
}

fn root_prefix(root: &Hash256) -> String {
    root.to_hex()[..16].to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
