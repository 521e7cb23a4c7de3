//! OpenTimestamps proof encoding.
//!
//! A detached proof is the magic header, a major version, the file-hash
//! operation and digest, followed by a timestamp tree. Every node of the
//! tree is a list of items; all but the last are prefixed with `0xff`. An
//! item is either an attestation (`0x00`, 8-byte tag, length-prefixed
//! payload) or an operation followed by the sub-tree for its result.
//!
//! Parsing is purely structural. Walking the tree evaluates operations so
//! that pending commitments and Bitcoin attestations can be located.

use sha2::{Digest, Sha256};
use sha3::Keccak256;

use crate::error::{LedgerError, Result};

pub const HEADER_MAGIC: &[u8] =
    b"\x00OpenTimestamps\x00\x00Proof\x00\xbf\x89\xe2\xe8\x84\xe8\x92\x94";
pub const MAJOR_VERSION: u64 = 1;

/// Shortest byte string accepted as a proof before parsing.
pub const MIN_PROOF_LEN: usize = 50;

pub const BITCOIN_TAG: [u8; 8] = [0x05, 0x88, 0x96, 0x0d, 0x73, 0xd7, 0x19, 0x01];
pub const PENDING_TAG: [u8; 8] = [0x83, 0xdf, 0xe3, 0x0d, 0x2e, 0xf9, 0x0c, 0x8e];

const TAG_ATTESTATION: u8 = 0x00;
const TAG_FORK: u8 = 0xff;
const OP_SHA1: u8 = 0x02;
const OP_RIPEMD160: u8 = 0x03;
const OP_SHA256: u8 = 0x08;
const OP_KECCAK256: u8 = 0x67;
const OP_APPEND: u8 = 0xf0;
const OP_PREPEND: u8 = 0xf1;

const MAX_DEPTH: usize = 256;
const MAX_MSG_LEN: usize = 4096;
const MAX_PAYLOAD_LEN: usize = 8192;
const MAX_URI_LEN: usize = 1000;

fn malformed(reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidFileFormat(format!("opentimestamps: {}", reason.into()))
}

// ── Wire primitives ─────────────────────────────────────────────────

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| malformed("unexpected end of proof"))?;
        self.pos += 1;
        Ok(b)
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| malformed("unexpected end of proof"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn varuint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let b = self.u8()?;
            if shift > 63 {
                return Err(malformed("varuint overflow"));
            }
            value |= u64::from(b & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn varbytes(&mut self, max: usize) -> Result<&'a [u8]> {
        let len = self.varuint()?;
        if len > max as u64 {
            return Err(malformed(format!("field of {len} bytes exceeds {max}")));
        }
        self.bytes(len as usize)
    }

    fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }
}

fn write_varuint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let b = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(b);
            return;
        }
        out.push(b | 0x80);
    }
}

fn write_varbytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varuint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

// ── Tree types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Sha1,
    Ripemd160,
    Sha256,
    Keccak256,
    Append(Vec<u8>),
    Prepend(Vec<u8>),
}

impl Op {
    fn tag(&self) -> u8 {
        match self {
            Self::Sha1 => OP_SHA1,
            Self::Ripemd160 => OP_RIPEMD160,
            Self::Sha256 => OP_SHA256,
            Self::Keccak256 => OP_KECCAK256,
            Self::Append(_) => OP_APPEND,
            Self::Prepend(_) => OP_PREPEND,
        }
    }

    /// Apply the operation to `msg`.
    ///
    /// Returns `None` for SHA-1 and RIPEMD-160, which are parsed but not
    /// evaluated, and when the result would exceed the message size limit.
    pub fn apply(&self, msg: &[u8]) -> Option<Vec<u8>> {
        let out = match self {
            Self::Sha256 => Sha256::digest(msg).to_vec(),
            Self::Keccak256 => Keccak256::digest(msg).to_vec(),
            Self::Append(arg) => [msg, arg.as_slice()].concat(),
            Self::Prepend(arg) => [arg.as_slice(), msg].concat(),
            Self::Sha1 | Self::Ripemd160 => return None,
        };
        (out.len() <= MAX_MSG_LEN).then_some(out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attestation {
    /// Committed in the Bitcoin block header at `height`.
    Bitcoin { height: u64 },
    /// Awaiting aggregation by the calendar at `uri`.
    Pending { uri: String },
    Unknown { tag: [u8; 8], payload: Vec<u8> },
}

impl Attestation {
    fn parse(r: &mut Reader<'_>) -> Result<Self> {
        let tag: [u8; 8] = r
            .bytes(8)?
            .try_into()
            .map_err(|_| malformed("attestation tag"))?;
        let payload = r.varbytes(MAX_PAYLOAD_LEN)?;
        let mut p = Reader::new(payload);
        let attestation = match tag {
            BITCOIN_TAG => Self::Bitcoin {
                height: p.varuint()?,
            },
            PENDING_TAG => {
                let uri = p.varbytes(MAX_URI_LEN)?;
                if !uri
                    .iter()
                    .all(|c| c.is_ascii_alphanumeric() || b"-._/:".contains(c))
                {
                    return Err(malformed("pending attestation URI has invalid characters"));
                }
                Self::Pending {
                    uri: String::from_utf8_lossy(uri).into_owned(),
                }
            }
            _ => {
                return Ok(Self::Unknown {
                    tag,
                    payload: payload.to_vec(),
                })
            }
        };
        if !p.is_empty() {
            return Err(malformed("trailing bytes in attestation payload"));
        }
        Ok(attestation)
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let mut payload = Vec::new();
        let tag = match self {
            Self::Bitcoin { height } => {
                write_varuint(&mut payload, *height);
                BITCOIN_TAG
            }
            Self::Pending { uri } => {
                write_varbytes(&mut payload, uri.as_bytes());
                PENDING_TAG
            }
            Self::Unknown { tag, payload: raw } => {
                payload.extend_from_slice(raw);
                *tag
            }
        };
        out.push(TAG_ATTESTATION);
        out.extend_from_slice(&tag);
        write_varbytes(out, &payload);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Item {
    Attestation(Attestation),
    Op(Op, Timestamp),
}

/// A node of the timestamp tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timestamp {
    pub items: Vec<Item>,
}

impl Timestamp {
    /// Parse a bare timestamp, as returned by a calendar.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = Reader::new(data);
        let ts = Self::parse(&mut r, 0)?;
        if !r.is_empty() {
            return Err(malformed("trailing bytes after timestamp"));
        }
        Ok(ts)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }

    fn parse(r: &mut Reader<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(malformed("timestamp tree too deep"));
        }
        let mut items = Vec::new();
        loop {
            let tag = r.u8()?;
            if tag == TAG_FORK {
                let tag = r.u8()?;
                items.push(Self::parse_item(r, tag, depth)?);
            } else {
                items.push(Self::parse_item(r, tag, depth)?);
                return Ok(Self { items });
            }
        }
    }

    fn parse_item(r: &mut Reader<'_>, tag: u8, depth: usize) -> Result<Item> {
        if tag == TAG_ATTESTATION {
            return Ok(Item::Attestation(Attestation::parse(r)?));
        }
        let op = match tag {
            OP_SHA1 => Op::Sha1,
            OP_RIPEMD160 => Op::Ripemd160,
            OP_SHA256 => Op::Sha256,
            OP_KECCAK256 => Op::Keccak256,
            OP_APPEND => Op::Append(r.varbytes(MAX_MSG_LEN)?.to_vec()),
            OP_PREPEND => Op::Prepend(r.varbytes(MAX_MSG_LEN)?.to_vec()),
            other => return Err(malformed(format!("unknown operation 0x{other:02x}"))),
        };
        let sub = Self::parse(r, depth + 1)?;
        Ok(Item::Op(op, sub))
    }

    fn serialize(&self, out: &mut Vec<u8>) {
        let last = self.items.len().saturating_sub(1);
        for (i, item) in self.items.iter().enumerate() {
            if i < last {
                out.push(TAG_FORK);
            }
            match item {
                Item::Attestation(a) => a.serialize(out),
                Item::Op(op, sub) => {
                    out.push(op.tag());
                    if let Op::Append(arg) | Op::Prepend(arg) = op {
                        write_varbytes(out, arg);
                    }
                    sub.serialize(out);
                }
            }
        }
    }

    /// Every attestation in the tree, without evaluating operations.
    pub fn all_attestations(&self) -> Vec<&Attestation> {
        let mut out = Vec::new();
        self.collect_attestations(&mut out);
        out
    }

    fn collect_attestations<'a>(&'a self, out: &mut Vec<&'a Attestation>) {
        for item in &self.items {
            match item {
                Item::Attestation(a) => out.push(a),
                Item::Op(_, sub) => sub.collect_attestations(out),
            }
        }
    }

    /// Visit each attestation reachable by evaluation, with the message it
    /// commits to. Sub-trees under non-evaluable operations are skipped.
    pub fn walk<'a>(&'a self, msg: &[u8], visit: &mut dyn FnMut(&[u8], &'a Attestation)) {
        for item in &self.items {
            match item {
                Item::Attestation(a) => visit(msg, a),
                Item::Op(op, sub) => {
                    if let Some(next) = op.apply(msg) {
                        sub.walk(&next, visit);
                    }
                }
            }
        }
    }

    /// `(calendar uri, commitment)` for every pending attestation.
    pub fn pending_commitments(&self, msg: &[u8]) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        self.walk(msg, &mut |m: &[u8], a: &Attestation| {
            if let Attestation::Pending { uri } = a {
                out.push((uri.clone(), m.to_vec()));
            }
        });
        out
    }

    /// Block heights of all evaluable Bitcoin attestations.
    pub fn bitcoin_heights(&self, msg: &[u8]) -> Vec<u64> {
        let mut out = Vec::new();
        self.walk(msg, &mut |_: &[u8], a: &Attestation| {
            if let Attestation::Bitcoin { height } = a {
                out.push(*height);
            }
        });
        out
    }

    /// `(block height, attested message)` for every evaluable Bitcoin
    /// attestation.
    pub fn bitcoin_commitments(&self, msg: &[u8]) -> Vec<(u64, Vec<u8>)> {
        let mut out = Vec::new();
        self.walk(msg, &mut |m: &[u8], a: &Attestation| {
            if let Attestation::Bitcoin { height } = a {
                out.push((*height, m.to_vec()));
            }
        });
        out
    }

    /// Add the items of `other` that this node does not already have.
    pub fn merge(&mut self, other: &Timestamp) {
        for item in &other.items {
            if !self.items.contains(item) {
                self.items.push(item.clone());
            }
        }
    }

    /// Merge `other` into the first node whose message equals `target`.
    pub fn merge_at(&mut self, msg: &[u8], target: &[u8], other: &Timestamp) -> bool {
        if msg == target {
            self.merge(other);
            return true;
        }
        for item in &mut self.items {
            if let Item::Op(op, sub) = item {
                if let Some(next) = op.apply(msg) {
                    if sub.merge_at(&next, target, other) {
                        return true;
                    }
                }
            }
        }
        false
    }
}

/// A detached proof over a SHA-256 file digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedProof {
    pub digest: [u8; 32],
    pub timestamp: Timestamp,
}

impl DetachedProof {
    pub fn new(digest: [u8; 32], timestamp: Timestamp) -> Self {
        Self { digest, timestamp }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < MIN_PROOF_LEN {
            return Err(malformed(format!(
                "proof is {} bytes, shorter than {MIN_PROOF_LEN}",
                data.len()
            )));
        }
        let mut r = Reader::new(data);
        if r.bytes(HEADER_MAGIC.len())? != HEADER_MAGIC {
            return Err(malformed("missing header magic"));
        }
        let version = r.varuint()?;
        if version != MAJOR_VERSION {
            return Err(malformed(format!("unsupported major version {version}")));
        }
        let op = r.u8()?;
        if op != OP_SHA256 {
            return Err(malformed(format!("unsupported file hash operation 0x{op:02x}")));
        }
        let digest: [u8; 32] = r
            .bytes(32)?
            .try_into()
            .map_err(|_| malformed("file digest"))?;
        let timestamp = Timestamp::parse(&mut r, 0)?;
        if !r.is_empty() {
            return Err(malformed("trailing bytes after proof"));
        }
        Ok(Self { digest, timestamp })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = HEADER_MAGIC.to_vec();
        write_varuint(&mut out, MAJOR_VERSION);
        out.push(OP_SHA256);
        out.extend_from_slice(&self.digest);
        self.timestamp.serialize(&mut out);
        out
    }

    pub fn pending_commitments(&self) -> Vec<(String, Vec<u8>)> {
        self.timestamp.pending_commitments(&self.digest)
    }

    pub fn bitcoin_heights(&self) -> Vec<u64> {
        self.timestamp.bitcoin_heights(&self.digest)
    }

    pub fn bitcoin_commitments(&self) -> Vec<(u64, Vec<u8>)> {
        self.timestamp.bitcoin_commitments(&self.digest)
    }

    /// Lowest block height attesting the digest, if any.
    pub fn earliest_bitcoin_height(&self) -> Option<u64> {
        self.bitcoin_heights().into_iter().min()
    }
}

/// What a structurally valid proof contains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProofSummary {
    pub pending: usize,
    pub bitcoin_heights: Vec<u64>,
    pub unknown: usize,
}

impl ProofSummary {
    pub fn has_bitcoin(&self) -> bool {
        !self.bitcoin_heights.is_empty()
    }
}

/// Structural check of a detached proof for `expected_digest`.
///
/// Confirms the bytes parse, commit to the expected digest and carry at
/// least one attestation. This is a format check; it does not establish
/// that any block actually contains the commitment.
pub fn inspect(data: &[u8], expected_digest: &[u8; 32]) -> Result<ProofSummary> {
    let proof = DetachedProof::parse(data)?;
    if &proof.digest != expected_digest {
        return Err(malformed(format!(
            "proof commits to {} instead of {}",
            hex::encode(proof.digest),
            hex::encode(expected_digest)
        )));
    }

    let mut summary = ProofSummary::default();
    for attestation in proof.timestamp.all_attestations() {
        match attestation {
            Attestation::Bitcoin { height } => summary.bitcoin_heights.push(*height),
            Attestation::Pending { .. } => summary.pending += 1,
            Attestation::Unknown { .. } => summary.unknown += 1,
        }
    }
    if summary.pending + summary.bitcoin_heights.len() + summary.unknown == 0 {
        return Err(malformed("proof carries no attestation"));
    }
    Ok(summary)
}

/// SHA-256 of `data`, the digest a calendar is asked to timestamp.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}
