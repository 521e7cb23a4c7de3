//! The agent-facing ledger: a named agent, its signer and its chain.

use std::sync::Arc;

use crate::bundle::ProofBundle;
use crate::chain::{Chain, DecisionPayload, DecisionRecord};
use crate::error::{LedgerError, Result};
use crate::identity::{AgentIdentity, AgentSigner};
use crate::storage::ChainStore;
use crate::time::SystemClock;
use crate::verify::{VerificationReport, Verifier};

/// Longest accepted agent name.
pub const MAX_AGENT_NAME_LEN: usize = 64;

/// Agent names are 1 to 64 characters of `[A-Za-z0-9_-]`.
///
/// Names end up in file paths, so separators, dots and anything else that
/// could escape the data directory are rejected.
pub fn validate_agent_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_AGENT_NAME_LEN {
        return Err(LedgerError::InvalidAgentName(format!(
            "name must be 1-{MAX_AGENT_NAME_LEN} characters, got {}",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(LedgerError::InvalidAgentName(format!(
            "character {bad:?} is not allowed"
        )));
    }
    Ok(())
}

pub struct Ledger {
    agent_name: String,
    signer: AgentSigner,
    chain: Chain,
    store: Option<ChainStore>,
}

impl Ledger {
    /// A fresh in-memory ledger.
    pub fn new(agent_name: &str, signer: AgentSigner) -> Result<Self> {
        let chain = Chain::new(signer.identity().clone());
        Self::with_chain(agent_name, signer, chain)
    }

    /// Wrap an existing chain. The signer must own it.
    pub fn with_chain(agent_name: &str, signer: AgentSigner, chain: Chain) -> Result<Self> {
        validate_agent_name(agent_name)?;
        if chain.owner() != signer.identity() {
            return Err(LedgerError::OwnerMismatch {
                owner: chain.owner().identifier().to_string(),
                signer: signer.identity().identifier().to_string(),
            });
        }
        Ok(Self {
            agent_name: agent_name.to_string(),
            signer,
            chain,
            store: None,
        })
    }

    /// Load the chain from `store` and persist every later decision to it.
    pub fn open(agent_name: &str, signer: AgentSigner, store: ChainStore) -> Result<Self> {
        let chain = store.load_chain(signer.identity().clone(), Arc::new(SystemClock::new()))?;
        let mut ledger = Self::with_chain(agent_name, signer, chain)?;
        ledger.store = Some(store);
        Ok(ledger)
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn identity(&self) -> &AgentIdentity {
        self.signer.identity()
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn into_chain(self) -> Chain {
        self.chain
    }

    /// Record a decision.
    ///
    /// The payload's canonical bytes become the record's content. With a
    /// store attached the record is flushed to disk before it joins the
    /// in-memory chain; if that write fails the error is returned and
    /// neither the chain nor the on-disk log changes.
    pub fn decide(
        &mut self,
        payload: &DecisionPayload,
        alternatives: Vec<String>,
    ) -> Result<&DecisionRecord> {
        let content = payload.to_bytes()?;
        let record = self.chain.prepare(&content, &self.signer, alternatives)?;
        if let Some(store) = &self.store {
            store.append_record(&record)?;
        }
        let record = self.chain.commit(record)?;
        tracing::info!(
            agent = %self.agent_name,
            index = record.index(),
            action = %payload.action,
            risk = %payload.risk_level,
            "decision recorded"
        );
        Ok(record)
    }

    pub fn verify(&self) -> VerificationReport {
        Verifier::default().verify_chain(&self.chain)
    }

    pub fn export_bundle(&self, start: u64, end: u64) -> Result<ProofBundle> {
        ProofBundle::export(&self.chain, start, end)
    }
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("agent_name", &self.agent_name)
            .field("chain", &self.chain)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{content_hash, Actor, RiskLevel};
    use crate::identity::KeyOptions;

    fn payload(action: &str) -> DecisionPayload {
        DecisionPayload::new(Actor::ai("planner", None), action, "test", RiskLevel::Medium).unwrap()
    }

    #[test]
    fn test_agent_name_validation() {
        let longest = "x".repeat(64);
        let too_long = "x".repeat(65);
        for ok in ["a", "agent-1", "Agent_2", longest.as_str()] {
            assert!(validate_agent_name(ok).is_ok(), "{ok}");
        }
        for bad in ["", "../etc", "a/b", "a.b", "name with space", "ümlaut", too_long.as_str()] {
            assert!(
                matches!(validate_agent_name(bad), Err(LedgerError::InvalidAgentName(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn test_decide_and_verify() {
        let signer = AgentSigner::generate(KeyOptions::dual()).unwrap();
        let mut ledger = Ledger::new("planner", signer).unwrap();
        let p = payload("approve-A");
        let hash = *ledger
            .decide(&p, vec!["reject-A".into()])
            .unwrap()
            .content_hash();
        assert_eq!(hash, content_hash(&p.to_bytes().unwrap()));
        ledger.decide(&payload("approve-B"), vec![]).unwrap();

        assert!(ledger.verify().is_valid());
        let bundle = ledger.export_bundle(0, 1).unwrap();
        assert!(bundle.verify().is_valid());
    }

    #[test]
    fn test_invalid_payload_leaves_chain_unchanged() {
        let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
        let mut ledger = Ledger::new("planner", signer).unwrap();
        let bad = payload("act").with_confidence(1.5);
        assert!(matches!(
            ledger.decide(&bad, vec![]),
            Err(LedgerError::InvalidPayload(_))
        ));
        assert!(ledger.chain().is_empty());
    }

    #[test]
    fn test_foreign_chain_rejected() {
        let a = AgentSigner::generate(KeyOptions::default()).unwrap();
        let b = AgentSigner::generate(KeyOptions::default()).unwrap();
        let chain = Chain::new(a.identity().clone());
        assert!(matches!(
            Ledger::with_chain("b", b, chain),
            Err(LedgerError::OwnerMismatch { .. })
        ));
    }

    #[test]
    fn test_persistent_ledger_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
        let identity = signer.identity().clone();
        {
            let store = ChainStore::open(dir.path()).unwrap();
            let mut ledger = Ledger::open("planner", signer, store).unwrap();
            ledger.decide(&payload("one"), vec![]).unwrap();
            ledger.decide(&payload("two"), vec![]).unwrap();
        }
        let store = ChainStore::open(dir.path()).unwrap();
        let chain = store
            .load_chain(identity, Arc::new(SystemClock::new()))
            .unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_failed_write_leaves_ledger_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let signer = AgentSigner::generate(KeyOptions::default()).unwrap();
        let identity = signer.identity().clone();
        let store = ChainStore::open(dir.path()).unwrap();
        let mut ledger = Ledger::open("planner", signer, store.clone()).unwrap();

        // A directory where the log should be makes every append fail.
        std::fs::create_dir(store.records_path()).unwrap();
        assert!(ledger.decide(&payload("blocked"), vec![]).is_err());
        assert!(ledger.chain().is_empty());

        std::fs::remove_dir(store.records_path()).unwrap();
        let record = ledger.decide(&payload("after"), vec![]).unwrap();
        assert_eq!(record.index(), 0);

        let chain = store
            .load_chain(identity, Arc::new(SystemClock::new()))
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.records(), ledger.chain().records());
    }
}
