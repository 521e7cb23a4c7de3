//! Decision payloads.
//!
//! The chain itself only stores `content_hash`; the payload is hashed from
//! its canonical JSON bytes and kept (or transmitted) separately.

use serde::{Deserialize, Serialize};

use crate::crypto::random;
use crate::error::{LedgerError, Result};

/// How risky the recorded decision is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(LedgerError::InvalidPayload(format!("unknown risk level: {other}"))),
        }
    }
}

/// Who made the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    Ai,
    Human,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub kind: ActorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl Actor {
    pub fn ai(id: impl Into<String>, model: Option<String>) -> Self {
        Self {
            id: id.into(),
            kind: ActorKind::Ai,
            model,
        }
    }
}

/// The content of one decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub decision_id: String,
    pub actor: Actor,
    pub action: String,
    pub reasoning: String,
    pub confidence: f64,
    pub risk_level: RiskLevel,
}

impl DecisionPayload {
    /// Create a payload with a fresh random `decision_id` and full confidence.
    pub fn new(
        actor: Actor,
        action: impl Into<String>,
        reasoning: impl Into<String>,
        risk_level: RiskLevel,
    ) -> Result<Self> {
        let id: [u8; 12] = random::random_bytes()?;
        Ok(Self {
            decision_id: format!("dec_{}", bs58::encode(id).into_string()),
            actor,
            action: action.into(),
            reasoning: reasoning.into(),
            confidence: 1.0,
            risk_level,
        })
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.action.trim().is_empty() {
            return Err(LedgerError::InvalidPayload("action must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(LedgerError::InvalidPayload(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Canonical bytes hashed into `content_hash`.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }
}
