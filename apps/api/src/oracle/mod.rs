//! Scoring oracle: the single entry point for language-model evaluation.
//!
//! ARCHITECTURAL RULE: no other module calls a model provider directly.
//! All evaluations go through `ScoringOracle::evaluate`, which never fails:
//! transport, auth and parse problems all surface as `OracleOutcome::Unavailable`.

use async_trait::async_trait;
use serde_json::Value;

use crate::models::chat::Turn;
use crate::models::vacancy::VacancySnapshot;
use crate::scoring::{Mismatch, ScoringResult};

pub mod client;
pub mod parser;
pub mod prompts;

/// A validated oracle judgment.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleVerdict {
    pub score: u8,
    pub mismatches: Vec<Mismatch>,
    pub summary: String,
    /// `None` means there is nothing left to ask and the session may close.
    pub question: Option<String>,
    pub candidate_profile: Option<Value>,
}

impl OracleVerdict {
    pub fn scoring(&self) -> ScoringResult {
        ScoringResult {
            score: self.score,
            mismatches: self.mismatches.clone(),
            summary: self.summary.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OracleOutcome {
    Verdict(OracleVerdict),
    /// Expected degraded state, not an error.
    Unavailable,
}

/// Pluggable evaluator. Production: `LlmOracle`; tests use scripted fakes.
///
/// Carried in `AppState` as `Arc<dyn ScoringOracle>`.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn evaluate(
        &self,
        resume: &str,
        vacancy: &VacancySnapshot,
        context: &[Turn],
    ) -> OracleOutcome;
}
