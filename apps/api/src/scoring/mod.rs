// Relevance scoring: deterministic heuristic scorer, mismatch categories,
// and the fallback clarifying-question templates.

pub mod mismatch;
pub mod questions;
pub mod relevance;

use serde::Serialize;

pub use mismatch::Mismatch;

/// Outcome of one scoring pass. A current-state projection: each pass replaces the last.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoringResult {
    /// Always within 0..=100.
    pub score: u8,
    /// Outstanding mismatches, first-seen order, no repeats.
    pub mismatches: Vec<Mismatch>,
    pub summary: String,
}
