use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::chat::claims::LiveSessions;
use crate::oracle::ScoringOracle;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Pluggable evaluator. Default: `LlmOracle`, which degrades to "unavailable"
    /// when no provider key is configured.
    pub oracle: Arc<dyn ScoringOracle>,
    pub tokens: TokenVerifier,
    /// Sessions with a connected client; one connection per session.
    pub live_sessions: LiveSessions,
}

#[cfg(test)]
impl AppState {
    /// Memory-backed state whose oracle has no providers (always unavailable).
    pub fn for_tests(store: Arc<crate::store::memory::MemoryStore>, secret: &str) -> Self {
        use std::time::Duration;

        use crate::oracle::client::LlmOracle;

        Self {
            store,
            oracle: Arc::new(LlmOracle::new(vec![], Duration::from_secs(1))),
            tokens: TokenVerifier::new(secret),
            live_sessions: LiveSessions::new(),
        }
    }
}
