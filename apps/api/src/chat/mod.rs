// Conversational screening: wire protocol, the session state machine, and the
// WebSocket transport that drives it.

pub mod claims;
pub mod protocol;
pub mod session;
pub mod ws;
