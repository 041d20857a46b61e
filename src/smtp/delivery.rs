//! Delivery handoff
//!
//! Accepted messages leave the core through a single-operation handler
//! trait. The session passes the envelope by value and keeps nothing;
//! implementations that fan out to queues or stores compose internally.

use crate::error::Result;

/// A completed mail transaction: the reverse path, the forward paths in
/// arrival order, and the message body with CRLF line endings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub source: String,
    pub destinations: Vec<String>,
    /// Set when MAIL carried `BODY=8BITMIME`.
    pub eight_bit_mime: bool,
    pub body: Vec<u8>,
}

/// Consumer of accepted envelopes. Handlers are shared across sessions
/// and must tolerate concurrent invocation. A handler error is reported
/// to the client as a transient 451 and the message is dropped.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, envelope: Envelope) -> Result<()>;
}
