//! Notification surface for session consumers.

use crate::transport::traits::{Payload, TransportError};

/// Callbacks raised by a [`Session`](crate::session::manager::Session).
///
/// Every method has a no-op default, so a consumer implements only the hooks
/// it cares about. Calls are made from the session's own task; implementations
/// must not block.
pub trait SessionDelegate: Send + Sync + 'static {
    /// The connection (or a reconnection) completed its handshake.
    fn on_opened(&self) {}

    /// Application data arrived. Always invoked, in addition to the typed
    /// [`on_text`](Self::on_text) / [`on_binary`](Self::on_binary) hook.
    fn on_message(&self, payload: &Payload) {
        let _ = payload;
    }

    /// A text frame arrived.
    fn on_text(&self, text: &str) {
        let _ = text;
    }

    /// A binary frame arrived.
    fn on_binary(&self, data: &[u8]) {
        let _ = data;
    }

    /// The connection failed and the reconnect ceiling is exhausted.
    fn on_failed(&self, error: &TransportError) {
        let _ = error;
    }

    /// The connection closed, either at the caller's request or after the
    /// reconnect ceiling was exhausted.
    fn on_closed(&self, code: u16, reason: Option<&str>, was_clean: bool) {
        let _ = (code, reason, was_clean);
    }
}

/// Delegate that ignores every notification.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelegate;

impl SessionDelegate for NoopDelegate {}
