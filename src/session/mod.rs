//! Session layer: reconnect policy, heartbeat scheduling, delegate fan-out.
//!
//! A [`Session`] owns exactly one transport instance at a time and replaces it
//! wholesale on every reconnect. All lifecycle state lives in a dedicated
//! task; the handle is a cheap-to-clone bundle of channels, so every public
//! operation is non-blocking.
//!
//! # Example
//!
//! ```ignore
//! let session = Session::new("wss://example.com", "chat")?;
//! session.open()?;
//! session.start_auto_heartbeat()?;
//! session.send_message("hello")?;
//! ```

pub mod config;
pub mod delegate;
pub mod error;
pub mod manager;

pub use config::{HeartbeatConfig, ReconnectConfig, SessionConfig};
pub use delegate::{NoopDelegate, SessionDelegate};
#[expect(
    clippy::module_name_repetitions,
    reason = "SessionError includes module name for clarity when used outside this module"
)]
pub use error::SessionError;
pub use manager::{ReadyState, Session};
