#![cfg_attr(doc, doc = include_str!("../README.md"))]

pub mod error;
pub mod session;
pub mod transport;

use crate::error::Error;

pub type Result<T> = std::result::Result<T, Error>;

pub use session::config::{HeartbeatConfig, ReconnectConfig, SessionConfig};
pub use session::delegate::{NoopDelegate, SessionDelegate};
pub use session::manager::{ReadyState, Session};
pub use transport::traits::{Payload, TransportEvent};
