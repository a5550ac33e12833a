//! Core traits for pluggable socket transports.

use std::error::Error as StdError;
use std::fmt;

use tokio::sync::mpsc;

/// Default close code for user-initiated closes (RFC 6455 normal closure).
pub const NORMAL_CLOSURE: u16 = 1000;

/// An outgoing or incoming application payload.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text frame
    Text(String),
    /// Binary frame
    Binary(Vec<u8>),
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Self::Binary(data)
    }
}

/// Lifecycle and data events produced by a transport instance.
///
/// Events are delivered in the order the transport produces them. A transport
/// emits at most one of `Failed`/`Closed` as its terminal event; anything the
/// implementation produces after that is ignored by the session layer.
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake completed, the connection is usable
    Opened,
    /// Application data arrived
    Message(Payload),
    /// Server PING frame (transports answer it themselves)
    Ping(Option<Vec<u8>>),
    /// Server PONG frame
    Pong(Option<Vec<u8>>),
    /// The connection failed to establish or broke mid-stream
    Failed(TransportError),
    /// The connection closed
    Closed {
        /// Close code from the peer, or the locally requested code
        code: u16,
        /// Optional close reason
        reason: Option<String>,
        /// Whether the closing handshake completed
        was_clean: bool,
    },
}

/// Error reported through [`TransportEvent::Failed`].
#[non_exhaustive]
#[derive(Debug)]
pub enum TransportError {
    /// Error from the underlying WebSocket stack
    Connection(tokio_tungstenite::tungstenite::Error),
    /// Transport-specific failure without a library error behind it
    Other(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "transport connection error: {e}"),
            Self::Other(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Other(_) => None,
        }
    }
}

// Integration with main Error type
impl From<TransportError> for crate::error::Error {
    fn from(e: TransportError) -> Self {
        crate::error::Error::with_source(crate::error::Kind::Transport, e)
    }
}

/// Error returned by [`Transport::send`].
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The connection is not open yet (or anymore)
    NotOpen,
    /// The transport task has terminated
    Closed,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOpen => write!(f, "connection is not open"),
            Self::Closed => write!(f, "transport has shut down"),
        }
    }
}

impl StdError for SendError {}

/// A single logical connection.
///
/// Implementations are driven exclusively by the session task, so the methods
/// take `&mut self` and none of them block: `open` and `close` submit work,
/// `send` either hands the payload to the connection or reports a local
/// [`SendError`].
pub trait Transport: Send + 'static {
    /// Start connecting. Called at most once per transport instance.
    fn open(&mut self);

    /// Initiate the closing handshake (or abort a connect in progress).
    fn close(&mut self, code: u16, reason: Option<String>);

    /// Submit a payload for transmission.
    fn send(&mut self, payload: Payload) -> Result<(), SendError>;
}

/// Factory producing fresh transport instances.
///
/// The session replaces its transport wholesale on every reconnect, so the
/// factory is consulted once per connection attempt. Each instance comes with
/// its own event receiver; dropping the receiver detaches the instance.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    /// Create a transport bound to `url`, not yet opened.
    fn create(&self, url: &str) -> (Self::Transport, mpsc::UnboundedReceiver<TransportEvent>);
}
