//! Socket transport abstraction and the default `tokio-tungstenite` backend.
//!
//! The session layer never talks to a WebSocket library directly. It drives a
//! [`Transport`] created by a [`TransportFactory`] and reacts to the
//! [`TransportEvent`] stream the factory hands back. Tests substitute a
//! scripted factory; production code uses [`WebSocketFactory`].

pub mod traits;
pub mod websocket;

pub use traits::{
    NORMAL_CLOSURE, Payload, SendError, Transport, TransportError, TransportEvent,
    TransportFactory,
};
pub use websocket::{WebSocketFactory, WebSocketTransport};
