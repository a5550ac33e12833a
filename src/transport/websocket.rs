#![expect(
    clippy::module_name_repetitions,
    reason = "Transport types expose their backend in the name for clarity"
)]

//! Default transport backed by `tokio-tungstenite`.

use futures::{SinkExt as _, StreamExt as _};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::traits::{
    NORMAL_CLOSURE, Payload, SendError, Transport, TransportError, TransportEvent, TransportFactory,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the stream ends without a closing handshake.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Commands accepted by the connection task.
#[derive(Debug)]
enum Command {
    Send(Payload),
    Close { code: u16, reason: Option<String> },
}

/// Factory producing [`WebSocketTransport`] instances.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketFactory;

impl TransportFactory for WebSocketFactory {
    type Transport = WebSocketTransport;

    fn create(&self, url: &str) -> (Self::Transport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = watch::channel(false);

        let transport = WebSocketTransport {
            url: url.to_owned(),
            command_tx,
            command_rx: Some(command_rx),
            open_tx: Some(open_tx),
            open_rx,
            event_tx,
        };

        (transport, event_rx)
    }
}

/// A single WebSocket connection driven by a background task.
///
/// `open()` spawns the task, which performs the handshake and then services
/// the read half and the outgoing command channel in one `select!` loop, the
/// same shape as a hand-rolled tungstenite client loop. Dropping the
/// transport closes the command channel and the task winds down on its own.
pub struct WebSocketTransport {
    url: String,
    command_tx: mpsc::UnboundedSender<Command>,
    /// Taken by `open()`; `Some` means the task has not been spawned yet
    command_rx: Option<mpsc::UnboundedReceiver<Command>>,
    open_tx: Option<watch::Sender<bool>>,
    open_rx: watch::Receiver<bool>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
}

impl Transport for WebSocketTransport {
    fn open(&mut self) {
        let (Some(command_rx), Some(open_tx)) = (self.command_rx.take(), self.open_tx.take())
        else {
            return;
        };

        let url = self.url.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            run(url, command_rx, event_tx, open_tx).await;
        });
    }

    fn close(&mut self, code: u16, reason: Option<String>) {
        if self.command_rx.is_some() {
            // Never opened; there is no task to tell, so report the closure
            // directly and leave the instance inert.
            self.command_rx = None;
            _ = self.event_tx.send(TransportEvent::Closed {
                code,
                reason,
                was_clean: false,
            });
            return;
        }

        _ = self.command_tx.send(Command::Close { code, reason });
    }

    fn send(&mut self, payload: Payload) -> Result<(), SendError> {
        if !*self.open_rx.borrow() {
            return Err(SendError::NotOpen);
        }
        self.command_tx
            .send(Command::Send(payload))
            .map_err(|_e| SendError::Closed)
    }
}

/// Connect, then drive the connection until a terminal event.
async fn run(
    url: String,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
    open_tx: watch::Sender<bool>,
) {
    tokio::select! {
        result = connect_async(&url) => match result {
            Ok((ws_stream, _)) => {
                _ = open_tx.send(true);
                _ = event_tx.send(TransportEvent::Opened);
                drive(ws_stream, command_rx, &event_tx, &open_tx).await;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(%url, error = %e, "WebSocket handshake failed");
                _ = event_tx.send(TransportEvent::Failed(TransportError::Connection(e)));
            }
        },
        close = next_close(&mut command_rx) => {
            if let Some((code, reason)) = close {
                _ = event_tx.send(TransportEvent::Closed {
                    code,
                    reason,
                    was_clean: false,
                });
            }
            // None: the transport handle was dropped, abort silently.
        }
    }
}

/// Wait for a close command, discarding anything else.
async fn next_close(
    command_rx: &mut mpsc::UnboundedReceiver<Command>,
) -> Option<(u16, Option<String>)> {
    while let Some(command) = command_rx.recv().await {
        if let Command::Close { code, reason } = command {
            return Some((code, reason));
        }
    }
    None
}

/// Service an established connection until it terminates.
async fn drive(
    ws_stream: WsStream,
    mut command_rx: mpsc::UnboundedReceiver<Command>,
    event_tx: &mpsc::UnboundedSender<TransportEvent>,
    open_tx: &watch::Sender<bool>,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    #[cfg(feature = "tracing")]
                    tracing::trace!(%text, "Received text frame");
                    _ = event_tx.send(TransportEvent::Message(Payload::Text(text.to_string())));
                }
                Some(Ok(Message::Binary(data))) => {
                    _ = event_tx.send(TransportEvent::Message(Payload::Binary(data.to_vec())));
                }
                Some(Ok(Message::Ping(data))) => {
                    // tungstenite answers the PING itself
                    _ = event_tx.send(TransportEvent::Ping(Some(data.to_vec())));
                }
                Some(Ok(Message::Pong(data))) => {
                    _ = event_tx.send(TransportEvent::Pong(Some(data.to_vec())));
                }
                Some(Ok(Message::Close(frame))) => {
                    _ = open_tx.send(false);
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), Some(f.reason.to_string())),
                        None => (NORMAL_CLOSURE, None),
                    };
                    _ = event_tx.send(TransportEvent::Closed {
                        code,
                        reason,
                        was_clean: true,
                    });
                    break;
                }
                Some(Ok(_)) => {
                    // Raw frames are not surfaced by the stream API
                }
                Some(Err(e)) => {
                    _ = open_tx.send(false);
                    _ = event_tx.send(TransportEvent::Failed(TransportError::Connection(e)));
                    break;
                }
                None => {
                    _ = open_tx.send(false);
                    _ = event_tx.send(TransportEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: None,
                        was_clean: false,
                    });
                    break;
                }
            },

            command = command_rx.recv() => match command {
                Some(Command::Send(payload)) => {
                    if write.send(to_message(payload)).await.is_err() {
                        _ = open_tx.send(false);
                        _ = event_tx.send(TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: None,
                            was_clean: false,
                        });
                        break;
                    }
                }
                Some(Command::Close { code, reason }) => {
                    _ = open_tx.send(false);
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.unwrap_or_default().into(),
                    };
                    // Keep reading: the peer's close echo produces the
                    // terminal Closed event with was_clean = true.
                    if write.send(Message::Close(Some(frame))).await.is_err() {
                        _ = event_tx.send(TransportEvent::Closed {
                            code,
                            reason: None,
                            was_clean: false,
                        });
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.into()),
        Payload::Binary(data) => Message::Binary(data.into()),
    }
}
