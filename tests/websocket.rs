#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use ws_session::transport::traits::TransportError;
use ws_session::transport::websocket::WebSocketFactory;
use ws_session::{Payload, Session, SessionConfig, SessionDelegate};

/// Mock WebSocket server.
struct MockWsServer {
    addr: SocketAddr,
    /// Broadcast messages to ALL connected clients
    message_tx: broadcast::Sender<String>,
    /// Frames received from clients
    received_rx: mpsc::UnboundedReceiver<Payload>,
    /// Completed handshakes
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Start a mock WebSocket server on a random port.
    ///
    /// With `drop_first`, the first accepted connection is dropped right
    /// after its handshake, which lets tests exercise the reconnect path.
    async fn start(drop_first: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (message_tx, _) = broadcast::channel::<String>(100);
        let (received_tx, received_rx) = mpsc::unbounded_channel::<Payload>();
        let connections = Arc::new(AtomicUsize::new(0));

        let broadcast_tx = message_tx.clone();
        let connection_count = Arc::clone(&connections);

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };

                let Ok(ws_stream) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };

                let accepted = connection_count.fetch_add(1, Ordering::SeqCst);
                if drop_first && accepted == 0 {
                    drop(ws_stream);
                    continue;
                }

                let (mut write, mut read) = ws_stream.split();
                let frame_tx = received_tx.clone();
                let mut msg_rx = broadcast_tx.subscribe();

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            // Handle incoming frames from the client
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        drop(frame_tx.send(Payload::Text(text.to_string())));
                                    }
                                    Some(Ok(Message::Binary(data))) => {
                                        drop(frame_tx.send(Payload::Binary(data.to_vec())));
                                    }
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                            // Handle outgoing messages to the client
                            msg = msg_rx.recv() => {
                                match msg {
                                    Ok(text) => {
                                        if write.send(Message::Text(text.into())).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            addr,
            message_tx,
            received_rx,
            connections,
        }
    }

    fn base_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a message to all connected clients.
    fn send(&self, message: &str) {
        drop(self.message_tx.send(message.to_owned()));
    }

    /// Receive the next frame a client sent.
    async fn recv_frame(&mut self) -> Option<Payload> {
        timeout(Duration::from_secs(2), self.received_rx.recv())
            .await
            .ok()
            .flatten()
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingDelegate {
    opened: AtomicUsize,
    texts: Mutex<Vec<String>>,
    failed: AtomicUsize,
    closed: Mutex<Vec<(u16, bool)>>,
}

impl SessionDelegate for RecordingDelegate {
    fn on_opened(&self) {
        self.opened.fetch_add(1, Ordering::SeqCst);
    }

    fn on_text(&self, text: &str) {
        self.texts.lock().unwrap().push(text.to_owned());
    }

    fn on_failed(&self, _error: &TransportError) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_closed(&self, code: u16, _reason: Option<&str>, was_clean: bool) {
        self.closed.lock().unwrap().push((code, was_clean));
    }
}

impl RecordingDelegate {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    fn closed(&self) -> Vec<(u16, bool)> {
        self.closed.lock().unwrap().clone()
    }
}

/// Poll until `condition` holds, panicking after ten seconds.
async fn wait_until<C: Fn() -> bool>(condition: C) {
    timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not met within timeout");
}

fn connect(server: &MockWsServer, config: SessionConfig) -> (Session, Arc<RecordingDelegate>) {
    let delegate = Arc::new(RecordingDelegate::default());
    let session = Session::with_transport(
        &server.base_url(),
        "stream",
        config,
        WebSocketFactory,
        Arc::clone(&delegate) as Arc<dyn SessionDelegate>,
    )
    .unwrap();
    (session, delegate)
}

#[tokio::test]
async fn delivers_messages_both_ways_and_closes_cleanly() {
    let mut server = MockWsServer::start(false).await;
    let (session, delegate) = connect(&server, SessionConfig::default());

    session.open().unwrap();
    wait_until(|| delegate.opened() == 1).await;
    assert!(session.ready_state().is_open());

    server.send(r#"{"hello":1}"#);
    wait_until(|| delegate.texts() == vec![r#"{"hello":1}"#.to_owned()]).await;

    session.send_message("from-client").unwrap();
    assert_eq!(
        server.recv_frame().await,
        Some(Payload::Text("from-client".to_owned()))
    );

    session.close(None, Some("bye".to_owned())).unwrap();
    wait_until(|| !delegate.closed().is_empty()).await;
    let (code, was_clean) = delegate.closed()[0];
    assert_eq!(code, 1000);
    assert!(was_clean);

    // A user-initiated close never reconnects
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn reconnects_after_server_drops_connection() {
    let mut server = MockWsServer::start(true).await;
    let (session, delegate) = connect(&server, SessionConfig::default());

    session.open().unwrap();

    // First connection is dropped by the server right after the handshake;
    // the session reconnects on its own and lands on the second one.
    wait_until(|| delegate.opened() == 2).await;
    assert_eq!(server.connections(), 2);

    // The replacement connection is live
    session.send_message("still-here").unwrap();
    assert_eq!(
        server.recv_frame().await,
        Some(Payload::Text("still-here".to_owned()))
    );
}

#[tokio::test]
async fn heartbeat_payload_reaches_server() {
    let mut server = MockWsServer::start(false).await;
    let mut config = SessionConfig::default();
    config.heartbeat.interval = Duration::from_millis(100);
    let (session, delegate) = connect(&server, config);

    session.open().unwrap();
    wait_until(|| delegate.opened() == 1).await;

    session.start_auto_heartbeat().unwrap();
    assert_eq!(
        server.recv_frame().await,
        Some(Payload::Binary(br#"{"msgType":1}"#.to_vec()))
    );

    session.stop_heartbeat().unwrap();
}
