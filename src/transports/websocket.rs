//! WebSocket server front-end using `tokio-tungstenite`.
//!
//! [`WsServer`] accepts WebSocket connections, takes the client identity from
//! the `identity` query parameter of the upgrade request (connections without
//! one are refused with `400 Bad Request`), and bridges JSON text frames to
//! the engine.
//!
//! All connections funnel into a single engine task that owns the
//! [`EventRouter`] and a [`ChannelDelivery`], so handlers run to completion
//! one at a time regardless of how many sockets are live. Each connection
//! gets a reader loop (inbound frames → engine commands) and a writer task
//! (outbound events → frames).
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (enabled by
//! default).

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::{GridDuelError, Result};
use crate::identity::ConnectionId;
use crate::protocol::{ClientEvent, Identity, ServerEvent};
use crate::router::EventRouter;
use crate::transport::ChannelDelivery;

/// Buffer for commands flowing from connection tasks into the engine task.
const COMMAND_BUFFER: usize = 256;

/// What a connection task asks of the engine task.
enum EngineCommand {
    /// A connection completed its handshake; bind it and open its event
    /// channel.
    Connect {
        conn: ConnectionId,
        identity: Identity,
        events: oneshot::Sender<mpsc::Receiver<ServerEvent>>,
    },
    /// A parsed inbound event.
    Event { conn: ConnectionId, event: ClientEvent },
    /// The connection is gone.
    Disconnect { conn: ConnectionId },
}

/// A WebSocket server serving the coordination engine.
pub struct WsServer {
    listener: TcpListener,
    commands: mpsc::Sender<EngineCommand>,
}

impl WsServer {
    /// Bind the listener and spawn the engine task.
    ///
    /// # Errors
    ///
    /// Returns [`GridDuelError::Io`] if the address cannot be bound.
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (commands, receiver) = mpsc::channel(COMMAND_BUFFER);
        tokio::spawn(engine_loop(receiver));
        tracing::info!(%addr, "WebSocket server bound");
        Ok(Self { listener, commands })
    }

    /// The bound local address, useful when binding to port 0.
    ///
    /// # Errors
    ///
    /// Returns [`GridDuelError::Io`] if the socket cannot report its address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, spawning one task per connection.
    ///
    /// # Errors
    ///
    /// Returns [`GridDuelError::Io`] if accepting fails fatally.
    pub async fn run(self) -> Result<()> {
        loop {
            let (tcp, peer) = self.listener.accept().await?;
            let commands = self.commands.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(tcp, commands).await {
                    tracing::debug!(%peer, %err, "connection ended");
                }
            });
        }
    }
}

/// The single task that owns all engine state.
async fn engine_loop(mut commands: mpsc::Receiver<EngineCommand>) {
    let mut router = EventRouter::new();
    let mut delivery = ChannelDelivery::new();
    while let Some(command) = commands.recv().await {
        match command {
            EngineCommand::Connect {
                conn,
                identity,
                events,
            } => {
                let receiver = delivery.register(conn);
                router.on_connect(conn, identity);
                // The connection task may already be gone; its disconnect
                // command will clean up.
                let _ = events.send(receiver);
            }
            EngineCommand::Event { conn, event } => {
                router.on_event(conn, event, &mut delivery);
            }
            EngineCommand::Disconnect { conn } => {
                router.on_disconnect(conn, &mut delivery);
                delivery.deregister(conn);
            }
        }
    }
    tracing::debug!("engine task stopped");
}

/// Extract the `identity` query parameter from the upgrade request.
fn identity_from_request(request: &Request) -> Option<Identity> {
    let query = request.uri().query()?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("identity="))
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn reject_handshake() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("missing identity query parameter".to_owned()));
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

fn ws_error(err: tokio_tungstenite::tungstenite::Error) -> GridDuelError {
    let kind = match &err {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    GridDuelError::Io(std::io::Error::new(kind, err))
}

async fn handle_connection(tcp: TcpStream, commands: mpsc::Sender<EngineCommand>) -> Result<()> {
    let mut identity: Option<Identity> = None;
    let ws = tokio_tungstenite::accept_hdr_async(tcp, |request: &Request, response: Response| {
        match identity_from_request(request) {
            Some(found) => {
                identity = Some(found);
                Ok(response)
            }
            None => Err(reject_handshake()),
        }
    })
    .await
    .map_err(ws_error)?;

    let Some(identity) = identity else {
        return Err(GridDuelError::HandshakeRejected(
            "no identity captured during handshake".to_owned(),
        ));
    };

    let conn = ConnectionId::new();
    tracing::debug!(%conn, %identity, "WebSocket connection established");

    let (events_tx, events_rx) = oneshot::channel();
    commands
        .send(EngineCommand::Connect {
            conn,
            identity,
            events: events_tx,
        })
        .await
        .map_err(|_| GridDuelError::ConnectionClosed)?;
    let mut events = events_rx
        .await
        .map_err(|_| GridDuelError::ConnectionClosed)?;

    let (mut writer, mut reader) = ws.split();

    // Outbound: drain the engine's event channel into the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::warn!(%err, "outbound event failed to serialize, skipping");
                    continue;
                }
            };
            if writer.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = writer.close().await;
    });

    // Inbound: parse text frames into events; malformed payloads are logged
    // and dropped without a reply.
    while let Some(frame) = reader.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                tracing::debug!(%conn, %err, "WebSocket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => {
                    if commands
                        .send(EngineCommand::Event { conn, event })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(%conn, %err, "malformed event dropped");
                }
            },
            Message::Close(frame) => {
                tracing::debug!(%conn, ?frame, "received WebSocket close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // tungstenite auto-queues pong replies; nothing to do.
            }
            Message::Binary(_) => {
                tracing::warn!(%conn, "unexpected binary frame dropped");
            }
            Message::Frame(_) => {
                // Never produced by the read half; kept for exhaustiveness.
            }
        }
    }

    let _ = commands.send(EngineCommand::Disconnect { conn }).await;
    writer_task.abort();
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error_codes::ErrorCode;
    use crate::protocol::{GameKind, GameOutcome, MoveInput, PlayerStatus};

    type ClientWs = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn start_server() -> SocketAddr {
        let server = WsServer::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run());
        addr
    }

    async fn connect(addr: SocketAddr, identity: &str) -> ClientWs {
        let url = format!("ws://{addr}/duel?identity={identity}");
        let (ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
        ws
    }

    /// Receive the next typed server event, skipping control frames.
    async fn next_event(ws: &mut ClientWs) -> ServerEvent {
        loop {
            let message = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
                .await
                .expect("timed out waiting for a server event")
                .expect("connection closed while waiting for a server event")
                .unwrap();
            if let Message::Text(text) = message {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send_event(ws: &mut ClientWs, event: &ClientEvent) {
        let text = serde_json::to_string(event).unwrap();
        ws.send(Message::Text(text.into())).await.unwrap();
    }

    fn join(identity: &str) -> ClientEvent {
        ClientEvent::Join {
            game: GameKind::Tictactoe,
            room: "e2e".into(),
            identity: identity.into(),
        }
    }

    fn cell_move(identity: &str, index: usize) -> ClientEvent {
        ClientEvent::Move {
            game: GameKind::Tictactoe,
            room: "e2e".into(),
            identity: identity.into(),
            input: MoveInput::Cell { index },
        }
    }

    #[tokio::test]
    async fn handshake_without_identity_is_refused() {
        let addr = start_server().await;
        let url = format!("ws://{addr}/duel");
        let result = tokio_tungstenite::connect_async(&url).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn two_clients_play_a_full_game() {
        let addr = start_server().await;
        let mut alice = connect(addr, "alice").await;
        let mut bob = connect(addr, "bob").await;

        send_event(&mut alice, &join("alice")).await;
        // Alone in the room: roster of one, then waiting status.
        assert!(matches!(
            next_event(&mut alice).await,
            ServerEvent::MembershipUpdate { count: 1, .. }
        ));
        assert!(matches!(
            next_event(&mut alice).await,
            ServerEvent::StatusUpdate {
                status: PlayerStatus::Waiting,
                result: None,
            }
        ));

        send_event(&mut bob, &join("bob")).await;
        // The room fills: both see the roster, the empty board, and playing.
        for ws in [&mut alice, &mut bob] {
            assert!(matches!(
                next_event(ws).await,
                ServerEvent::MembershipUpdate { count: 2, .. }
            ));
            let ServerEvent::BoardUpdate {
                board,
                current_mover,
            } = next_event(ws).await
            else {
                panic!("expected boardUpdate");
            };
            assert_eq!(board.len(), 9);
            assert!(board.iter().all(Option::is_none));
            assert_eq!(current_mover, "alice");
            assert!(matches!(
                next_event(ws).await,
                ServerEvent::StatusUpdate {
                    status: PlayerStatus::Playing,
                    result: None,
                }
            ));
        }

        // Alice takes the top row; bob answers in the middle row.
        let script = [
            ("alice", 0usize),
            ("bob", 3),
            ("alice", 1),
            ("bob", 4),
            ("alice", 2),
        ];
        for (mover, index) in script {
            let ws = if mover == "alice" { &mut alice } else { &mut bob };
            send_event(ws, &cell_move(mover, index)).await;
            for ws in [&mut alice, &mut bob] {
                assert!(matches!(next_event(ws).await, ServerEvent::BoardUpdate { .. }));
            }
        }

        // Both members receive the same shared terminal fact.
        for ws in [&mut alice, &mut bob] {
            let ServerEvent::StatusUpdate { status, result } = next_event(ws).await else {
                panic!("expected terminal statusUpdate");
            };
            assert_eq!(status, PlayerStatus::GameOver);
            assert_eq!(
                result,
                Some(GameOutcome::Win {
                    winner: "alice".into()
                })
            );
        }
    }

    #[tokio::test]
    async fn malformed_payloads_are_dropped_silently() {
        let addr = start_server().await;
        let mut alice = connect(addr, "alice").await;

        alice
            .send(Message::Text("{definitely not json".into()))
            .await
            .unwrap();
        alice
            .send(Message::Text(r#"{"type":"unknown","data":{}}"#.into()))
            .await
            .unwrap();

        // The connection survives and a valid event still works.
        send_event(&mut alice, &join("alice")).await;
        assert!(matches!(
            next_event(&mut alice).await,
            ServerEvent::MembershipUpdate { count: 1, .. }
        ));
    }

    #[tokio::test]
    async fn errors_go_only_to_the_offender() {
        let addr = start_server().await;
        let mut alice = connect(addr, "alice").await;
        let mut bob = connect(addr, "bob").await;
        let mut carol = connect(addr, "carol").await;

        send_event(&mut alice, &join("alice")).await;
        let _ = next_event(&mut alice).await; // membership
        let _ = next_event(&mut alice).await; // waiting
        send_event(&mut bob, &join("bob")).await;
        for ws in [&mut alice, &mut bob] {
            let _ = next_event(ws).await; // membership
            let _ = next_event(ws).await; // board
            let _ = next_event(ws).await; // playing
        }

        send_event(&mut carol, &join("carol")).await;
        let ServerEvent::Error { code, .. } = next_event(&mut carol).await else {
            panic!("expected an error for the third joiner");
        };
        assert_eq!(code, ErrorCode::RoomFull);

        // The members saw nothing; the game proceeds where it left off.
        send_event(&mut alice, &cell_move("alice", 4)).await;
        assert!(matches!(
            next_event(&mut alice).await,
            ServerEvent::BoardUpdate { .. }
        ));
        assert!(matches!(
            next_event(&mut bob).await,
            ServerEvent::BoardUpdate { .. }
        ));
    }

    #[tokio::test]
    async fn disconnect_notifies_the_survivor_with_abandonment() {
        let addr = start_server().await;
        let mut alice = connect(addr, "alice").await;
        let mut bob = connect(addr, "bob").await;

        send_event(&mut alice, &join("alice")).await;
        let _ = next_event(&mut alice).await;
        let _ = next_event(&mut alice).await;
        send_event(&mut bob, &join("bob")).await;
        for ws in [&mut alice, &mut bob] {
            let _ = next_event(ws).await;
            let _ = next_event(ws).await;
            let _ = next_event(ws).await;
        }

        alice.close(None).await.unwrap();

        let ServerEvent::MembershipUpdate { roster, count } = next_event(&mut bob).await else {
            panic!("expected membershipUpdate after the disconnect");
        };
        assert_eq!(count, 1);
        assert_eq!(roster[0].identity, "bob");

        let ServerEvent::StatusUpdate { status, result } = next_event(&mut bob).await else {
            panic!("expected statusUpdate after the disconnect");
        };
        assert_eq!(status, PlayerStatus::GameOver);
        assert_eq!(result, Some(GameOutcome::Abandoned));
    }
}
