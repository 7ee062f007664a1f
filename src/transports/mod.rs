//! Built-in transport front-ends.
//!
//! Each front-end adapts one socket technology to the engine: it accepts
//! connections, extracts the handshake identity, parses inbound JSON into
//! [`ClientEvent`](crate::protocol::ClientEvent)s, and drains outbound
//! events back to the socket. Only WebSocket ships today, behind the
//! `transport-websocket` feature.

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::WsServer;
