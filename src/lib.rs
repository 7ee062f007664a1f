//! # Grid Duel
//!
//! Transport-agnostic room and session coordination engine for two-player
//! turn-based grid games.
//!
//! Two game kinds ship with the engine: **tictactoe** (3×3, win length 3,
//! direct placement) and **connect-four** (7×6, win length 4, gravity
//! placement). Rooms are created lazily, hold exactly two players, and are
//! deleted the moment they empty.
//!
//! ## Architecture
//!
//! - [`EventRouter`] owns all state and routes inbound [`ClientEvent`]s.
//! - The [`Delivery`] trait is the outbound seam — implement it (or use
//!   [`ChannelDelivery`]) to fan [`ServerEvent`]s out to connections and
//!   room topics.
//! - The board engine ([`board`]) is pure: move resolution and terminal
//!   detection with no I/O, clock, or randomness.
//! - Handlers run to completion one at a time; front-ends funnel all events
//!   through a single task.
//!
//! ## Features
//!
//! - **Transport-agnostic core** — bring your own socket layer
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides a runnable server ([`transports::websocket`])

pub mod board;
pub mod error;
pub mod error_codes;
pub mod identity;
pub mod protocol;
pub mod room;
pub mod router;
pub mod session;
pub mod transport;

#[cfg(feature = "transport-websocket")]
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use error::{GridDuelError, Rejection, Result};
pub use error_codes::ErrorCode;
pub use identity::ConnectionId;
pub use protocol::{ClientEvent, GameKind, PlayerSlot, ServerEvent};
pub use router::EventRouter;
pub use transport::{ChannelDelivery, Delivery};
