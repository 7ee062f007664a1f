//! # WebSocket Duel Server
//!
//! Runs the coordination engine behind a WebSocket listener.
//!
//! Clients connect with their identity in the query string and speak the
//! JSON event protocol:
//!
//! ```text
//! ws://localhost:3536/duel?identity=alice
//! {"type":"join","data":{"game":"tictactoe","room":"lobby","identity":"alice"}}
//! {"type":"move","data":{"game":"tictactoe","room":"lobby","identity":"alice","input":{"type":"cell","index":4}}}
//! ```
//!
//! ## Running
//!
//! ```sh
//! cargo run --example ws_duel_server
//!
//! # Override the bind address:
//! GRID_DUEL_ADDR=0.0.0.0:9000 cargo run --example ws_duel_server
//! ```

use grid_duel::transports::WsServer;

/// Default bind address when `GRID_DUEL_ADDR` is not set.
const DEFAULT_ADDR: &str = "127.0.0.1:3536";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing. Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("GRID_DUEL_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let server = WsServer::bind(&addr).await?;
    tracing::info!("Listening on {}", server.local_addr()?);

    tokio::select! {
        result = server.run() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down…");
        }
    }
    Ok(())
}
