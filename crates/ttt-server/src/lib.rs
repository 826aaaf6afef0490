//! # ttt-server
//!
//! WebSocket request handlers and process bootstrap for the tic-tac-toe
//! room service. Ties together `ttt-transport` (the socket layer),
//! `ttt-room` (game state), and `ttt-timer` (reconnection/turn/rematch/idle
//! background services) behind a small request/response surface.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ttt_server::TttServer;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let server = TttServer::builder()
//!     .bind("0.0.0.0:8080")
//!     .build()
//!     .await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::ServerError;
pub use server::{ServerState, TttServer, TttServerBuilder};
