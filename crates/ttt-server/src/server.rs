//! Server builder and accept loop.
//!
//! This is the entry point for running the room service. It ties together
//! the transport, the room registry/broadcaster, and the background timer
//! services into one running process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ttt_protocol::RoomCode;
use ttt_room::{RoomCoreConfig, RoomRegistry};
use ttt_transport::{Broadcaster, Connection, ConnectionId, Transport, WebSocketTransport};

use crate::error::ServerError;
use crate::handler::handle_connection;

/// Shared server state passed to every connection handler task.
pub struct ServerState {
    pub(crate) ctx: ttt_timer::Context,
    /// Reverse index from a connection to the one room it currently
    /// occupies. Every request already carries an explicit room code, so
    /// this map exists purely for the disconnect hook, which has to find
    /// "every room containing this connection" without being told which
    /// one. A connection is only ever in one room at a time in this
    /// service, so a single entry per connection is sufficient.
    pub(crate) connection_rooms: Mutex<HashMap<ConnectionId, RoomCode>>,
}

/// Builder for configuring and starting the server.
pub struct TttServerBuilder {
    bind_addr: String,
    config: RoomCoreConfig,
}

impl TttServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            config: RoomCoreConfig::default(),
        }
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Overrides the room service configuration (defaults are used
    /// otherwise).
    pub fn config(mut self, config: RoomCoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the transport and assembles the shared state. Does not start
    /// accepting connections yet — call [`TttServer::run`] for that.
    pub async fn build(self) -> Result<TttServer, ServerError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let ctx = ttt_timer::Context::new(
            Arc::new(RoomRegistry::new()),
            Arc::new(Broadcaster::new()),
            Arc::new(self.config),
        );

        let state = Arc::new(ServerState {
            ctx,
            connection_rooms: Mutex::new(HashMap::new()),
        });

        Ok(TttServer { transport, state })
    }
}

impl Default for TttServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running room service.
pub struct TttServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
}

impl TttServer {
    pub fn builder() -> TttServerBuilder {
        TttServerBuilder::new()
    }

    /// The address actually bound, useful when built with port `0`.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs the accept loop. Spawns the idle-room sweeper once, then
    /// accepts connections and hands each one its own handler task until
    /// the process is terminated.
    pub async fn run(mut self) -> Result<(), ServerError> {
        ttt_timer::spawn_idle_sweeper(self.state.ctx.clone());
        tracing::info!("room service running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    let connection_id = conn.id();
                    tokio::spawn(async move {
                        handle_connection(conn, state).await;
                        tracing::debug!(%connection_id, "connection handler exited");
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "accept failed");
                }
            }
        }
    }
}
