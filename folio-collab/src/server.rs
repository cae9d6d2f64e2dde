//! Collaboration server: WebSocket edit channel plus HTTP sync surface.
//!
//! Architecture:
//! ```text
//! Editor A ──ws──┐                       ┌── SessionRegistry ──▸ Editor B, C
//!                ├── Broadcaster ────────┤
//! Editor B ──ws──┘        │              └── Synchronizer (single block)
//!                         │                        │
//! Editor A ──http── SyncGate ── Synchronizer ── NoteStore (RocksDB | memory)
//! ```
//!
//! Each WebSocket connection gets a session with a bounded outbound queue.
//! The connection task reads frames in order, hands each to the
//! broadcaster, and drains its queue back to the socket.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use folio_core::{MemoryStore, NoteStore, SyncError, Synchronizer};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message;

use crate::broadcaster::{Broadcaster, MessageOutcome};
use crate::gate::SyncGate;
use crate::http::{self, HttpState};
use crate::registry::{SessionHandle, SessionRegistry};
use crate::storage::{RocksStore, StoreConfig};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// WebSocket edit channel address
    pub ws_bind_addr: String,
    /// HTTP sync/CRUD address
    pub http_bind_addr: String,
    /// Per-session outbound queue length
    pub outbound_capacity: usize,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// Wait before applying a full sync, so bursts collapse to the newest
    pub sync_debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ws_bind_addr: "127.0.0.1:9090".to_string(),
            http_bind_addr: "127.0.0.1:8080".to_string(),
            outbound_capacity: 256,
            storage_path: None,
            sync_debounce_ms: 0,
        }
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    /// Frames answered with an error reply
    pub rejected_messages: u64,
    /// Frames understood but not applied
    pub failed_messages: u64,
}

pub struct CollabServer {
    config: ServerConfig,
    synchronizer: Synchronizer,
    broadcaster: Broadcaster,
    gate: Arc<SyncGate>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    /// Build a server, opening RocksDB when `storage_path` is set.
    pub fn new(config: ServerConfig) -> Result<Self, SyncError> {
        let store: Arc<dyn NoteStore> = match &config.storage_path {
            Some(path) => Arc::new(RocksStore::open(StoreConfig::new(path))?),
            None => {
                log::warn!("No storage path configured; documents live in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn NoteStore>) -> Self {
        let synchronizer = Synchronizer::new(store);
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(synchronizer.clone(), registry);
        let gate = Arc::new(SyncGate::new(
            synchronizer.clone(),
            Duration::from_millis(config.sync_debounce_ms),
        ));
        Self {
            config,
            synchronizer,
            broadcaster,
            gate,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// In-memory server with default configuration.
    pub fn with_defaults() -> Self {
        Self::with_store(ServerConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Bind both configured addresses and serve until an accept fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let ws_listener = TcpListener::bind(&self.config.ws_bind_addr).await?;
        let http_listener = TcpListener::bind(&self.config.http_bind_addr).await?;
        self.serve(ws_listener, http_listener).await?;
        Ok(())
    }

    /// Serve on already-bound listeners.
    pub async fn serve(&self, ws_listener: TcpListener, http_listener: TcpListener) -> std::io::Result<()> {
        log::info!("Edit channel listening on {}", ws_listener.local_addr()?);
        log::info!("Sync API listening on {}", http_listener.local_addr()?);

        let app = http::router(HttpState::new(self.gate.clone()));
        tokio::try_join!(self.accept_loop(ws_listener), async {
            axum::serve(http_listener, app).await
        })?;
        Ok(())
    }

    async fn accept_loop(&self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let broadcaster = self.broadcaster.clone();
            let stats = self.stats.clone();
            let capacity = self.config.outbound_capacity;

            tokio::spawn(async move {
                if let Err(e) =
                    Self::handle_connection(stream, addr, broadcaster, stats, capacity).await
                {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        broadcaster: Broadcaster,
        stats: Arc<RwLock<ServerStats>>,
        capacity: usize,
    ) -> Result<(), BoxError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        let (session, outbound_rx) = SessionHandle::channel(capacity);
        log::info!("Session {} opened from {addr}", session.id());

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let result = Self::session_loop(ws_stream, &session, outbound_rx, &broadcaster, &stats).await;

        // Always leave every document, whatever ended the loop
        broadcaster.disconnect(session.id()).await;
        stats.write().await.active_connections -= 1;
        log::info!("Session {} closed", session.id());

        result
    }

    async fn session_loop(
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        session: &SessionHandle,
        mut outbound_rx: tokio::sync::mpsc::Receiver<crate::registry::Outbound>,
        broadcaster: &Broadcaster,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), BoxError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    let outcome = match msg {
                        Some(Ok(Message::Text(text))) => {
                            broadcaster.handle_message(session, text.as_str()).await
                        }
                        Some(Ok(Message::Binary(_))) => broadcaster.reject_binary(session),
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(e)) => {
                            log::warn!("WebSocket error on session {}: {e}", session.id());
                            break;
                        }
                        _ => continue,
                    };

                    {
                        let mut s = stats.write().await;
                        s.total_messages += 1;
                        match &outcome {
                            MessageOutcome::Rejected { .. } => s.rejected_messages += 1,
                            MessageOutcome::Failed(_) => s.failed_messages += 1,
                            MessageOutcome::Broadcast(_) => {}
                        }
                    }
                    if let Some(reply) = outcome.reply() {
                        ws_sender.send(Message::text(reply.to_string())).await?;
                    }
                }

                Some(frame) = outbound_rx.recv() => {
                    ws_sender.send(Message::text(frame.to_string())).await?;
                }
            }
        }

        Ok(())
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.broadcaster.registry()
    }
}
