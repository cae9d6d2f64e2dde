//! # folio-collab: Live editing sessions and the sync API for Folio
//!
//! Two channels per editor:
//!
//! ```text
//! ┌─────────────┐   WebSocket (JSON EditEvent)   ┌──────────────────┐
//! │   Editor    │ ◄────────────────────────────► │  CollabServer    │
//! │             │   HTTP (full block list sync)  │                  │
//! │             │ ─────────────────────────────► │  SyncGate        │
//! └─────────────┘                                └────────┬─────────┘
//!                                                         │
//!                                          Synchronizer ──┴── NoteStore
//! ```
//!
//! Single-block edits are persisted and relayed to every other session on
//! the same document. Full syncs replace the stored chain, newest request
//! wins. There is no merge: the last write to reach the store is kept.
//!
//! ## Modules
//!
//! - [`protocol`]: EditEvent wire format and error replies
//! - [`registry`]: document → session membership, non-blocking fan-out
//! - [`broadcaster`]: apply-then-relay pipeline for edit events
//! - [`gate`]: latest-wins admission for full syncs
//! - [`http`]: axum routes for documents, syncs and blocks
//! - [`server`]: listeners and per-connection tasks
//! - [`storage`]: RocksDB-backed store

pub mod broadcaster;
pub mod gate;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod storage;

pub use broadcaster::{Broadcaster, MessageOutcome};
pub use gate::{GateOutcome, SyncGate};
pub use http::{router, ApiError, HttpState};
pub use protocol::{EditEvent, EditKind, ErrorReply, EventBlock, ProtocolError};
pub use registry::{
    BroadcastReport, ConnectionId, RegistryStats, SessionHandle, SessionRegistry,
};
pub use server::{CollabServer, ServerConfig, ServerStats};
pub use storage::{RocksStore, StoreConfig, StoreError};
