//! Durable backend for blocks and documents.
//!
//! ```text
//! ┌──────────────┐   BlockStore    ┌──────────────────────────────────────┐
//! │ Synchronizer │ ──────────────► │ RocksStore                           │
//! │              │  DocumentStore  │   CF "blocks"     id → lz4(json)     │
//! └──────────────┘                 │   CF "documents"  id → bincode       │
//!                                  │   CF "file_index" fileId → doc id    │
//!                                  └──────────────────────────────────────┘
//! ```
//!
//! Without a data directory the server falls back to
//! [`folio_core::MemoryStore`].

pub mod rocks;

pub use rocks::{RocksStore, StoreConfig, StoreError};
