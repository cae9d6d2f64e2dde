//! # folio-core: Document block model and chain synchronizer
//!
//! A note is a `SuperObject` holding head/tail ids into a doubly-linked
//! chain of `ContentBlock`s. The editor periodically sends its whole block
//! list; the [`Synchronizer`] reconciles it with the stored chain.
//!
//! ```text
//!  SuperObject ── firstItem ──▸ [b1] ⇄ [b2] ⇄ [b3] ◂── lastItem
//! ```
//!
//! ## Modules
//!
//! - [`model`]: ContentBlock, SuperObject and request shapes
//! - [`store`]: BlockStore / DocumentStore contracts, in-memory arena
//! - [`chain`]: cycle-safe chain walks and verification
//! - [`sync`]: full sync plus single-block create/update/delete
//! - [`error`]: SyncError taxonomy

pub mod chain;
pub mod error;
pub mod model;
pub mod store;
pub mod sync;

pub use error::{ErrorKind, Result, SyncError};
pub use model::{
    BlockData, BlockInput, BlockPatch, ContentBlock, Decoration, DocumentPatch, NewDocument,
    SuperObject, Template,
};
pub use store::{BlockStore, DocumentStore, MemoryStore, NoteStore};
pub use sync::Synchronizer;
