//! Session storage for the conversion server.
//!
//! The table owns every live session. It is touched only by the dispatch
//! worker, so nothing in this module is synchronized.
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ SessionTable (capacity 2..=128)                    │
//! │                                                    │
//! │  index: HashMap<SessionId, slot>                   │
//! │  slots: [Some(entry), None, Some(entry), ...]      │
//! │  order: oldest ──▶ ... ──▶ newest                  │
//! │           ▲                                        │
//! │           └── evicted first when the table is full │
//! └────────────────────────────────────────────────────┘
//!            ▲
//!            │ allocate(table)
//! ┌──────────┴───────────┐
//! │ SessionIdAllocator   │  OsRng, weak PRNG fallback
//! └──────────────────────┘
//! ```

mod id_allocator;
mod table;
mod types;

pub use id_allocator::{EntropySource, OsEntropy, SessionIdAllocator};
pub use table::SessionTable;
pub use types::{Session, SessionEntry, SessionId};
