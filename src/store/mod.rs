//! Local persistent key-value store with an expiring-record layer on top.
//!
//! The raw store has no native expiry; `TtlStore` adds it per record, checked
//! lazily on read. Storage failures never propagate out of this module:
//! writes degrade to no-ops and reads to misses.

mod kv;
mod ttl;

pub use kv::{KvStore, MemoryStore, SqliteStore};
pub use ttl::{Clock, SystemClock, TtlStore};
