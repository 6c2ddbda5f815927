//! Offline resource cache: versioned named cache sets with an
//! install/activate lifecycle and per-request strategy dispatch.
//!
//! Requests for the site's own resources and the allow-listed resolver hosts
//! are routed through a caching strategy; everything else passes straight
//! through to the network.

mod fetcher;
mod manager;
mod request;
mod store;
mod strategy;

pub use fetcher::{FetchedResponse, Fetcher, HttpFetcher};
pub use manager::{OfflineCache, Route, SetKind, IMAGE_MAX_AGE};
pub use request::{Destination, FetchRequest};
pub use store::{MemoryOfflineStore, OfflineStore, SqliteOfflineStore, StoredResponse};
pub use strategy::{cache_first, network_first, ServedFrom, ServedResponse};
