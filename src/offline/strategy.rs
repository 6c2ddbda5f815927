//! The two interchangeable caching strategies.

use chrono::Utc;
use std::time::Duration;
use tracing::warn;

use super::fetcher::{FetchedResponse, Fetcher};
use super::request::FetchRequest;
use super::store::{OfflineStore, StoredResponse};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Live network response.
  Network,
  /// Cache entry within its freshness window.
  Cache,
  /// Cache entry served past its window because the network failed.
  StaleCache,
  /// Synthetic 503: network failed and nothing was cached.
  Synthetic,
}

/// What a strategy hands back to the caller. Strategies never fail: the worst
/// case is a synthetic 503.
#[derive(Debug, Clone)]
pub struct ServedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
  pub source: ServedFrom,
}

impl ServedResponse {
  pub(crate) fn from_network(response: FetchedResponse) -> Self {
    Self {
      status: response.status,
      content_type: response.content_type,
      body: response.body,
      source: ServedFrom::Network,
    }
  }

  fn from_cache(entry: StoredResponse, source: ServedFrom) -> Self {
    Self {
      status: entry.status,
      content_type: entry.content_type,
      body: entry.body,
      source,
    }
  }

  fn synthetic_unavailable() -> Self {
    Self {
      status: 503,
      content_type: Some("text/plain".to_string()),
      body: b"Service unavailable (offline)".to_vec(),
      source: ServedFrom::Synthetic,
    }
  }
}

fn store_if_ok<S: OfflineStore>(
  store: &S,
  set: &str,
  identity: &str,
  response: &FetchedResponse,
) {
  if response.status != 200 {
    return;
  }
  let entry = StoredResponse {
    status: response.status,
    content_type: response.content_type.clone(),
    body: response.body.clone(),
    stored_at: Utc::now(),
  };
  if let Err(e) = store.put(set, identity, &entry) {
    warn!(set, error = %e, "failed to store cache entry");
  }
}

fn lookup_quiet<S: OfflineStore>(store: &S, set: &str, identity: &str) -> Option<StoredResponse> {
  match store.lookup(set, identity) {
    Ok(entry) => entry,
    Err(e) => {
      warn!(set, error = %e, "cache lookup failed, treating as miss");
      None
    }
  }
}

/// Cache-first: serve the cached entry if present and fresh, otherwise go to
/// the network and cache a 200. On network failure the stale entry is served
/// if one exists.
///
/// With no `max_age` any cached entry counts as fresh.
pub async fn cache_first<S: OfflineStore, F: Fetcher>(
  store: &S,
  fetcher: &F,
  request: &FetchRequest,
  set: &str,
  max_age: Option<Duration>,
) -> ServedResponse {
  let identity = request.identity();
  let cached = lookup_quiet(store, set, &identity);

  if let Some(entry) = &cached {
    let fresh = match max_age {
      None => true,
      Some(max) => {
        let age = Utc::now().signed_duration_since(entry.stored_at);
        age.num_milliseconds() >= 0 && (age.num_milliseconds() as u128) < max.as_millis()
      }
    };
    if fresh {
      return ServedResponse::from_cache(entry.clone(), ServedFrom::Cache);
    }
  }

  match fetcher.fetch(request).await {
    Ok(response) => {
      store_if_ok(store, set, &identity, &response);
      ServedResponse::from_network(response)
    }
    Err(e) => {
      warn!(url = %request.url, error = %e, "network request failed");
      match cached {
        Some(entry) => ServedResponse::from_cache(entry, ServedFrom::StaleCache),
        None => ServedResponse::synthetic_unavailable(),
      }
    }
  }
}

/// Network-first: go to the network and cache a 200; fall back to the cached
/// entry when the network fails.
pub async fn network_first<S: OfflineStore, F: Fetcher>(
  store: &S,
  fetcher: &F,
  request: &FetchRequest,
  set: &str,
) -> ServedResponse {
  let identity = request.identity();

  match fetcher.fetch(request).await {
    Ok(response) => {
      store_if_ok(store, set, &identity, &response);
      ServedResponse::from_network(response)
    }
    Err(e) => {
      warn!(url = %request.url, error = %e, "network request failed, falling back to cache");
      match lookup_quiet(store, set, &identity) {
        Some(entry) => ServedResponse::from_cache(entry, ServedFrom::StaleCache),
        None => ServedResponse::synthetic_unavailable(),
      }
    }
  }
}
