//! Resolver endpoint registry and selection state.
//!
//! Holds the ordered, fixed endpoint list plus per-endpoint probe status and
//! the persisted "currently selected" index. All state is explicit and owned
//! here; nothing ambient.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ResolverEndpoint;
use crate::store::{Clock, KvStore, TtlStore};

/// Persisted key for the selected endpoint index. Not TTL-bound.
pub const KEY_LAST_API_INDEX: &str = "lastApiIndex";
/// Persisted key for the last video URL the user played. Not TTL-bound.
pub const KEY_LAST_URL: &str = "lastUrl";

/// Probe status of one endpoint within the current check cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverStatus {
  /// No probe has run yet this cycle.
  Untested,
  /// A probe is in flight.
  Checking,
  /// The probe settled before the cap. Latency in milliseconds.
  ///
  /// "Available" means the request did not error or time out, not that the
  /// endpoint returned a success status — opaque resolver responses carry no
  /// usable status.
  Available { latency_ms: u64 },
  /// The probe errored or hit the cap.
  Unavailable,
}

/// One endpoint's outcome within a persisted [`CheckResultSet`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointCheck {
  pub index: usize,
  pub name: String,
  pub available: bool,
  pub latency_ms: u64,
}

/// The full outcome of one sweep, persisted with a 24-hour validity window
/// and superseded wholesale by the next sweep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckResultSet {
  pub captured_at_ms: i64,
  pub results: Vec<EndpointCheck>,
}

/// Ordered endpoint list plus selection and per-endpoint status.
pub struct Registry<S: KvStore, C: Clock> {
  endpoints: Vec<ResolverEndpoint>,
  statuses: Vec<ResolverStatus>,
  selected: usize,
  store: TtlStore<S, C>,
}

impl<S: KvStore, C: Clock + Clone> Registry<S, C> {
  /// Build the registry from the configured endpoint list, restoring the
  /// persisted selection.
  ///
  /// A persisted index that no longer fits the list (the list changed between
  /// runs) is clamped back to 0 rather than carried out of range.
  pub fn new(endpoints: Vec<ResolverEndpoint>, store: TtlStore<S, C>) -> Self {
    let statuses = vec![ResolverStatus::Untested; endpoints.len()];

    let persisted: i64 = store.get(KEY_LAST_API_INDEX, 0);
    let selected = if persisted >= 0 && (persisted as usize) < endpoints.len() {
      persisted as usize
    } else {
      if persisted != 0 {
        warn!(
          index = persisted,
          endpoints = endpoints.len(),
          "persisted selection out of range, resetting to 0"
        );
      }
      0
    };

    Self {
      endpoints,
      statuses,
      selected,
      store,
    }
  }

  pub fn endpoints(&self) -> &[ResolverEndpoint] {
    &self.endpoints
  }

  pub fn len(&self) -> usize {
    self.endpoints.len()
  }

  pub fn is_empty(&self) -> bool {
    self.endpoints.is_empty()
  }

  pub fn status(&self, index: usize) -> Option<ResolverStatus> {
    self.statuses.get(index).copied()
  }

  pub fn statuses(&self) -> &[ResolverStatus] {
    &self.statuses
  }

  pub(crate) fn set_status(&mut self, index: usize, status: ResolverStatus) {
    if let Some(slot) = self.statuses.get_mut(index) {
      *slot = status;
    }
  }

  pub fn selected_index(&self) -> usize {
    self.selected
  }

  /// The endpoint at the selected index.
  pub fn current(&self) -> &ResolverEndpoint {
    &self.endpoints[self.selected]
  }

  /// Select an endpoint by index and persist the choice.
  ///
  /// Out-of-range indices are rejected, never silently accepted. Persistence
  /// failure is non-fatal: the in-memory selection still changes.
  pub fn select(&mut self, index: usize) -> Result<()> {
    if index >= self.endpoints.len() {
      return Err(eyre!(
        "Selection index {} out of range (have {} endpoints)",
        index,
        self.endpoints.len()
      ));
    }
    self.selected = index;
    self.store.set(KEY_LAST_API_INDEX, &(index as i64));
    Ok(())
  }

  /// Build the playback URL for a target video: the selected endpoint's URL
  /// template with the percent-encoded target appended.
  pub fn playback_url(&self, target: &str) -> String {
    format!("{}{}", self.current().url, encode_component(target))
  }

  /// Remember the last played URL across sessions.
  pub fn remember_last_url(&self, target: &str) {
    self.store.set(KEY_LAST_URL, &target.to_string());
  }

  pub fn last_url(&self) -> Option<String> {
    let url: String = self.store.get(KEY_LAST_URL, String::new());
    if url.is_empty() {
      None
    } else {
      Some(url)
    }
  }

  /// Render endpoint statuses from a cached result set, without probing.
  /// Entries whose index no longer fits the list are ignored.
  pub fn apply_cached(&mut self, cached: &CheckResultSet) {
    for result in &cached.results {
      let status = if result.available {
        ResolverStatus::Available {
          latency_ms: result.latency_ms,
        }
      } else {
        ResolverStatus::Unavailable
      };
      self.set_status(result.index, status);
    }
  }
}

/// Percent-encode a string for use as a query value, as the resolver
/// templates expect.
pub fn encode_component(value: &str) -> String {
  url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryStore, TtlStore};

  fn endpoints(n: usize) -> Vec<ResolverEndpoint> {
    (0..n)
      .map(|i| ResolverEndpoint {
        name: format!("ep{}", i),
        url: format!("https://jx{}.example/?url=", i),
      })
      .collect()
  }

  fn registry(n: usize) -> Registry<MemoryStore, crate::store::SystemClock> {
    Registry::new(endpoints(n), TtlStore::new(MemoryStore::new()))
  }

  #[test]
  fn test_defaults_to_first_endpoint() {
    let reg = registry(3);
    assert_eq!(reg.selected_index(), 0);
    assert_eq!(reg.current().name, "ep0");
    assert!(reg.statuses().iter().all(|s| *s == ResolverStatus::Untested));
  }

  #[test]
  fn test_select_persists_across_instances() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = Registry::new(endpoints(3), store.clone());
    reg.select(2).unwrap();

    let reg2 = Registry::new(endpoints(3), store);
    assert_eq!(reg2.selected_index(), 2);
  }

  #[test]
  fn test_select_out_of_range_is_rejected() {
    let mut reg = registry(3);
    assert!(reg.select(3).is_err());
    assert_eq!(reg.selected_index(), 0);
  }

  #[test]
  fn test_persisted_index_clamped_when_list_shrinks() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = Registry::new(endpoints(5), store.clone());
    reg.select(4).unwrap();

    // Same store, shorter list: the stale index must not survive
    let reg2 = Registry::new(endpoints(2), store);
    assert_eq!(reg2.selected_index(), 0);
  }

  #[test]
  fn test_playback_url_encodes_target() {
    let reg = registry(1);
    let url = reg.playback_url("https://v.example/watch?id=1&t=2");
    assert_eq!(
      url,
      "https://jx0.example/?url=https%3A%2F%2Fv.example%2Fwatch%3Fid%3D1%26t%3D2"
    );
  }

  #[test]
  fn test_apply_cached_sets_statuses() {
    let mut reg = registry(3);
    let cached = CheckResultSet {
      captured_at_ms: 0,
      results: vec![
        EndpointCheck {
          index: 0,
          name: "ep0".into(),
          available: true,
          latency_ms: 80,
        },
        EndpointCheck {
          index: 1,
          name: "ep1".into(),
          available: false,
          latency_ms: 5000,
        },
        // Stale entry for an endpoint that no longer exists
        EndpointCheck {
          index: 9,
          name: "gone".into(),
          available: true,
          latency_ms: 1,
        },
      ],
    };
    reg.apply_cached(&cached);
    assert_eq!(reg.status(0), Some(ResolverStatus::Available { latency_ms: 80 }));
    assert_eq!(reg.status(1), Some(ResolverStatus::Unavailable));
    assert_eq!(reg.status(2), Some(ResolverStatus::Untested));
  }
}
