//! Expiring-record layer over a raw [`KvStore`].

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::kv::KvStore;

/// Clock seam so expiry can be tested against a controlled timeline.
pub trait Clock: Send + Sync {
  /// Current time as milliseconds since the Unix epoch.
  fn now_ms(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now_ms(&self) -> i64 {
    chrono::Utc::now().timestamp_millis()
  }
}

/// One expiring record as persisted in the raw store.
#[derive(Debug, Serialize, Deserialize)]
struct TtlRecord<T> {
  value: T,
  /// Epoch milliseconds at write time.
  timestamp: i64,
  /// Validity window in milliseconds.
  ttl: i64,
}

/// Key-value store with optional per-record expiry.
///
/// Plain `set`/`get` records have no expiry. `set_with_ttl`/`get_with_ttl`
/// records carry a validity window checked lazily on read: a record whose age
/// is strictly greater than its TTL is deleted and treated as a miss. There
/// is no background eviction.
///
/// No method here returns an error. Serialization and storage failures are
/// logged and degrade to a no-op (writes) or the caller's default (reads).
pub struct TtlStore<S: KvStore, C: Clock = SystemClock> {
  store: Arc<S>,
  clock: C,
}

impl<S: KvStore> TtlStore<S> {
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(store),
      clock: SystemClock,
    }
  }
}

impl<S: KvStore, C: Clock> TtlStore<S, C> {
  pub fn with_clock(store: S, clock: C) -> Self {
    Self {
      store: Arc::new(store),
      clock,
    }
  }

  /// Store a non-expiring value. Returns false if the write was dropped.
  pub fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
    let serialized = match serde_json::to_string(value) {
      Ok(s) => s,
      Err(e) => {
        warn!(key, error = %e, "failed to serialize value, dropping write");
        return false;
      }
    };
    if let Err(e) = self.store.set(key, &serialized) {
      warn!(key, error = %e, "store write failed, dropping write");
      return false;
    }
    true
  }

  /// Get a non-expiring value, or `default` on miss or any failure.
  pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return default,
      Err(e) => {
        warn!(key, error = %e, "store read failed, returning default");
        return default;
      }
    };
    match serde_json::from_str(&raw) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "corrupt record, returning default");
        default
      }
    }
  }

  /// Delete a key. Returns false if the delete was dropped.
  pub fn remove(&self, key: &str) -> bool {
    if let Err(e) = self.store.remove(key) {
      warn!(key, error = %e, "store delete failed");
      return false;
    }
    true
  }

  /// Store a value with a validity window of `ttl_minutes`.
  pub fn set_with_ttl<T: Serialize>(&self, key: &str, value: T, ttl_minutes: i64) -> bool {
    let record = TtlRecord {
      value,
      timestamp: self.clock.now_ms(),
      ttl: ttl_minutes * 60_000,
    };
    self.set(key, &record)
  }

  /// Get a value written with [`set_with_ttl`](Self::set_with_ttl).
  ///
  /// An expired record (age strictly greater than its TTL, even by 1ms) is
  /// deleted on the spot and `default` is returned.
  pub fn get_with_ttl<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
    let raw = match self.store.get(key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return default,
      Err(e) => {
        warn!(key, error = %e, "store read failed, returning default");
        return default;
      }
    };

    let record: TtlRecord<T> = match serde_json::from_str(&raw) {
      Ok(record) => record,
      Err(e) => {
        warn!(key, error = %e, "corrupt expiring record, returning default");
        return default;
      }
    };

    if self.clock.now_ms() - record.timestamp > record.ttl {
      self.remove(key);
      return default;
    }

    record.value
  }
}

impl<S: KvStore, C: Clock + Clone> Clone for TtlStore<S, C> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      clock: self.clock.clone(),
    }
  }
}
