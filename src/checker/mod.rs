//! Resolver health checking and automatic selection.
//!
//! A sweep probes every endpoint strictly in registry order, staggered so the
//! probes never burst out together, then auto-selects the fastest available
//! endpoint and persists the full result set with a 24-hour validity window.
//!
//! Probe failures are data (an unavailable entry), never errors: a sweep
//! cannot fail because endpoints are down.

mod probe;

pub use probe::{HttpProber, Prober};

use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::ResolverEndpoint;
use crate::registry::{CheckResultSet, EndpointCheck, Registry, ResolverStatus};
use crate::store::{Clock, KvStore, TtlStore};

/// Persisted key for the last sweep's results.
pub const KEY_CHECK_RESULTS: &str = "apiCheckResults";
/// Validity window for persisted sweep results, in minutes.
pub const CHECK_RESULTS_TTL_MINUTES: i64 = 24 * 60;

/// Receiver for per-endpoint status transitions, so a rendering adapter can
/// follow a sweep live without the checker knowing anything about output.
pub trait StatusSink {
  fn status_changed(&self, index: usize, endpoint: &ResolverEndpoint, status: ResolverStatus);
}

/// Sink that ignores all transitions.
pub struct NoopSink;

impl StatusSink for NoopSink {
  fn status_changed(&self, _index: usize, _endpoint: &ResolverEndpoint, _status: ResolverStatus) {}
}

/// Summary returned by [`HealthChecker::check_all`].
#[derive(Debug, Clone)]
pub struct CheckSummary {
  pub total: usize,
  pub available: usize,
  pub results: CheckResultSet,
}

pub struct HealthChecker<P: Prober> {
  prober: P,
  /// Per-probe cap; also the latency recorded for unavailable endpoints.
  timeout: Duration,
  /// Delay between consecutive probe starts.
  stagger: Duration,
}

impl<P: Prober> HealthChecker<P> {
  pub fn new(prober: P, timeout: Duration, stagger: Duration) -> Self {
    Self {
      prober,
      timeout,
      stagger,
    }
  }

  /// Probe a single endpoint and settle its status.
  ///
  /// Errors only for an out-of-range index; the probe outcome itself is
  /// always returned as data.
  pub async fn check_one<S: KvStore, C: Clock + Clone>(
    &self,
    registry: &mut Registry<S, C>,
    index: usize,
    sink: &dyn StatusSink,
  ) -> Result<EndpointCheck> {
    let endpoint = registry
      .endpoints()
      .get(index)
      .cloned()
      .ok_or_else(|| eyre!("No endpoint at index {}", index))?;

    registry.set_status(index, ResolverStatus::Checking);
    sink.status_changed(index, &endpoint, ResolverStatus::Checking);

    let start = tokio::time::Instant::now();
    let outcome = self.prober.probe(&endpoint.url).await;

    let check = match outcome {
      Ok(()) => {
        let latency_ms = start.elapsed().as_millis() as u64;
        EndpointCheck {
          index,
          name: endpoint.name.clone(),
          available: true,
          latency_ms,
        }
      }
      Err(e) => {
        debug!(endpoint = %endpoint.name, error = %e, "probe settled unavailable");
        EndpointCheck {
          index,
          name: endpoint.name.clone(),
          available: false,
          latency_ms: self.timeout.as_millis() as u64,
        }
      }
    };

    let status = if check.available {
      ResolverStatus::Available {
        latency_ms: check.latency_ms,
      }
    } else {
      ResolverStatus::Unavailable
    };
    registry.set_status(index, status);
    sink.status_changed(index, &endpoint, status);

    Ok(check)
  }

  /// Sweep every endpoint sequentially, in registry order.
  ///
  /// Probes never overlap; the sweep sleeps for the stagger interval between
  /// probe starts. Afterwards the fastest available endpoint is selected
  /// (ties go to the lower index) and the result set is persisted. If no
  /// endpoint is available the selection is left unchanged.
  pub async fn check_all<S: KvStore, C: Clock + Clone>(
    &self,
    registry: &mut Registry<S, C>,
    store: &TtlStore<S, C>,
    sink: &dyn StatusSink,
  ) -> Result<CheckSummary> {
    info!(total = registry.len(), "checking resolver endpoints");

    let mut results = Vec::with_capacity(registry.len());
    for index in 0..registry.len() {
      if index > 0 {
        tokio::time::sleep(self.stagger).await;
      }
      let check = self.check_one(registry, index, sink).await?;
      results.push(check);
    }

    let mut available: Vec<&EndpointCheck> = results.iter().filter(|r| r.available).collect();
    // Stable sort: equal latencies keep registry order, so the lower index wins
    available.sort_by_key(|r| r.latency_ms);
    let available_count = available.len();

    if let Some(fastest) = available.first() {
      let index = fastest.index;
      registry.select(index)?;
      info!(
        endpoint = %fastest.name,
        latency_ms = fastest.latency_ms,
        "auto-selected fastest endpoint"
      );
    }

    let result_set = CheckResultSet {
      captured_at_ms: chrono::Utc::now().timestamp_millis(),
      results,
    };
    store.set_with_ttl(KEY_CHECK_RESULTS, result_set.clone(), CHECK_RESULTS_TTL_MINUTES);

    info!(
      available = available_count,
      total = registry.len(),
      "sweep complete"
    );

    Ok(CheckSummary {
      total: registry.len(),
      available: available_count,
      results: result_set,
    })
  }
}

/// Load the last persisted sweep results, if any are still within their
/// validity window.
pub fn load_cached_results<S: KvStore, C: Clock>(store: &TtlStore<S, C>) -> Option<CheckResultSet> {
  store.get_with_ttl(KEY_CHECK_RESULTS, None)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{MemoryStore, SystemClock};
  use std::collections::HashMap;
  use std::sync::Mutex;
  use tokio::time::Instant;

  /// Scripted prober: per-URL latency and outcome, recording probe starts.
  struct FakeProber {
    script: HashMap<String, (u64, bool)>,
    starts: Mutex<Vec<(String, Instant)>>,
  }

  impl FakeProber {
    fn new(script: &[(&str, u64, bool)]) -> Self {
      Self {
        script: script
          .iter()
          .map(|(url, ms, ok)| (url.to_string(), (*ms, *ok)))
          .collect(),
        starts: Mutex::new(Vec::new()),
      }
    }

    fn starts(&self) -> Vec<(String, Instant)> {
      self.starts.lock().unwrap().clone()
    }
  }

  impl Prober for FakeProber {
    async fn probe(&self, url: &str) -> Result<()> {
      self
        .starts
        .lock()
        .unwrap()
        .push((url.to_string(), Instant::now()));
      let (delay_ms, ok) = *self.script.get(url).unwrap_or(&(5000, false));
      tokio::time::sleep(Duration::from_millis(delay_ms)).await;
      if ok {
        Ok(())
      } else {
        Err(eyre!("scripted failure"))
      }
    }
  }

  fn endpoint_url(i: usize) -> String {
    format!("https://jx{}.example/?url=", i)
  }

  fn registry(n: usize, store: &TtlStore<MemoryStore, SystemClock>) -> Registry<MemoryStore, SystemClock> {
    let endpoints = (0..n)
      .map(|i| ResolverEndpoint {
        name: format!("ep{}", i),
        url: endpoint_url(i),
      })
      .collect();
    Registry::new(endpoints, store.clone())
  }

  fn checker(prober: FakeProber) -> HealthChecker<FakeProber> {
    HealthChecker::new(
      prober,
      Duration::from_millis(5000),
      Duration::from_millis(200),
    )
  }

  #[tokio::test(start_paused = true)]
  async fn test_every_endpoint_settles() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(3, &store);
    let prober = FakeProber::new(&[
      (&endpoint_url(0), 50, true),
      (&endpoint_url(1), 5000, false),
      (&endpoint_url(2), 10, true),
    ]);

    let summary = checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.available, 2);
    for status in reg.statuses() {
      assert!(matches!(
        status,
        ResolverStatus::Available { .. } | ResolverStatus::Unavailable
      ));
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_probes_run_in_order_with_stagger() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(6, &store);
    let script: Vec<(String, u64, bool)> =
      (0..6).map(|i| (endpoint_url(i), 0u64, true)).collect();
    let script_refs: Vec<(&str, u64, bool)> = script
      .iter()
      .map(|(url, ms, ok)| (url.as_str(), *ms, *ok))
      .collect();
    let prober = FakeProber::new(&script_refs);

    let begin = Instant::now();
    let checker = checker(prober);
    checker
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    // At least (N-1) stagger intervals of wall time
    assert!(begin.elapsed() >= Duration::from_millis(5 * 200));

    let starts = checker.prober.starts();
    assert_eq!(starts.len(), 6);
    for (i, (url, _)) in starts.iter().enumerate() {
      assert_eq!(*url, endpoint_url(i));
    }
    for pair in starts.windows(2) {
      let gap = pair[1].1 - pair[0].1;
      assert!(gap >= Duration::from_millis(200), "gap was {:?}", gap);
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_selects_fastest_available() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(3, &store);
    let prober = FakeProber::new(&[
      (&endpoint_url(0), 300, true),
      (&endpoint_url(1), 40, true),
      (&endpoint_url(2), 90, true),
    ]);

    checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    assert_eq!(reg.selected_index(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_latency_tie_goes_to_lower_index() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(3, &store);
    reg.select(2).unwrap();
    let prober = FakeProber::new(&[
      (&endpoint_url(0), 5000, false),
      (&endpoint_url(1), 70, true),
      (&endpoint_url(2), 70, true),
    ]);

    checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    assert_eq!(reg.selected_index(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_available_leaves_selection_unchanged() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(3, &store);
    reg.select(1).unwrap();
    let prober = FakeProber::new(&[
      (&endpoint_url(0), 5000, false),
      (&endpoint_url(1), 5000, false),
      (&endpoint_url(2), 5000, false),
    ]);

    let summary = checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    assert_eq!(summary.available, 0);
    assert_eq!(reg.selected_index(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_six_endpoint_scenario() {
    // Endpoint 2 answers in 80ms, endpoint 4 in 120ms, the rest time out
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(6, &store);
    let prober = FakeProber::new(&[
      (&endpoint_url(2), 80, true),
      (&endpoint_url(4), 120, true),
    ]);

    let summary = checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    assert_eq!(reg.selected_index(), 2);
    assert_eq!(summary.available, 2);
    assert_eq!(summary.results.results.len(), 6);

    // Unavailable entries record the cap as latency
    assert!(!summary.results.results[0].available);
    assert_eq!(summary.results.results[0].latency_ms, 5000);
    assert_eq!(summary.results.results[2].latency_ms, 80);
    assert_eq!(summary.results.results[4].latency_ms, 120);
  }

  #[tokio::test(start_paused = true)]
  async fn test_results_persisted_and_restorable() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(2, &store);
    let prober = FakeProber::new(&[
      (&endpoint_url(0), 30, true),
      (&endpoint_url(1), 5000, false),
    ]);

    let summary = checker(prober)
      .check_all(&mut reg, &store, &NoopSink)
      .await
      .unwrap();

    let cached = load_cached_results(&store).expect("results should be cached");
    assert_eq!(cached, summary.results);

    // A fresh registry can render statuses from the cache without probing
    let mut reg2 = registry(2, &store);
    reg2.apply_cached(&cached);
    assert!(matches!(
      reg2.status(0),
      Some(ResolverStatus::Available { latency_ms: 30 })
    ));
    assert_eq!(reg2.status(1), Some(ResolverStatus::Unavailable));
  }

  #[tokio::test]
  async fn test_check_one_invalid_index_errors() {
    let store = TtlStore::new(MemoryStore::new());
    let mut reg = registry(1, &store);
    let prober = FakeProber::new(&[]);
    let result = checker(prober).check_one(&mut reg, 5, &NoopSink).await;
    assert!(result.is_err());
  }
}
