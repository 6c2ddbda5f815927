//! Console rendering of endpoint status and sweep results.
//!
//! The checker produces structured results and status transitions; everything
//! about presenting them lives here, so the probe logic stays testable
//! without any output attached.

use chrono::Utc;

use crate::checker::{CheckSummary, StatusSink};
use crate::config::ResolverEndpoint;
use crate::registry::{CheckResultSet, ResolverStatus};

fn status_text(status: ResolverStatus) -> String {
  match status {
    ResolverStatus::Untested => "-".to_string(),
    ResolverStatus::Checking => "checking...".to_string(),
    ResolverStatus::Available { latency_ms } => format!("✓ {}ms", latency_ms),
    ResolverStatus::Unavailable => "✗ timeout".to_string(),
  }
}

/// Sink that prints each status transition as it happens.
pub struct ConsoleReporter;

impl StatusSink for ConsoleReporter {
  fn status_changed(&self, index: usize, endpoint: &ResolverEndpoint, status: ResolverStatus) {
    println!("  [{}] {:<16} {}", index, endpoint.name, status_text(status));
  }
}

/// Print the endpoint list with statuses and the selection marker.
pub fn print_endpoints(
  endpoints: &[ResolverEndpoint],
  statuses: &[ResolverStatus],
  selected: usize,
) {
  for (index, endpoint) in endpoints.iter().enumerate() {
    let marker = if index == selected { "*" } else { " " };
    let status = statuses
      .get(index)
      .copied()
      .unwrap_or(ResolverStatus::Untested);
    println!(
      "{} [{}] {:<16} {}",
      marker,
      index,
      endpoint.name,
      status_text(status)
    );
  }
}

/// Print the one-line outcome of a sweep.
pub fn print_summary(summary: &CheckSummary) {
  println!(
    "{}/{} endpoints available",
    summary.available, summary.total
  );
}

/// Print how old a cached result set is.
pub fn print_cached_age(cached: &CheckResultSet) {
  let age_minutes = (Utc::now().timestamp_millis() - cached.captured_at_ms) / 60_000;
  if age_minutes < 1 {
    println!("cached results from less than a minute ago:");
  } else {
    println!("cached results from {} minutes ago:", age_minutes);
  }
}
