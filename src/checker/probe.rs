//! The probe seam: one bounded-time reachability check against one resolver.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

/// A single reachability probe against a resolver URL.
///
/// A probe that resolves `Ok` settled within the cap; the HTTP status is
/// deliberately not inspected, since resolver endpoints answer cross-origin
/// probes opaquely. `Err` means the request errored or was cancelled at the
/// cap. Timeouts and network errors are not distinguished.
pub trait Prober: Send + Sync {
  fn probe(&self, url: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Prober backed by a reqwest HEAD request.
///
/// The cap is enforced as the client timeout, which cancels the in-flight
/// request rather than racing it against a second timer: each probe observes
/// exactly one outcome.
pub struct HttpProber {
  client: reqwest::Client,
}

impl HttpProber {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

impl Prober for HttpProber {
  async fn probe(&self, url: &str) -> Result<()> {
    self
      .client
      .head(url)
      .send()
      .await
      .map_err(|e| eyre!("Probe to {} failed: {}", url, e))?;
    Ok(())
  }
}
