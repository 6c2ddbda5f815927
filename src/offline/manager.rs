//! Versioned cache-set lifecycle and per-request strategy dispatch.

use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::fetcher::Fetcher;
use super::request::{Destination, FetchRequest};
use super::store::OfflineStore;
use super::strategy::{cache_first, network_first, ServedResponse};
use crate::config::OfflineConfig;

/// Staleness bound for cached images: 30 days.
pub const IMAGE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// The four named cache sets. Actual set names carry the shared version tag,
/// e.g. `static-v1.0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
  Static,
  Dynamic,
  Api,
  Images,
}

impl SetKind {
  pub const ALL: [SetKind; 4] = [SetKind::Static, SetKind::Dynamic, SetKind::Api, SetKind::Images];

  fn prefix(&self) -> &'static str {
    match self {
      SetKind::Static => "static",
      SetKind::Dynamic => "dynamic",
      SetKind::Api => "api",
      SetKind::Images => "images",
    }
  }

  pub fn name(&self, version: &str) -> String {
    format!("{}-{}", self.prefix(), version)
  }
}

/// Where a classified request goes. First matching rule wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Straight to the network, uncached.
  PassThrough,
  NetworkFirst {
    set: SetKind,
  },
  CacheFirst {
    set: SetKind,
    max_age: Option<Duration>,
  },
}

/// The offline cache manager: owns the version tag, the set names, the
/// precache manifest and the allow-list, and routes each request through a
/// strategy. Requests are handled independently; overlapping writes to the
/// same entry are last-write-wins.
pub struct OfflineCache<S: OfflineStore, F: Fetcher> {
  store: S,
  fetcher: F,
  version: String,
  origin: Url,
  static_assets: Vec<String>,
  allowed_hosts: Vec<String>,
}

impl<S: OfflineStore, F: Fetcher> OfflineCache<S, F> {
  pub fn new(
    store: S,
    fetcher: F,
    config: &OfflineConfig,
    allowed_hosts: Vec<String>,
  ) -> Result<Self> {
    let origin = Url::parse(&config.site_origin)
      .map_err(|e| eyre!("Invalid site origin {}: {}", config.site_origin, e))?;

    Ok(Self {
      store,
      fetcher,
      version: config.cache_version.clone(),
      origin,
      static_assets: config.static_assets.clone(),
      allowed_hosts,
    })
  }

  pub fn set_name(&self, kind: SetKind) -> String {
    kind.name(&self.version)
  }

  /// The four set names for the current version.
  pub fn current_set_names(&self) -> Vec<String> {
    SetKind::ALL.iter().map(|k| k.name(&self.version)).collect()
  }

  /// Install phase: eagerly populate the static set from the asset manifest.
  ///
  /// Failures are logged per asset and never fatal; returns how many assets
  /// were cached.
  pub async fn install(&self) -> usize {
    let set = self.set_name(SetKind::Static);
    let mut cached = 0;

    for asset in &self.static_assets {
      let url = match self.origin.join(asset) {
        Ok(url) => url,
        Err(e) => {
          warn!(asset, error = %e, "skipping unresolvable asset");
          continue;
        }
      };
      let destination = Destination::infer(&url);
      let request = FetchRequest::get(url, destination);

      match self.fetcher.fetch(&request).await {
        Ok(response) if response.status == 200 => {
          let entry = super::store::StoredResponse {
            status: response.status,
            content_type: response.content_type,
            body: response.body,
            stored_at: chrono::Utc::now(),
          };
          match self.store.put(&set, &request.identity(), &entry) {
            Ok(()) => cached += 1,
            Err(e) => warn!(asset, error = %e, "failed to precache asset"),
          }
        }
        Ok(response) => {
          warn!(asset, status = response.status, "asset fetch returned non-200, not cached");
        }
        Err(e) => {
          warn!(asset, error = %e, "asset fetch failed, not cached");
        }
      }
    }

    info!(
      cached,
      total = self.static_assets.len(),
      set,
      "install complete"
    );
    cached
  }

  /// Activate phase: delete every cache set whose name is not one of the four
  /// current-version names. Returns the names that were deleted.
  pub async fn activate(&self) -> Result<Vec<String>> {
    let current = self.current_set_names();
    let mut deleted = Vec::new();

    for name in self.store.set_names()? {
      if !current.contains(&name) {
        info!(set = %name, "deleting stale cache set");
        self.store.delete_set(&name)?;
        deleted.push(name);
      }
    }

    Ok(deleted)
  }

  /// Classify a request. First matching rule wins, in this order: bypass
  /// (non-GET or out-of-scope origin), document, script/style, image,
  /// API/resolver, default.
  pub fn classify(&self, request: &FetchRequest) -> Route {
    if request.method != Method::GET {
      return Route::PassThrough;
    }

    let host = request.url.host_str().unwrap_or("");
    if !self.allowed_hosts.iter().any(|h| h == host) {
      return Route::PassThrough;
    }

    if request.destination == Destination::Document || request.url.path().ends_with(".html") {
      return Route::NetworkFirst {
        set: SetKind::Dynamic,
      };
    }

    if matches!(request.destination, Destination::Script | Destination::Style) {
      return Route::CacheFirst {
        set: SetKind::Static,
        max_age: None,
      };
    }

    if request.destination == Destination::Image {
      return Route::CacheFirst {
        set: SetKind::Images,
        max_age: Some(IMAGE_MAX_AGE),
      };
    }

    // Resolver endpoints live on allow-listed external hosts; anything there,
    // or under an /api path on our own origin, is API traffic.
    let is_own_origin = self.origin.host_str() == request.url.host_str();
    if !is_own_origin || request.url.path().contains("/api") {
      return Route::NetworkFirst { set: SetKind::Api };
    }

    Route::CacheFirst {
      set: SetKind::Dynamic,
      max_age: None,
    }
  }

  /// Route one request through its strategy.
  ///
  /// Strategy routes always produce a response (synthetic 503 at worst);
  /// pass-through requests surface network errors directly, as uncached
  /// traffic has no fallback.
  pub async fn handle(&self, request: &FetchRequest) -> Result<ServedResponse> {
    match self.classify(request) {
      Route::PassThrough => {
        let response = self.fetcher.fetch(request).await?;
        Ok(ServedResponse::from_network(response))
      }
      Route::NetworkFirst { set } => Ok(
        network_first(
          &self.store,
          &self.fetcher,
          request,
          &self.set_name(set),
        )
        .await,
      ),
      Route::CacheFirst { set, max_age } => Ok(
        cache_first(
          &self.store,
          &self.fetcher,
          request,
          &self.set_name(set),
          max_age,
        )
        .await,
      ),
    }
  }

  /// Entry counts per existing cache set, for inspection.
  pub fn set_counts(&self) -> Result<Vec<(String, usize)>> {
    let mut counts = Vec::new();
    for name in self.store.set_names()? {
      let count = self.store.count(&name)?;
      counts.push((name, count));
    }
    Ok(counts)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::offline::fetcher::FetchedResponse;
  use crate::offline::store::{MemoryOfflineStore, StoredResponse};
  use crate::offline::strategy::ServedFrom;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct CannedFetcher {
    status: u16,
    calls: AtomicUsize,
  }

  impl CannedFetcher {
    fn ok() -> Self {
      Self {
        status: 200,
        calls: AtomicUsize::new(0),
      }
    }

    fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Fetcher for CannedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> color_eyre::Result<FetchedResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(FetchedResponse {
        status: self.status,
        content_type: None,
        body: request.url.path().as_bytes().to_vec(),
      })
    }
  }

  struct DownFetcher;

  impl Fetcher for DownFetcher {
    async fn fetch(&self, request: &FetchRequest) -> color_eyre::Result<FetchedResponse> {
      Err(color_eyre::eyre::eyre!("no route to {}", request.url))
    }
  }

  fn config() -> OfflineConfig {
    OfflineConfig {
      cache_version: "v1.0.0".to_string(),
      site_origin: "https://jx.example.com".to_string(),
      static_assets: vec!["/".to_string(), "/css/css.css".to_string(), "/js/api.js".to_string()],
    }
  }

  fn hosts() -> Vec<String> {
    vec!["jx.example.com".to_string(), "jx.xmflv.com".to_string()]
  }

  fn cache<F: Fetcher>(fetcher: F) -> OfflineCache<MemoryOfflineStore, F> {
    OfflineCache::new(MemoryOfflineStore::new(), fetcher, &config(), hosts()).unwrap()
  }

  fn req(url: &str, destination: Destination) -> FetchRequest {
    FetchRequest::get(Url::parse(url).unwrap(), destination)
  }

  #[test]
  fn test_classification_rules() {
    let cache = cache(CannedFetcher::ok());

    // Non-GET bypasses
    let mut post = req("https://jx.example.com/data/title.php", Destination::Other);
    post.method = Method::POST;
    assert_eq!(cache.classify(&post), Route::PassThrough);

    // Origins outside the allow-list bypass
    assert_eq!(
      cache.classify(&req("https://cdn.elsewhere.com/lib.js", Destination::Script)),
      Route::PassThrough
    );

    // Documents are network-first against dynamic
    assert_eq!(
      cache.classify(&req("https://jx.example.com/", Destination::Document)),
      Route::NetworkFirst {
        set: SetKind::Dynamic
      }
    );
    assert_eq!(
      cache.classify(&req("https://jx.example.com/index-new.html", Destination::Other)),
      Route::NetworkFirst {
        set: SetKind::Dynamic
      }
    );

    // Scripts and styles are cache-first against static
    assert_eq!(
      cache.classify(&req("https://jx.example.com/js/api.js", Destination::Script)),
      Route::CacheFirst {
        set: SetKind::Static,
        max_age: None
      }
    );
    assert_eq!(
      cache.classify(&req("https://jx.example.com/css/css.css", Destination::Style)),
      Route::CacheFirst {
        set: SetKind::Static,
        max_age: None
      }
    );

    // Images are cache-first with the 30-day bound
    assert_eq!(
      cache.classify(&req("https://jx.example.com/img/logo.png", Destination::Image)),
      Route::CacheFirst {
        set: SetKind::Images,
        max_age: Some(IMAGE_MAX_AGE)
      }
    );

    // Allow-listed resolver hosts are API traffic
    assert_eq!(
      cache.classify(&req("https://jx.xmflv.com/?url=x", Destination::Other)),
      Route::NetworkFirst { set: SetKind::Api }
    );
    assert_eq!(
      cache.classify(&req("https://jx.example.com/api/check", Destination::Other)),
      Route::NetworkFirst { set: SetKind::Api }
    );

    // Everything else defaults to cache-first against dynamic
    assert_eq!(
      cache.classify(&req("https://jx.example.com/fonts/a.woff2", Destination::Other)),
      Route::CacheFirst {
        set: SetKind::Dynamic,
        max_age: None
      }
    );
  }

  #[tokio::test]
  async fn test_install_populates_static_set() {
    let cache = cache(CannedFetcher::ok());
    let cached = cache.install().await;
    assert_eq!(cached, 3);
    assert_eq!(cache.store.count("static-v1.0.0").unwrap(), 3);
  }

  #[tokio::test]
  async fn test_install_failure_is_not_fatal() {
    let cache = cache(DownFetcher);
    let cached = cache.install().await;
    assert_eq!(cached, 0);
    assert_eq!(cache.store.count("static-v1.0.0").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_activate_deletes_only_stale_sets() {
    let cache = cache(CannedFetcher::ok());
    let entry = StoredResponse {
      status: 200,
      content_type: None,
      body: b"x".to_vec(),
      stored_at: chrono::Utc::now(),
    };
    // Current-version sets plus leftovers from an older deploy
    for set in [
      "static-v1.0.0",
      "dynamic-v1.0.0",
      "api-v1.0.0",
      "images-v1.0.0",
      "static-v0.9.0",
      "images-v0.9.0",
    ] {
      cache.store.put(set, "id", &entry).unwrap();
    }

    let mut deleted = cache.activate().await.unwrap();
    deleted.sort();
    assert_eq!(deleted, vec!["images-v0.9.0".to_string(), "static-v0.9.0".to_string()]);

    for set in ["static-v1.0.0", "dynamic-v1.0.0", "api-v1.0.0", "images-v1.0.0"] {
      assert_eq!(cache.store.count(set).unwrap(), 1, "{} should survive", set);
    }
  }

  #[tokio::test]
  async fn test_handle_passthrough_does_not_cache() {
    let cache = cache(CannedFetcher::ok());
    let request = req("https://cdn.elsewhere.com/lib.js", Destination::Script);

    let served = cache.handle(&request).await.unwrap();
    assert_eq!(served.source, ServedFrom::Network);
    assert!(cache.store.set_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_handle_routes_document_network_first() {
    let cache = cache(CannedFetcher::ok());
    let request = req("https://jx.example.com/index-new.html", Destination::Document);

    let served = cache.handle(&request).await.unwrap();
    assert_eq!(served.source, ServedFrom::Network);
    assert_eq!(cache.store.count("dynamic-v1.0.0").unwrap(), 1);
    assert_eq!(cache.fetcher.calls(), 1);
  }
}
