use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A third-party resolver endpoint.
///
/// `url` is a prefix; the percent-encoded target video URL is appended to it.
/// Endpoint identity is its position in the configured list, not a generated id.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResolverEndpoint {
  pub name: String,
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Ordered list of resolver endpoints. Order is load-bearing: selection
  /// indices and probe order both refer to it.
  #[serde(default = "default_resolvers")]
  pub resolvers: Vec<ResolverEndpoint>,
  #[serde(default)]
  pub probe: ProbeConfig,
  #[serde(default)]
  pub offline: OfflineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
  /// Per-probe cap in milliseconds. The in-flight request is cancelled when
  /// it elapses.
  #[serde(default = "default_probe_timeout_ms")]
  pub timeout_ms: u64,
  /// Delay between consecutive probe starts during a sweep.
  #[serde(default = "default_stagger_ms")]
  pub stagger_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OfflineConfig {
  /// Shared version tag for the cache sets. Bumping it invalidates every set
  /// on the next activate.
  #[serde(default = "default_cache_version")]
  pub cache_version: String,
  /// Origin the static asset manifest is resolved against.
  #[serde(default = "default_site_origin")]
  pub site_origin: String,
  /// Core assets precached into the static set at install.
  #[serde(default = "default_static_assets")]
  pub static_assets: Vec<String>,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      timeout_ms: default_probe_timeout_ms(),
      stagger_ms: default_stagger_ms(),
    }
  }
}

impl Default for OfflineConfig {
  fn default() -> Self {
    Self {
      cache_version: default_cache_version(),
      site_origin: default_site_origin(),
      static_assets: default_static_assets(),
    }
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      resolvers: default_resolvers(),
      probe: ProbeConfig::default(),
      offline: OfflineConfig::default(),
    }
  }
}

fn default_probe_timeout_ms() -> u64 {
  5000
}

fn default_stagger_ms() -> u64 {
  200
}

fn default_cache_version() -> String {
  "v1.0.0".to_string()
}

fn default_site_origin() -> String {
  "https://jx.example.com".to_string()
}

fn default_static_assets() -> Vec<String> {
  [
    "/",
    "/index-new.html",
    "/css/css.css",
    "/js/utils.js",
    "/js/api.js",
    "/js/player.js",
    "/js/ui.js",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

/// The stock endpoint list shipped with the tool, used when no config file
/// overrides it.
fn default_resolvers() -> Vec<ResolverEndpoint> {
  [
    ("xmflv", "https://jx.xmflv.com/?url="),
    ("nnxv", "https://jx.nnxv.cn/tv.php?url="),
    ("m3u8tv", "https://jx.m3u8.tv/jiexi/?url="),
    ("xmflv-backup", "https://jx.xmflv.cc/?url="),
    ("playerjy", "https://jx.playerjy.com/?url="),
    ("okjx", "https://okjx.cc/?url="),
  ]
  .iter()
  .map(|(name, url)| ResolverEndpoint {
    name: name.to_string(),
    url: url.to_string(),
  })
  .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./vjx.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/vjx/config.yaml
  ///
  /// A missing file is not an error: the endpoint list ships built in, so
  /// running with no config at all is a valid setup.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("vjx.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("vjx").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    if config.resolvers.is_empty() {
      return Err(eyre!(
        "Config file {} declares an empty resolver list",
        path.display()
      ));
    }

    Ok(config)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe.timeout_ms)
  }

  pub fn stagger(&self) -> Duration {
    Duration::from_millis(self.probe.stagger_ms)
  }

  /// Hosts whose requests the offline cache is allowed to handle: the site's
  /// own origin plus every configured resolver host.
  pub fn allowed_hosts(&self) -> Vec<String> {
    let mut hosts = Vec::new();
    if let Ok(origin) = url::Url::parse(&self.offline.site_origin) {
      if let Some(host) = origin.host_str() {
        hosts.push(host.to_string());
      }
    }
    for endpoint in &self.resolvers {
      if let Ok(u) = url::Url::parse(&endpoint.url) {
        if let Some(host) = u.host_str() {
          let host = host.to_string();
          if !hosts.contains(&host) {
            hosts.push(host);
          }
        }
      }
    }
    hosts
  }
}
