mod checker;
mod config;
mod link;
mod offline;
mod registry;
mod report;
mod store;
mod title;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::PathBuf;
use url::Url;

use checker::{HealthChecker, HttpProber};
use config::Config;
use offline::{Destination, FetchRequest, HttpFetcher, OfflineCache, SqliteOfflineStore};
use registry::Registry;
use store::{SqliteStore, SystemClock, TtlStore};

#[derive(Parser, Debug)]
#[command(name = "vjx")]
#[command(about = "Health checker, selector and offline cache for video resolver endpoints")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/vjx/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Probe every endpoint and auto-select the fastest available one
  Check,
  /// Show the last sweep's results without probing
  Status,
  /// List endpoints and the current selection
  List,
  /// Select an endpoint by index
  Select { index: usize },
  /// Build the playback URL for a video URL (or a share link) and remember it
  Play { url: String },
  /// Print a share link for a video URL
  Share {
    url: String,
    #[arg(long)]
    title: Option<String>,
  },
  /// Offline resource cache operations
  Offline {
    #[command(subcommand)]
    command: OfflineCommand,
  },
}

#[derive(Subcommand, Debug)]
enum OfflineCommand {
  /// Precache the static asset manifest into the static set
  Install,
  /// Delete cache sets left over from older versions
  Activate,
  /// Fetch a URL through the caching strategies, body to stdout
  Fetch { url: String },
  /// List cache sets and entry counts
  Status,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Check => check(&config).await,
    Command::Status => status(&config),
    Command::List => list(&config),
    Command::Select { index } => select(&config, index),
    Command::Play { url } => play(&config, &url).await,
    Command::Share { url, title } => share(&config, &url, title.as_deref()),
    Command::Offline { command } => offline_command(&config, command).await,
  }
}

fn open_registry(
  config: &Config,
) -> Result<(Registry<SqliteStore, SystemClock>, TtlStore<SqliteStore>)> {
  let store = TtlStore::new(SqliteStore::open()?);
  let registry = Registry::new(config.resolvers.clone(), store.clone());
  Ok((registry, store))
}

fn site_origin(config: &Config) -> Result<Url> {
  Url::parse(&config.offline.site_origin)
    .map_err(|e| eyre!("Invalid site origin {}: {}", config.offline.site_origin, e))
}

async fn check(config: &Config) -> Result<()> {
  let (mut registry, store) = open_registry(config)?;

  // Render what the last sweep saw; the fresh sweep below overwrites it
  if let Some(cached) = checker::load_cached_results(&store) {
    registry.apply_cached(&cached);
    report::print_cached_age(&cached);
    report::print_endpoints(
      registry.endpoints(),
      registry.statuses(),
      registry.selected_index(),
    );
    println!();
  }

  let prober = HttpProber::new(config.probe_timeout())?;
  let checker = HealthChecker::new(prober, config.probe_timeout(), config.stagger());

  println!("checking {} endpoints:", registry.len());
  let summary = checker
    .check_all(&mut registry, &store, &report::ConsoleReporter)
    .await?;

  report::print_summary(&summary);
  if summary.available > 0 {
    println!(
      "selected [{}] {}",
      registry.selected_index(),
      registry.current().name
    );
  }
  Ok(())
}

fn status(config: &Config) -> Result<()> {
  let (mut registry, store) = open_registry(config)?;

  match checker::load_cached_results(&store) {
    Some(cached) => {
      registry.apply_cached(&cached);
      report::print_cached_age(&cached);
    }
    None => println!("no cached results (run `vjx check`)"),
  }
  report::print_endpoints(
    registry.endpoints(),
    registry.statuses(),
    registry.selected_index(),
  );
  if let Some(last) = registry.last_url() {
    println!("last played: {}", last);
  }
  Ok(())
}

fn list(config: &Config) -> Result<()> {
  let (registry, _store) = open_registry(config)?;
  report::print_endpoints(
    registry.endpoints(),
    registry.statuses(),
    registry.selected_index(),
  );
  Ok(())
}

fn select(config: &Config, index: usize) -> Result<()> {
  let (mut registry, _store) = open_registry(config)?;
  registry.select(index)?;
  println!("selected [{}] {}", index, registry.current().name);
  Ok(())
}

async fn play(config: &Config, input: &str) -> Result<()> {
  let (mut registry, _store) = open_registry(config)?;

  // A share link carries the target URL and optionally a resolver index
  let mut target = input.to_string();
  if let Ok(parsed) = Url::parse(input) {
    let params = link::parse_share_params(&parsed);
    if let Some(url) = params.url {
      target = url;
      if let Some(api) = params.api {
        registry.select(api)?;
      }
    }
  }

  if target.trim().is_empty() {
    return Err(eyre!("No video URL given"));
  }

  let playback = registry.playback_url(&target);
  registry.remember_last_url(&target);

  if let Some(title) = title::TitleClient::new(&site_origin(config)?)?
    .fetch_title(&target)
    .await
  {
    println!("title: {}", title);
  }

  println!("{}", playback);
  Ok(())
}

fn share(config: &Config, url: &str, title: Option<&str>) -> Result<()> {
  let (registry, _store) = open_registry(config)?;
  let link = link::build_share_link(&site_origin(config)?, url, registry.selected_index(), title);
  println!("{}", link);
  Ok(())
}

async fn offline_command(config: &Config, command: OfflineCommand) -> Result<()> {
  let cache = OfflineCache::new(
    SqliteOfflineStore::open()?,
    HttpFetcher::new()?,
    &config.offline,
    config.allowed_hosts(),
  )?;

  match command {
    OfflineCommand::Install => {
      let cached = cache.install().await;
      println!(
        "cached {}/{} static assets",
        cached,
        config.offline.static_assets.len()
      );
    }
    OfflineCommand::Activate => {
      let deleted = cache.activate().await?;
      if deleted.is_empty() {
        println!("no stale cache sets");
      } else {
        for name in deleted {
          println!("deleted {}", name);
        }
      }
    }
    OfflineCommand::Fetch { url } => {
      let url = Url::parse(&url).map_err(|e| eyre!("Invalid URL {}: {}", url, e))?;
      let destination = Destination::infer(&url);
      let request = FetchRequest::get(url, destination);
      let served = cache.handle(&request).await?;
      eprintln!(
        "{} ({:?}, {} bytes)",
        served.status,
        served.source,
        served.body.len()
      );
      std::io::stdout().write_all(&served.body)?;
    }
    OfflineCommand::Status => {
      let current = cache.current_set_names();
      let counts = cache.set_counts()?;
      if counts.is_empty() {
        println!("offline cache is empty");
      }
      for (name, count) in counts {
        let marker = if current.contains(&name) { " " } else { "!" };
        println!("{} {:<20} {} entries", marker, name, count);
      }
    }
  }
  Ok(())
}
