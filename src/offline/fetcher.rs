//! The network seam used by the caching strategies.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;

use super::request::FetchRequest;

/// A response fetched live from the network.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

/// Network transport. An `Err` models an unreachable network (connect error
/// or timeout); HTTP error statuses come back as `Ok` responses.
pub trait Fetcher: Send + Sync {
  fn fetch(&self, request: &FetchRequest) -> impl Future<Output = Result<FetchedResponse>> + Send;
}

/// Fetcher backed by reqwest.
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &FetchRequest) -> Result<FetchedResponse> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", request.url, e))?
      .to_vec();

    Ok(FetchedResponse {
      status,
      content_type,
      body,
    })
  }
}
