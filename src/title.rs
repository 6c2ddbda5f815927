//! Best-effort video title lookup against the site's title endpoint.

use color_eyre::{eyre::eyre, Result};
use tracing::debug;
use url::Url;

pub struct TitleClient {
  client: reqwest::Client,
  endpoint: Url,
}

impl TitleClient {
  pub fn new(site_origin: &Url) -> Result<Self> {
    let endpoint = site_origin
      .join("data/title.php")
      .map_err(|e| eyre!("Invalid title endpoint: {}", e))?;
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;
    Ok(Self { client, endpoint })
  }

  /// Fetch the title for a video URL. This path is non-critical: any failure
  /// is logged and surfaces as `None`, never as an error.
  pub async fn fetch_title(&self, video_url: &str) -> Option<String> {
    let result = self
      .client
      .post(self.endpoint.clone())
      .form(&[("titurl", video_url)])
      .send()
      .await;

    match result {
      Ok(response) if response.status().is_success() => match response.text().await {
        Ok(text) => {
          let title = text.trim().to_string();
          if title.is_empty() {
            None
          } else {
            Some(title)
          }
        }
        Err(e) => {
          debug!(error = %e, "failed to read title response");
          None
        }
      },
      Ok(response) => {
        debug!(status = %response.status(), "title endpoint returned an error");
        None
      }
      Err(e) => {
        debug!(error = %e, "title fetch failed");
        None
      }
    }
  }
}
