//! Share links: `?url=&api=&title=` built on the site origin, parsed back for
//! auto-fill and auto-play.

use url::Url;

/// Parameters carried by a share link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShareParams {
  pub url: Option<String>,
  pub api: Option<usize>,
  pub title: Option<String>,
}

impl ShareParams {
  pub fn is_empty(&self) -> bool {
    self.url.is_none() && self.api.is_none() && self.title.is_none()
  }
}

/// Build a share link for a video on the given page URL.
pub fn build_share_link(page: &Url, video_url: &str, api_index: usize, title: Option<&str>) -> Url {
  let mut link = page.clone();
  {
    let mut pairs = link.query_pairs_mut();
    pairs.clear();
    pairs.append_pair("url", video_url);
    pairs.append_pair("api", &api_index.to_string());
    if let Some(title) = title {
      pairs.append_pair("title", title);
    }
  }
  link
}

/// Extract share parameters from a link. Unknown parameters are ignored; a
/// non-numeric `api` value is dropped rather than erroring, matching the
/// tolerant handling of hand-edited links.
pub fn parse_share_params(link: &Url) -> ShareParams {
  let mut params = ShareParams::default();
  for (key, value) in link.query_pairs() {
    match key.as_ref() {
      "url" => params.url = Some(value.into_owned()),
      "api" => params.api = value.parse().ok(),
      "title" => params.title = Some(value.into_owned()),
      _ => {}
    }
  }
  params
}
