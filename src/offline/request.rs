//! Request identity and classification inputs.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// What kind of resource a request is for, as far as routing cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Other,
}

impl Destination {
  /// Best-effort inference from the URL path extension, for callers that
  /// don't know the destination up front.
  pub fn infer(url: &Url) -> Self {
    let path = url.path().to_ascii_lowercase();
    if path == "/" || path.ends_with(".html") || path.ends_with('/') {
      return Destination::Document;
    }
    match path.rsplit('.').next() {
      Some("js") => Destination::Script,
      Some("css") => Destination::Style,
      Some("png" | "jpg" | "jpeg" | "gif" | "webp" | "svg" | "ico") => Destination::Image,
      _ => Destination::Other,
    }
  }
}

/// One outgoing request as seen by the offline cache.
#[derive(Debug, Clone)]
pub struct FetchRequest {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl FetchRequest {
  pub fn get(url: Url, destination: Destination) -> Self {
    Self {
      method: Method::GET,
      url,
      destination,
    }
  }

  /// Stable identity for cache keying: method plus full URL, hashed so keys
  /// are fixed-length.
  pub fn identity(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_infer_destination() {
    let cases = [
      ("https://a.example/", Destination::Document),
      ("https://a.example/index-new.html", Destination::Document),
      ("https://a.example/js/api.js", Destination::Script),
      ("https://a.example/css/css.css", Destination::Style),
      ("https://a.example/img/logo.png", Destination::Image),
      ("https://a.example/data/title.php", Destination::Other),
    ];
    for (url, expected) in cases {
      let url = Url::parse(url).unwrap();
      assert_eq!(Destination::infer(&url), expected, "{}", url);
    }
  }

  #[test]
  fn test_identity_distinguishes_url_and_method() {
    let a = FetchRequest::get(
      Url::parse("https://a.example/x").unwrap(),
      Destination::Other,
    );
    let b = FetchRequest::get(
      Url::parse("https://a.example/y").unwrap(),
      Destination::Other,
    );
    let mut c = a.clone();
    c.method = Method::HEAD;

    assert_eq!(a.identity(), a.identity());
    assert_ne!(a.identity(), b.identity());
    assert_ne!(a.identity(), c.identity());
  }
}
