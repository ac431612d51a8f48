//! Stored response snapshots and the keys they are stored under.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::net::{Request, Response, ResponseKind};

/// A response as it was when written into a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

impl Snapshot {
  pub fn capture(response: &Response) -> Self {
    Self {
      url: response.url.clone(),
      status: response.status,
      status_text: response.status_text.clone(),
      headers: response.headers.clone(),
      body: response.body.clone(),
      stored_at: Utc::now(),
    }
  }

  pub fn into_response(self) -> Response {
    Response {
      url: self.url,
      status: self.status,
      status_text: self.status_text,
      headers: self.headers,
      body: self.body,
      kind: ResponseKind::Basic,
    }
  }
}

/// Lookup key for a request inside a partition.
///
/// The fragment never takes part in matching and the method is compared
/// uppercased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
  method: String,
  url: String,
}

impl CacheKey {
  pub fn for_request(request: &Request) -> Self {
    let mut url = request.url.clone();
    url.set_fragment(None);

    Self {
      method: request.method.as_str().to_uppercase(),
      url: url.to_string(),
    }
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn is_get(&self) -> bool {
    self.method == "GET"
  }

  /// SHA256 hex digest, stable across runs.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::Method;
  use url::Url;

  fn request(method: Method, url: &str) -> Request {
    Request::new(method, Url::parse(url).unwrap())
  }

  #[test]
  fn test_fragment_is_ignored() {
    let a = CacheKey::for_request(&request(Method::GET, "http://shop.test/app.js#v1"));
    let b = CacheKey::for_request(&request(Method::GET, "http://shop.test/app.js"));

    assert_eq!(a, b);
    assert_eq!(a.hash(), b.hash());
    assert_eq!(a.url(), "http://shop.test/app.js");
  }

  #[test]
  fn test_query_string_is_significant() {
    let a = CacheKey::for_request(&request(Method::GET, "http://shop.test/api/orders?page=1"));
    let b = CacheKey::for_request(&request(Method::GET, "http://shop.test/api/orders?page=2"));

    assert_ne!(a.hash(), b.hash());
  }

  #[test]
  fn test_method_changes_key() {
    let get = CacheKey::for_request(&request(Method::GET, "http://shop.test/admin/"));
    let post = CacheKey::for_request(&request(Method::POST, "http://shop.test/admin/"));

    assert!(get.is_get());
    assert!(!post.is_get());
    assert_ne!(get.hash(), post.hash());
  }

  #[test]
  fn test_snapshot_preserves_response() {
    let response = Response::new("http://shop.test/api/orders", 200, "[]")
      .with_header("content-type", "application/json");
    let restored = Snapshot::capture(&response).into_response();

    assert_eq!(restored, response);
  }
}
