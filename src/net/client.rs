use color_eyre::{eyre::eyre, Result};
use std::future::Future;

use super::types::{CacheMode, Request, Response};

/// Something that can put a request on the wire.
pub trait Network: Send + Sync {
  /// Transport failures are errors; any HTTP status is a response.
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP network backed by reqwest
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
}

impl HttpNetwork {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("offline-cache/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let mut builder = self
      .client
      .request(request.method.clone(), request.url.clone());

    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }

    if request.cache_mode == CacheMode::Reload {
      builder = builder
        .header(reqwest::header::CACHE_CONTROL, "no-cache")
        .header(reqwest::header::PRAGMA, "no-cache");
    }

    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let url = response.url().to_string();
    let status = response.status();
    let headers = response
      .headers()
      .iter()
      .map(|(k, v)| {
        (
          k.as_str().to_string(),
          String::from_utf8_lossy(v.as_bytes()).into_owned(),
        )
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", url, e))?;

    Ok(Response {
      headers,
      ..Response::new(url, status.as_u16(), body.to_vec())
    })
  }
}
