use reqwest::Method;
use url::Url;

/// Whether a request may be answered by an HTTP cache on the way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CacheMode {
  #[default]
  Default,
  /// Always go to the origin and bypass intermediate HTTP caches
  Reload,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct Request {
  pub url: Url,
  pub method: Method,
  pub headers: Vec<(String, String)>,
  pub body: Option<Vec<u8>>,
  pub cache_mode: CacheMode,
}

impl Request {
  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  pub fn new(method: Method, url: Url) -> Self {
    Self {
      url,
      method,
      headers: Vec::new(),
      body: None,
      cache_mode: CacheMode::Default,
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
    self.body = Some(body.into());
    self
  }

  /// Copy of this request that must be answered by the origin.
  pub fn reload(&self) -> Self {
    Self {
      cache_mode: CacheMode::Reload,
      ..self.clone()
    }
  }

  pub fn is_get(&self) -> bool {
    self.method == Method::GET
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  Basic,
  /// Generic network error, carries no status or body
  Error,
}

/// A response returned to the page, either from the network or a cache snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub url: String,
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
}

impl Response {
  pub fn new(url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
    let status_text = reqwest::StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or_default()
      .to_string();

    Self {
      url: url.into(),
      status,
      status_text,
      headers: Vec::new(),
      body: body.into(),
      kind: ResponseKind::Basic,
    }
  }

  /// The generic network-error response.
  pub fn error() -> Self {
    Self {
      url: String::new(),
      status: 0,
      status_text: String::new(),
      headers: Vec::new(),
      body: Vec::new(),
      kind: ResponseKind::Error,
    }
  }

  #[cfg(test)]
  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// True for any 2xx status.
  pub fn ok(&self) -> bool {
    (200..=299).contains(&self.status)
  }

  pub fn is_error(&self) -> bool {
    self.kind == ResponseKind::Error
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}
