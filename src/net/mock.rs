//! Scripted network for strategy and lifecycle tests.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::client::Network;
use super::types::{Request, Response};

enum Route {
  Respond(Response),
  Fail,
}

/// In-memory network: unknown URLs answer 404, failed URLs reject.
#[derive(Default)]
pub struct MockNetwork {
  routes: Mutex<HashMap<String, Route>>,
  offline: AtomicBool,
  requests: Mutex<Vec<Request>>,
}

impl MockNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, url: &str, status: u16, body: &str) -> &Self {
    self.routes.lock().unwrap().insert(
      url.to_string(),
      Route::Respond(Response::new(url, status, body.as_bytes())),
    );
    self
  }

  pub fn fail(&self, url: &str) -> &Self {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), Route::Fail);
    self
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  pub fn request_count(&self, url: &str) -> usize {
    self
      .requests
      .lock()
      .unwrap()
      .iter()
      .filter(|r| r.url.as_str() == url)
      .count()
  }
}

impl Network for MockNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.requests.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("Network unreachable: {}", request.url));
    }

    match self.routes.lock().unwrap().get(request.url.as_str()) {
      Some(Route::Respond(response)) => Ok(response.clone()),
      Some(Route::Fail) => Err(eyre!("Connection reset: {}", request.url)),
      None => Ok(Response::new(request.url.as_str(), 404, "")),
    }
  }
}
