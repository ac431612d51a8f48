//! Cache layer that executes the fetch strategies against storage and network.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::snapshot::{CacheKey, Snapshot};
use super::storage::CacheStorage;
use crate::net::{Network, Request, Response};

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
  /// Fresh from the network
  Network,
  /// A stored snapshot
  Cache,
  /// Neither was available; the response is `Response::error()`
  Error,
}

/// A response handed back to the page, with its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ServedFrom,
}

impl Served {
  pub fn network(response: Response) -> Self {
    Self {
      response,
      source: ServedFrom::Network,
    }
  }

  pub fn cache(snapshot: Snapshot) -> Self {
    Self {
      response: snapshot.into_response(),
      source: ServedFrom::Cache,
    }
  }

  pub fn error() -> Self {
    Self {
      response: Response::error(),
      source: ServedFrom::Error,
    }
  }
}

/// Cache layer shared by every fetch handler.
///
/// Every strategy settles with a response: storage failures are logged and
/// treated as misses or skipped writes, network failures fall back or turn
/// into `Response::error()`.
pub struct CacheLayer<S: CacheStorage, N: Network> {
  storage: Arc<S>,
  network: Arc<N>,
}

impl<S: CacheStorage, N: Network> CacheLayer<S, N> {
  pub fn new(storage: Arc<S>, network: Arc<N>) -> Self {
    Self { storage, network }
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  /// Network first, bypassing HTTP caches.
  ///
  /// 1. Refetch the request with `CacheMode::Reload`
  /// 2. Store any 2xx GET response into `partition`
  /// 3. On network failure, serve the snapshot from `partition`
  /// 4. With no snapshot either, serve a network error
  pub async fn network_first(&self, partition: &str, request: &Request) -> Served {
    let key = CacheKey::for_request(request);

    match self.network.fetch(&request.reload()).await {
      Ok(response) => {
        if response.ok() && request.is_get() {
          info!(url = %request.url, partition, "Caching network response");
          self.store(partition, &key, &response);
        }
        Served::network(response)
      }
      Err(e) => {
        info!(path = request.url.path(), error = %e, "Network unavailable, looking in cache");
        match self.storage.match_in(partition, &key) {
          Ok(Some(snapshot)) => Served::cache(snapshot),
          Ok(None) => Served::error(),
          Err(e) => {
            warn!(url = %request.url, error = %e, "Cache lookup failed");
            Served::error()
          }
        }
      }
    }
  }

  /// Cache first.
  ///
  /// Any partition may answer. On a miss the network response is returned,
  /// and stored into `partition` when it is a 200 answer to a GET.
  pub async fn cache_first(&self, partition: &str, request: &Request) -> Served {
    let key = CacheKey::for_request(request);

    match self.storage.match_any(&key) {
      Ok(Some(snapshot)) => {
        debug!(url = %request.url, "Serving from cache");
        return Served::cache(snapshot);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %request.url, error = %e, "Cache lookup failed"),
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.status == 200 && request.is_get() {
          self.store(partition, &key, &response);
        }
        Served::network(response)
      }
      Err(e) => {
        tracing::error!(path = request.url.path(), error = %e, "Failed to handle request");
        Served::error()
      }
    }
  }

  /// Straight to the network, nothing is read or written.
  pub async fn pass_through(&self, request: &Request) -> Served {
    match self.network.fetch(request).await {
      Ok(response) => Served::network(response),
      Err(e) => {
        warn!(url = %request.url, error = %e, "Pass-through request failed");
        Served::error()
      }
    }
  }

  fn store(&self, partition: &str, key: &CacheKey, response: &Response) {
    if let Err(e) = self
      .storage
      .put(partition, key, &Snapshot::capture(response))
    {
      warn!(url = key.url(), partition, error = %e, "Failed to store response");
    }
  }
}
