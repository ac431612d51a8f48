//! The offline worker: lifecycle handlers registered in a dispatch table.
//!
//! A host feeds [`Event`]s into [`Worker::dispatch`] and awaits the returned
//! future before settling the event that triggered it.

mod message;
mod route;
mod settings;
mod state;

pub use message::{Message, Reply, ReplyPort};
pub use route::{classify, Route};
pub use settings::WorkerSettings;
pub use state::WorkerState;

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, BoxFuture};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{error, info, info_span, warn, Instrument};
use url::Url;

use crate::cache::{CacheKey, CacheLayer, CacheStorage, Served, Snapshot};
use crate::net::{Network, Request, Response};

/// Events delivered by the host.
#[derive(Debug)]
pub enum Event {
  Install,
  Activate,
  Fetch(Request),
  Message {
    data: Value,
    port: Option<ReplyPort>,
  },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Install,
  Activate,
  Fetch,
  Message,
}

impl Event {
  pub fn kind(&self) -> EventKind {
    match self {
      Event::Install => EventKind::Install,
      Event::Activate => EventKind::Activate,
      Event::Fetch(_) => EventKind::Fetch,
      Event::Message { .. } => EventKind::Message,
    }
  }
}

/// What a handler settled with.
#[derive(Debug)]
pub enum Outcome {
  /// Number of manifest entries precached (0 when precaching failed)
  Installed { precached: usize },
  /// Stale partitions removed during activation
  Activated { purged: Vec<String> },
  Responded(Served),
  /// Whether an acknowledgement reached the reply port
  Cleared { acknowledged: bool },
  Ignored,
}

type Handler<S, N> = for<'a> fn(&'a Worker<S, N>, Event) -> BoxFuture<'a, Result<Outcome>>;

pub struct Worker<S: CacheStorage, N: Network> {
  settings: Arc<WorkerSettings>,
  cache: CacheLayer<S, N>,
  state: Mutex<WorkerState>,
  handlers: HashMap<EventKind, Handler<S, N>>,
}

impl<S: CacheStorage + 'static, N: Network + 'static> Worker<S, N> {
  pub fn new(settings: Arc<WorkerSettings>, storage: Arc<S>, network: Arc<N>) -> Self {
    let mut handlers: HashMap<EventKind, Handler<S, N>> = HashMap::new();
    handlers.insert(EventKind::Install, on_install::<S, N>);
    handlers.insert(EventKind::Activate, on_activate::<S, N>);
    handlers.insert(EventKind::Fetch, on_fetch::<S, N>);
    handlers.insert(EventKind::Message, on_message::<S, N>);

    Self {
      settings,
      cache: CacheLayer::new(storage, network),
      state: Mutex::new(WorkerState::Parsed),
      handlers,
    }
  }

  /// Route an event to its registered handler.
  pub fn dispatch(&self, event: Event) -> BoxFuture<'_, Result<Outcome>> {
    let span = info_span!("sw", event = ?event.kind(), version = %self.settings.version);
    match self.handlers.get(&event.kind()) {
      Some(handler) => Box::pin(handler(self, event).instrument(span)),
      None => {
        let kind = event.kind();
        Box::pin(async move { Err(eyre!("No handler registered for {:?}", kind)) })
      }
    }
  }

  pub fn settings(&self) -> &WorkerSettings {
    &self.settings
  }

  pub fn storage(&self) -> &S {
    self.cache.storage()
  }

  pub fn state(&self) -> Result<WorkerState> {
    self
      .state
      .lock()
      .map(|s| *s)
      .map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Take control for a version that was already activated in an earlier run.
  pub fn resume(&self) -> Result<()> {
    self.advance(WorkerState::Activated)
  }

  fn advance(&self, next: WorkerState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *state = state.advance(next)?;
    Ok(())
  }

  async fn precache(&self) -> Result<usize> {
    let shell = &self.settings.shell_cache;
    self.storage().open(shell)?;

    let fetches: Vec<_> = self
      .settings
      .manifest
      .iter()
      .map(|url| self.fetch_manifest_entry(url))
      .collect();

    // All or nothing: nothing is written unless every entry was fetched.
    let fetched = join_all(fetches)
      .await
      .into_iter()
      .collect::<Result<Vec<_>>>()?;

    for (request, response) in &fetched {
      self.storage().put(
        shell,
        &CacheKey::for_request(request),
        &Snapshot::capture(response),
      )?;
    }

    Ok(fetched.len())
  }

  async fn fetch_manifest_entry(&self, url: &Url) -> Result<(Request, Response)> {
    let request = Request::get(url.clone());
    let response = self.cache.network().fetch(&request).await?;
    if !response.ok() {
      return Err(eyre!(
        "Request for {} returned status {}",
        request.url,
        response.status
      ));
    }
    Ok((request, response))
  }

  async fn purge_stale(&self) -> Result<Vec<String>> {
    let mut purged = Vec::new();

    for name in self.storage().keys()? {
      if self.settings.is_current(&name) {
        continue;
      }
      info!(cache = %name, "Deleting stale cache");
      match self.storage().delete(&name) {
        Ok(_) => purged.push(name),
        Err(e) => warn!(cache = %name, error = %e, "Failed to delete stale cache"),
      }
    }

    Ok(purged)
  }

  /// Claim open pages: record this version as the active registration.
  fn claim(&self) -> Result<()> {
    self.storage().set_registration(&self.settings.version)
  }
}

fn on_install<S: CacheStorage + 'static, N: Network + 'static>(
  worker: &Worker<S, N>,
  _event: Event,
) -> BoxFuture<'_, Result<Outcome>> {
  Box::pin(async move {
    info!(version = %worker.settings.version, "Installing");
    worker.advance(WorkerState::Installing)?;

    let precached = match worker.precache().await {
      Ok(count) => {
        info!(count, cache = %worker.settings.shell_cache, "Cached app shell");
        count
      }
      Err(e) => {
        error!(error = %e, "Failed to cache app shell");
        0
      }
    };

    worker.advance(WorkerState::Installed)?;
    Ok(Outcome::Installed { precached })
  })
}

fn on_activate<S: CacheStorage + 'static, N: Network + 'static>(
  worker: &Worker<S, N>,
  _event: Event,
) -> BoxFuture<'_, Result<Outcome>> {
  Box::pin(async move {
    info!(version = %worker.settings.version, "Activating");
    worker.advance(WorkerState::Activating)?;

    let activated = match worker.purge_stale().await {
      Ok(purged) => worker.claim().map(|_| purged),
      Err(e) => Err(e),
    };

    match activated {
      Ok(purged) => {
        worker.advance(WorkerState::Activated)?;
        Ok(Outcome::Activated { purged })
      }
      Err(e) => {
        worker.advance(WorkerState::Redundant)?;
        Err(e)
      }
    }
  })
}

fn on_fetch<S: CacheStorage + 'static, N: Network + 'static>(
  worker: &Worker<S, N>,
  event: Event,
) -> BoxFuture<'_, Result<Outcome>> {
  Box::pin(async move {
    let request = match event {
      Event::Fetch(request) => request,
      other => return Err(eyre!("Fetch handler received {:?}", other.kind())),
    };

    if !worker.state()?.controls_pages() {
      return Ok(Outcome::Responded(worker.cache.pass_through(&request).await));
    }

    let data = &worker.settings.data_cache;
    let served = match classify(&worker.settings.routes, &request) {
      Route::Uncontrolled | Route::ApiPassThrough => worker.cache.pass_through(&request).await,
      Route::ApiNetworkFirst | Route::ShellNetworkFirst => {
        worker.cache.network_first(data, &request).await
      }
      // Static assets land in the data partition too, next to API and HTML
      // responses; they are dropped with it on rollover or clear.
      Route::StaticCacheFirst => worker.cache.cache_first(data, &request).await,
    };

    Ok(Outcome::Responded(served))
  })
}

fn on_message<S: CacheStorage + 'static, N: Network + 'static>(
  worker: &Worker<S, N>,
  event: Event,
) -> BoxFuture<'_, Result<Outcome>> {
  Box::pin(async move {
    let (data, port) = match event {
      Event::Message { data, port } => (data, port),
      other => return Err(eyre!("Message handler received {:?}", other.kind())),
    };

    match Message::parse(&data) {
      Some(Message::ClearDataCache) => {
        let name = &worker.settings.data_cache;
        info!(cache = %name, "Clearing data cache");
        worker.storage().delete(name)?;
        info!(cache = %name, "Data cache cleared");

        let acknowledged = match port {
          Some(port) => port.post(&Reply::cache_cleared()),
          None => {
            warn!("Clear command arrived without a reply port");
            false
          }
        };
        Ok(Outcome::Cleared { acknowledged })
      }
      None => Ok(Outcome::Ignored),
    }
  })
}
