use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{CacheStorage, Served, SqliteStorage};
use crate::config::Config;
use crate::net::{HttpNetwork, Network, Request};
use crate::worker::{Event, Outcome, ReplyPort, Worker, WorkerSettings};

/// One partition as reported by `status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionStatus {
  pub name: String,
  pub entries: usize,
  /// Belongs to the configured version
  pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
  pub registration: Option<String>,
  pub partitions: Vec<PartitionStatus>,
}

/// What an install and activation pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
  /// Manifest entries in the shell partition (0 when precaching failed)
  pub precached: usize,
  /// Partitions of older versions that were deleted
  pub purged: Vec<String>,
}

/// Host runtime: owns the worker and feeds it lifecycle events.
pub struct App<S: CacheStorage + 'static, N: Network + 'static> {
  worker: Worker<S, N>,
}

impl App<SqliteStorage, HttpNetwork> {
  pub fn new(config: &Config) -> Result<Self> {
    let settings = config.resolve()?;
    let storage = SqliteStorage::open_at(config.cache_path.as_deref())?;
    let network = HttpNetwork::new()?;

    Ok(Self::with_parts(settings, storage, network))
  }
}

impl<S: CacheStorage + 'static, N: Network + 'static> App<S, N> {
  pub fn with_parts(settings: WorkerSettings, storage: S, network: N) -> Self {
    Self {
      worker: Worker::new(Arc::new(settings), Arc::new(storage), Arc::new(network)),
    }
  }

  pub fn settings(&self) -> &WorkerSettings {
    self.worker.settings()
  }

  /// Bring the configured version into control.
  ///
  /// A version that was already activated in an earlier run resumes directly
  /// while its shell partition is still there; anything else is installed and
  /// activated, which purges the partitions of older versions.
  pub async fn start(&self) -> Result<Option<InstallReport>> {
    let storage = self.worker.storage();
    let registered = storage.registration()?;
    let version = &self.settings().version;

    if registered.as_deref() == Some(version.as_str()) {
      if storage.has(&self.settings().shell_cache)? {
        self.worker.resume()?;
        return Ok(None);
      }
      warn!(cache = %self.settings().shell_cache, "Shell cache missing, reinstalling");
    }

    info!(
      from = registered.as_deref().unwrap_or("none"),
      to = %version,
      "New worker version"
    );
    self.install().await.map(Some)
  }

  /// Run install and activate regardless of the stored registration.
  pub async fn install(&self) -> Result<InstallReport> {
    let precached = match self.worker.dispatch(Event::Install).await? {
      Outcome::Installed { precached } => precached,
      other => return Err(eyre!("Install settled with {:?}", other)),
    };
    let purged = match self.worker.dispatch(Event::Activate).await? {
      Outcome::Activated { purged } => purged,
      other => return Err(eyre!("Activate settled with {:?}", other)),
    };

    info!(precached, purged = purged.len(), "Worker activated");
    Ok(InstallReport { precached, purged })
  }

  pub async fn fetch(&self, request: Request) -> Result<Served> {
    match self.worker.dispatch(Event::Fetch(request)).await? {
      Outcome::Responded(served) => Ok(served),
      other => Err(eyre!("Fetch settled without a response: {:?}", other)),
    }
  }

  /// Post a control message and wait for the reply, if the worker sends one.
  pub async fn post_message(&self, data: Value) -> Result<Option<Value>> {
    let (port, reply) = ReplyPort::channel();

    let outcome = self
      .worker
      .dispatch(Event::Message {
        data,
        port: Some(port),
      })
      .await?;

    if let Outcome::Cleared { acknowledged: false } = outcome {
      warn!("Clear command was not acknowledged");
    }

    // The port is dropped unanswered for messages the worker ignores.
    Ok(reply.await.ok())
  }

  pub fn status(&self) -> Result<CacheStatus> {
    let storage = self.worker.storage();
    let partitions = storage
      .keys()?
      .into_iter()
      .map(|name| {
        Ok(PartitionStatus {
          entries: storage.entries(&name)?.len(),
          current: self.settings().is_current(&name),
          name,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(CacheStatus {
      registration: storage.registration()?,
      partitions,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::ServedFrom;
  use serde_json::json;
  use std::path::Path;
  use url::Url;
  use wiremock::matchers::{method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  async fn serve_shell(server: &MockServer) {
    for (p, body) in [
      ("/", "<root>"),
      ("/index.html", "<index>"),
      ("/manifest.json", "{}"),
      ("/icons/icon.png", "png"),
    ] {
      Mock::given(method("GET"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
    }
  }

  fn app(server: &MockServer, version: &str, db: &Path) -> App<SqliteStorage, HttpNetwork> {
    let config = Config {
      app: "shop".to_string(),
      version: version.to_string(),
      origin: format!("{}/", server.uri()),
      cache_path: Some(db.to_path_buf()),
      ..Config::default()
    };
    App::new(&config).unwrap()
  }

  fn partition_names(app: &App<SqliteStorage, HttpNetwork>) -> Vec<String> {
    app
      .status()
      .unwrap()
      .partitions
      .into_iter()
      .map(|p| p.name)
      .collect()
  }

  fn url(server: &MockServer, p: &str) -> Url {
    Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
  }

  #[tokio::test]
  async fn test_start_installs_new_version() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, "v1", &dir.path().join("cache.db"));

    app.start().await.unwrap();

    let status = app.status().unwrap();
    assert_eq!(status.registration.as_deref(), Some("v1"));
    assert_eq!(
      status.partitions,
      vec![PartitionStatus {
        name: "shop-app-shell-v1".to_string(),
        entries: 4,
        current: true,
      }]
    );
  }

  #[tokio::test]
  async fn test_restart_same_version_resumes_without_install() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.db");
    app(&server, "v1", &db).start().await.unwrap();
    let installs = server.received_requests().await.unwrap().len();

    app(&server, "v1", &db).start().await.unwrap();

    assert_eq!(server.received_requests().await.unwrap().len(), installs);
  }

  #[tokio::test]
  async fn test_upgrade_purges_old_partitions() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    Mock::given(method("GET"))
      .and(path("/api/orders"))
      .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
      .mount(&server)
      .await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.db");
    let v1 = app(&server, "v1", &db);
    v1.start().await.unwrap();
    v1.fetch(Request::get(url(&server, "/api/orders"))).await.unwrap();

    let v2 = app(&server, "v2", &db);
    assert!(v2.start().await.unwrap().is_some());

    assert_eq!(partition_names(&v2), vec!["shop-app-shell-v2"]);

    // The data partition only appears with the first cached response
    v2.fetch(Request::get(url(&server, "/api/orders"))).await.unwrap();
    assert_eq!(
      partition_names(&v2),
      vec!["shop-app-shell-v2", "shop-data-cache-v2"]
    );
  }

  #[tokio::test]
  async fn test_upgrade_reports_precache_and_purge() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.db");
    app(&server, "v1", &db).start().await.unwrap();

    let report = app(&server, "v2", &db).start().await.unwrap();

    assert_eq!(
      report,
      Some(InstallReport {
        precached: 4,
        purged: vec!["shop-app-shell-v1".to_string()],
      })
    );
  }

  #[tokio::test]
  async fn test_restart_reinstalls_when_shell_cache_is_gone() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("cache.db");
    let first = app(&server, "v1", &db);
    first.start().await.unwrap();
    first.worker.storage().delete("shop-app-shell-v1").unwrap();

    let report = app(&server, "v1", &db).start().await.unwrap();

    assert_eq!(report.map(|r| r.precached), Some(4));
    assert_eq!(partition_names(&first), vec!["shop-app-shell-v1"]);
  }

  #[tokio::test]
  async fn test_offline_api_served_from_cache() {
    // A dedicated listener, so dropping the server really takes it offline
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let server = MockServer::builder().listener(listener).start().await;
    serve_shell(&server).await;
    Mock::given(method("GET"))
      .and(path("/api/products"))
      .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"sku":"A1"}]"#))
      .mount(&server)
      .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, "v1", &dir.path().join("cache.db"));
    app.start().await.unwrap();
    let products = url(&server, "/api/products");
    app.fetch(Request::get(products.clone())).await.unwrap();

    drop(server);
    let served = app.fetch(Request::get(products)).await.unwrap();

    assert_eq!(served.source, ServedFrom::Cache);
    assert_eq!(served.response.body, br#"[{"sku":"A1"}]"#);
  }

  #[tokio::test]
  async fn test_clear_message_round_trip() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    Mock::given(method("GET"))
      .and(path("/api/settings"))
      .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
      .mount(&server)
      .await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, "v1", &dir.path().join("cache.db"));
    app.start().await.unwrap();
    app
      .fetch(Request::get(url(&server, "/api/settings")))
      .await
      .unwrap();

    let reply = app
      .post_message(json!({ "type": "CLEAR_DATA_CACHE" }))
      .await
      .unwrap();

    assert_eq!(reply, Some(json!({ "status": "cache_cleared" })));
    let status = app.status().unwrap();
    assert!(status
      .partitions
      .iter()
      .all(|p| p.name != "shop-data-cache-v1"));
  }

  #[tokio::test]
  async fn test_ignored_message_has_no_reply() {
    let server = MockServer::start().await;
    serve_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let app = app(&server, "v1", &dir.path().join("cache.db"));
    app.start().await.unwrap();

    let reply = app.post_message(json!({ "type": "PING" })).await.unwrap();

    assert_eq!(reply, None);
  }
}
