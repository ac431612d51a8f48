use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::worker::WorkerSettings;

/// Environment variable that overrides the configured build version.
pub const VERSION_ENV: &str = "OFFLINE_CACHE_VERSION";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Application name, used as the partition name prefix
  pub app: String,
  /// Build version, substituted at deploy time
  pub version: String,
  /// Origin the worker is registered for; relative paths resolve against it
  pub origin: String,
  /// Paths precached into the shell partition on install
  pub manifest: Vec<String>,
  pub routes: RoutesConfig,
  /// SQLite database location (defaults to $XDG_DATA_HOME/offline-cache/cache.db)
  pub cache_path: Option<PathBuf>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      app: "ikeber".to_string(),
      version: "dev".to_string(),
      origin: "http://localhost:3000/".to_string(),
      manifest: vec![
        "./".to_string(),
        "./index.html".to_string(),
        "./manifest.json".to_string(),
        "./icons/icon.png".to_string(),
      ],
      routes: RoutesConfig::default(),
      cache_path: None,
    }
  }
}

/// URL shapes that decide the fetch strategy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutesConfig {
  /// Any path containing this segment is an API call
  pub api: String,
  /// Exact document paths served network-first
  pub shell_paths: Vec<String>,
  /// Path segments (matched anywhere in the path) served network-first
  pub shell_prefixes: Vec<String>,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api: "/api/".to_string(),
      shell_paths: vec!["/".to_string(), "/index.html".to_string()],
      shell_prefixes: vec!["/admin/".to_string()],
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-cache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Apply the version override: the CLI flag wins over the environment.
  pub fn with_version(self, flag: Option<String>) -> Self {
    match flag.or_else(|| std::env::var(VERSION_ENV).ok()) {
      Some(version) => Config { version, ..self },
      None => self,
    }
  }

  /// Resolve the immutable worker settings for this deployment.
  pub fn resolve(&self) -> Result<WorkerSettings> {
    let app = self.app.trim();
    if app.is_empty() {
      return Err(eyre!("Config field `app` must not be empty"));
    }

    let version = self.version.trim();
    if version.is_empty() {
      return Err(eyre!(
        "Build version is empty. Set `version` in the config or {}.",
        VERSION_ENV
      ));
    }

    if self.routes.api.is_empty() || self.routes.shell_prefixes.iter().any(String::is_empty) {
      return Err(eyre!("Route segments must not be empty"));
    }

    let origin = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {}: {}", self.origin, e))?;

    let manifest = self
      .manifest
      .iter()
      .map(|p| {
        origin
          .join(p)
          .map_err(|e| eyre!("Invalid manifest path {}: {}", p, e))
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(WorkerSettings {
      version: version.to_string(),
      shell_cache: format!("{}-app-shell-{}", app, version),
      data_cache: format!("{}-data-cache-{}", app, version),
      origin,
      manifest,
      routes: self.routes.clone(),
    })
  }
}
