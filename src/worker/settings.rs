use url::Url;

use crate::config::RoutesConfig;

/// Deployment settings resolved once at startup and shared by every handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
  pub version: String,
  /// `{app}-app-shell-{version}`
  pub shell_cache: String,
  /// `{app}-data-cache-{version}`
  pub data_cache: String,
  pub origin: Url,
  /// Absolute URLs precached on install
  pub manifest: Vec<Url>,
  pub routes: RoutesConfig,
}

impl WorkerSettings {
  /// Partitions that survive activation.
  pub fn current_caches(&self) -> [&str; 2] {
    [self.shell_cache.as_str(), self.data_cache.as_str()]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.current_caches().contains(&name)
  }
}
