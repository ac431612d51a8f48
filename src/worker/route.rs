use crate::config::RoutesConfig;
use crate::net::Request;

/// How an intercepted request is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Not http(s); the worker does not respond and the request goes out as is
  Uncontrolled,
  /// Non-GET API call, never cached
  ApiPassThrough,
  /// API GET, network first into the data partition
  ApiNetworkFirst,
  /// Root, main document and admin pages, network first into the data partition
  ShellNetworkFirst,
  /// Everything else, cache first
  StaticCacheFirst,
}

/// Classify a request. First match wins.
pub fn classify(routes: &RoutesConfig, request: &Request) -> Route {
  let scheme = request.url.scheme();
  if scheme != "http" && scheme != "https" {
    return Route::Uncontrolled;
  }

  let path = request.url.path();

  if path.contains(routes.api.as_str()) {
    return if request.is_get() {
      Route::ApiNetworkFirst
    } else {
      Route::ApiPassThrough
    };
  }

  let is_shell = routes.shell_paths.iter().any(|p| p == path)
    || routes
      .shell_prefixes
      .iter()
      .any(|p| path.contains(p.as_str()));

  if is_shell {
    Route::ShellNetworkFirst
  } else {
    Route::StaticCacheFirst
  }
}
