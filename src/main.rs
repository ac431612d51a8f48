mod app;
mod cache;
mod config;
mod db;
mod net;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::net::{CacheMode, Request};

#[derive(Parser, Debug)]
#[command(name = "offline-cache")]
#[command(about = "Offline cache dispatcher for the storefront admin and courier apps")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./offline-cache.yaml or $XDG_CONFIG_HOME/offline-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Build version, overrides the config file and OFFLINE_CACHE_VERSION
  #[arg(long, global = true)]
  version_tag: Option<String>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Fetch a URL through the worker
  Fetch {
    /// Absolute URL, or a path relative to the configured origin
    url: String,
    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
    /// Extra request header, as "Name: value"
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Print response headers to stderr
    #[arg(short, long)]
    include: bool,
    /// Ask intermediate HTTP caches to revalidate
    #[arg(long)]
    reload: bool,
  },
  /// Drop the data cache of the current version
  Clear,
  /// Post a raw JSON control message
  Message { json: String },
  /// Show partitions and the active registration
  Status,
  /// Reinstall and activate the current version
  Install,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?.with_version(args.version_tag);

  let app = app::App::new(&config)?;

  let report = if let Command::Install = args.command {
    Some(app.install().await?)
  } else {
    app.start().await?
  };

  match args.command {
    Command::Fetch {
      url,
      method,
      data,
      headers,
      include,
      reload,
    } => {
      let mut request =
        build_request(app.settings().origin.clone(), &url, &method, data, &headers)?;
      if reload {
        request.cache_mode = CacheMode::Reload;
      }
      let served = app.fetch(request).await?;

      if served.response.is_error() {
        return Err(eyre!("Network error: no response for {}", url));
      }

      eprintln!(
        "{} {} ({:?})",
        served.response.status, served.response.status_text, served.source
      );
      if include {
        for (name, value) in &served.response.headers {
          eprintln!("{}: {}", name, value);
        }
      }
      std::io::stdout()
        .write_all(&served.response.body)
        .map_err(|e| eyre!("Failed to write response body: {}", e))?;
    }
    Command::Clear => {
      let reply = app
        .post_message(serde_json::json!({ "type": "CLEAR_DATA_CACHE" }))
        .await?
        .ok_or_else(|| eyre!("Worker did not acknowledge the clear command"))?;
      println!("{}", reply);
    }
    Command::Message { json } => {
      let data: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| eyre!("Invalid message JSON: {}", e))?;
      match app.post_message(data).await? {
        Some(reply) => println!("{}", reply),
        None => eprintln!("No reply"),
      }
    }
    Command::Status => {
      let status = app.status()?;
      println!(
        "active version: {}",
        status.registration.as_deref().unwrap_or("none")
      );
      for partition in status.partitions {
        let marker = if partition.current { "*" } else { " " };
        println!("{} {} ({} entries)", marker, partition.name, partition.entries);
      }
    }
    Command::Install => {
      println!("installed {}", app.settings().version);
      if let Some(report) = report {
        println!("precached {} entries", report.precached);
        for name in report.purged {
          println!("purged {}", name);
        }
      }
    }
  }

  Ok(())
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

fn build_request(
  origin: url::Url,
  target: &str,
  method: &str,
  body: Option<String>,
  headers: &[String],
) -> Result<Request> {
  let url = origin
    .join(target)
    .map_err(|e| eyre!("Invalid URL {}: {}", target, e))?;
  let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
    .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;

  let mut request = Request::new(method, url);
  for header in headers {
    let (name, value) = header
      .split_once(':')
      .ok_or_else(|| eyre!("Invalid header {:?}, expected \"Name: value\"", header))?;
    request = request.with_header(name.trim(), value.trim());
  }
  if let Some(body) = body {
    request = request.with_body(body);
  }

  Ok(request)
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn origin() -> Url {
    Url::parse("https://shop.test/store/").unwrap()
  }

  #[test]
  fn test_relative_target_joins_origin() {
    let request = build_request(origin(), "api/orders", "get", None, &[]).unwrap();
    assert_eq!(request.url.as_str(), "https://shop.test/store/api/orders");
    assert!(request.is_get());
  }

  #[test]
  fn test_absolute_target_kept() {
    let request = build_request(origin(), "https://cdn.test/app.js", "GET", None, &[]).unwrap();
    assert_eq!(request.url.as_str(), "https://cdn.test/app.js");
  }

  #[test]
  fn test_headers_and_body() {
    let request = build_request(
      origin(),
      "/api/orders",
      "post",
      Some("{}".to_string()),
      &["X-Admin-Token: abc".to_string()],
    )
    .unwrap();

    assert_eq!(request.method, reqwest::Method::POST);
    assert_eq!(request.url.as_str(), "https://shop.test/api/orders");
    assert_eq!(
      request.headers,
      vec![("X-Admin-Token".to_string(), "abc".to_string())]
    );
    assert_eq!(request.body.as_deref(), Some(b"{}".as_slice()));
  }

  #[test]
  fn test_malformed_header_rejected() {
    assert!(build_request(origin(), "/", "GET", None, &["nocolon".to_string()]).is_err());
  }

  #[test]
  fn test_cli_parses_fetch() {
    let args = Args::try_parse_from([
      "offline-cache",
      "--version-tag",
      "v3",
      "fetch",
      "/api/orders",
      "-X",
      "POST",
      "-H",
      "A: b",
    ])
    .unwrap();

    assert_eq!(args.version_tag.as_deref(), Some("v3"));
    assert!(matches!(
      args.command,
      Command::Fetch { ref method, ref headers, .. } if method == "POST" && headers.len() == 1
    ));
  }

  #[test]
  fn test_cli_parses_reload_flag() {
    let args = Args::try_parse_from(["offline-cache", "fetch", "/index.html", "--reload"]).unwrap();

    assert!(matches!(args.command, Command::Fetch { reload: true, .. }));
  }
}
