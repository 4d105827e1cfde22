use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3001/api";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  /// Where the key/value store lives (defaults to the data directory)
  pub store_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
  /// Real HTTP server at `base_url`
  #[default]
  Http,
  /// In-memory fake server with sample data
  Mock,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub base_url: String,
  pub timeout_ms: u64,
  pub retries: u32,
  pub retry_delay_ms: u64,
  pub cache_ttl_ms: u64,
  pub transport: TransportKind,
  /// Artificial latency for the mock transport
  pub mock_latency_ms: u64,
  /// Emit a notification for every successful call, not just failures
  pub notify_success: bool,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      timeout_ms: 30_000,
      retries: 3,
      retry_delay_ms: 1_000,
      cache_ttl_ms: 300_000,
      transport: TransportKind::Http,
      mock_latency_ms: 0,
      notify_success: false,
    }
  }
}

impl ApiConfig {
  pub fn base_url(&self) -> Result<Url> {
    Url::parse(&self.base_url).map_err(|e| eyre!("Invalid base URL '{}': {}", self.base_url, e))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }

  pub fn retry_delay(&self) -> Duration {
    Duration::from_millis(self.retry_delay_ms)
  }

  pub fn cache_ttl(&self) -> Duration {
    Duration::from_millis(self.cache_ttl_ms)
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./horas.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/horas/config.yaml
  ///
  /// With no file found the defaults are used.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Self::default(),
    };
    config.apply_env(|name| std::env::var(name).ok())?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("horas.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("horas").join("config.yaml");
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
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Apply `HORAS_*` overrides. The lookup is injected so tests do not touch
  /// the process environment.
  pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    if let Some(url) = lookup("HORAS_API_URL") {
      self.api.base_url = url;
    }
    if let Some(v) = lookup("HORAS_TIMEOUT_MS") {
      self.api.timeout_ms = parse_env("HORAS_TIMEOUT_MS", &v)?;
    }
    if let Some(v) = lookup("HORAS_RETRIES") {
      self.api.retries = parse_env("HORAS_RETRIES", &v)?;
    }
    if let Some(v) = lookup("HORAS_RETRY_DELAY_MS") {
      self.api.retry_delay_ms = parse_env("HORAS_RETRY_DELAY_MS", &v)?;
    }
    if let Some(v) = lookup("HORAS_CACHE_TTL_MS") {
      self.api.cache_ttl_ms = parse_env("HORAS_CACHE_TTL_MS", &v)?;
    }
    Ok(())
  }

  /// Get an API token from the environment, if one is set.
  ///
  /// Checks HORAS_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("HORAS_API_TOKEN").ok().filter(|t| !t.is_empty())
  }

  /// Resolved location of the key/value store.
  pub fn store_path(&self) -> Result<PathBuf> {
    if let Some(path) = &self.store_path {
      return Ok(path.clone());
    }
    Ok(data_dir()?.join("store.db"))
  }
}

/// Per-user data directory for the store and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("horas"))
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
  T::Err: std::fmt::Display,
{
  value
    .trim()
    .parse()
    .map_err(|e| eyre!("Invalid value for {}: '{}' ({})", name, value, e))
}
