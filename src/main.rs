use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use horas::api::{notification, ApiContext, CrudResource, NotificationLevel, QueryParams};
use horas::cache::CachedClient;
use horas::config::{self, Config, TransportKind};
use horas::models::Record;
use horas::session::{Session, SessionProvider};
use horas::storage::{KeyValueStore, SqliteStore};
use horas::store::{AppNotification, AppState, Store};

#[derive(Parser, Debug)]
#[command(name = "horas")]
#[command(about = "Query and edit professors, subjects, schedules and hour assignments")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./horas.yaml, then $XDG_CONFIG_HOME/horas/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Use the in-memory sample server instead of HTTP
  #[arg(long)]
  mock: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List a resource, optionally one page at a time
  List {
    resource: String,
    #[arg(long)]
    page: Option<u64>,
    #[arg(long)]
    limit: Option<u64>,
  },
  Get {
    resource: String,
    id: String,
  },
  /// Create a record from a JSON object
  Create {
    resource: String,
    json: String,
  },
  /// Replace a record with a JSON object
  Update {
    resource: String,
    id: String,
    json: String,
  },
  /// Merge JSON fields into a record
  Patch {
    resource: String,
    id: String,
    json: String,
  },
  Delete {
    resource: String,
    id: String,
  },
  Search {
    resource: String,
    query: String,
  },
  /// Load every collection and print dashboard statistics
  Stats {
    /// Bypass the cache
    #[arg(long)]
    refresh: bool,
  },
  /// Save an API token for later requests
  Login {
    token: String,
  },
  Logout,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let mut config = Config::load(args.config.as_deref())?;
  if args.mock {
    config.api.transport = TransportKind::Mock;
  }

  let kv: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.store_path()?)?);
  let session = Arc::new(
    Session::persistent(Arc::clone(&kv)).map_err(|e| eyre!("Failed to restore session: {}", e))?,
  );

  match &args.command {
    Command::Login { token } => {
      session
        .login(token.as_str())
        .map_err(|e| eyre!("Failed to save token: {}", e))?;
      eprintln!("Logged in");
      return Ok(());
    }
    Command::Logout => {
      session
        .logout()
        .map_err(|e| eyre!("Failed to clear token: {}", e))?;
      eprintln!("Logged out");
      return Ok(());
    }
    _ => {}
  }

  // An environment token wins over the saved one and is never persisted
  let provider: Arc<dyn SessionProvider> = match Config::get_api_token() {
    Some(token) => Arc::new(Session::with_override(token, Arc::clone(&kv))),
    None => session,
  };

  let store = Arc::new(Store::persistent(kv).map_err(|e| eyre!("Failed to load preferences: {}", e))?);
  let (tx, rx) = notification::channel();
  let context = ApiContext::from_config(&config.api, provider)?.with_notifier(tx);
  let forwarder = tokio::spawn(horas::dashboard::forward_notifications(rx, Arc::clone(&store)));
  let printer = tokio::spawn(print_notifications(store.subscribe()));

  let outcome = run(args.command, context, &config, &store).await;
  // Every sender is gone once `run` returns, so the forwarder drains and ends.
  // Dropping the last store handle then closes the printer's subscription.
  forwarder
    .await
    .map_err(|e| eyre!("Notification forwarder failed: {}", e))?;
  drop(store);
  printer
    .await
    .map_err(|e| eyre!("Notification printer failed: {}", e))?;

  let output = outcome?;
  println!("{}", serde_json::to_string_pretty(&output)?);
  Ok(())
}

async fn run(
  command: Command,
  context: ApiContext,
  config: &Config,
  store: &Store,
) -> Result<Value> {
  let value = match command {
    Command::List {
      resource,
      page,
      limit,
    } => {
      if page.is_none() && limit.is_none() {
        let items = records(&context, &resource).list(&QueryParams::new()).await?;
        to_json(&items)?
      } else {
        let mut pager = context.paginator::<Record>(format!("/{}", resource));
        let state = pager
          .fetch_page(page.unwrap_or(1), limit.unwrap_or(horas::api::DEFAULT_PAGE_SIZE))
          .await?;
        json!({ "items": pager.items(), "page": state })
      }
    }
    Command::Get { resource, id } => to_json(&records(&context, &resource).get_by_id(&id).await?)?,
    Command::Create { resource, json } => {
      let body = parse_body(&json)?;
      to_json(&records(&context, &resource).create(&body).await?)?
    }
    Command::Update { resource, id, json } => {
      let body = parse_body(&json)?;
      to_json(&records(&context, &resource).update(&id, &body).await?)?
    }
    Command::Patch { resource, id, json } => {
      let body = parse_body(&json)?;
      to_json(&records(&context, &resource).patch(&id, &body).await?)?
    }
    Command::Delete { resource, id } => {
      let removed = records(&context, &resource).remove(&id).await?;
      json!({ "deleted": removed })
    }
    Command::Search { resource, query } => {
      let found = records(&context, &resource)
        .search(&query, &QueryParams::new())
        .await?;
      to_json(&found)?
    }
    Command::Stats { refresh } => {
      let client = CachedClient::new(context, config.api.cache_ttl());
      let stats = horas::dashboard::load(&client, store, refresh).await?;
      to_json(&stats)?
    }
    Command::Login { .. } | Command::Logout => Value::Null,
  };
  Ok(value)
}

/// Print each notification the store receives to stderr, until the store
/// goes away.
async fn print_notifications(mut updates: watch::Receiver<AppState>) {
  let mut next_id = 0;
  loop {
    let fresh: Vec<AppNotification> = updates
      .borrow_and_update()
      .notifications
      .iter()
      .filter(|n| n.id >= next_id)
      .cloned()
      .collect();
    for n in fresh {
      let label = match n.level {
        NotificationLevel::Success => "ok",
        NotificationLevel::Error => "error",
        NotificationLevel::Warning => "warning",
        NotificationLevel::Info => "info",
      };
      eprintln!("[{}] {}", label, n.message);
      next_id = n.id + 1;
    }
    if updates.changed().await.is_err() {
      break;
    }
  }
}

fn records(context: &ApiContext, resource: &str) -> CrudResource<Record> {
  context.resource(resource)
}

fn parse_body(raw: &str) -> Result<Value> {
  let value: Value = serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON body: {}", e))?;
  if !value.is_object() {
    return Err(eyre!("JSON body must be an object"));
  }
  Ok(value)
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
  serde_json::to_value(value).map_err(|e| eyre!("Failed to serialize output: {}", e))
}

/// Log to `<data_dir>/horas.log` so stdout carries only JSON.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = config::data_dir()?;
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "horas.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = EnvFilter::try_from_env("HORAS_LOG")
    .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .with_target(true)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  info!(dir = %log_dir.display(), "logging initialized");
  Ok(guard)
}
