use ceylon_offline::cli::{to_fetch_view, CliError, CliResult, ConfigBuilder, ValueParser};
use ceylon_offline::config::WorkerConfig;
use ceylon_offline::http::{Destination, Request};
use ceylon_offline::interceptor::Intercept;
use ceylon_offline::kv::{FileStorage, LocalStorage, PreferenceStore, TtlCache, DEFAULT_TTL_MINUTES};
use ceylon_offline::lifecycle::{LoggingHost, Registration, ServiceWorker};
use ceylon_offline::network::{HttpNetwork, Network};
use ceylon_offline::output::OutputEnvelope;
use ceylon_offline::preload::{ImagePreloader, DEFAULT_PRELOAD_COUNT};
use ceylon_offline::store::StoreManager;
use ceylon_offline::WorkerError;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "ceylon-offline")]
#[command(about = "Offline request cache for the Ceylon Gems site", long_about = None)]
#[command(version)]
struct Cli {
    /// Site origin the worker serves
    #[arg(long, global = true, value_name = "URL")]
    origin: Option<Url>,

    /// Worker version (store generation)
    #[arg(long = "version-tag", global = true, value_name = "N")]
    version_tag: Option<u32>,

    /// Data directory for stores, local storage and registration
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Precache the manifest for this version, then activate it
    Install {
        /// Stop after install and leave the version waiting
        #[arg(long)]
        no_activate: bool,
    },

    /// Activate an installed version and evict stale stores
    Activate,

    /// Request a path through the worker
    Fetch {
        /// Path (or absolute URL) to request
        #[arg(value_name = "PATH")]
        path: String,

        /// Request destination (document, image, script, style, font, manifest)
        #[arg(long, default_value = "")]
        destination: String,

        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,
    },

    /// Show the registration and store usage
    Stores,

    /// TTL key/value cache in local storage
    Kv {
        #[command(subcommand)]
        command: KvCommands,
    },

    /// User preferences in local storage
    Prefs {
        #[command(subcommand)]
        command: PrefsCommands,
    },

    /// Deliver a push message to the worker
    Push {
        /// JSON payload, e.g. '{"title":"New arrivals","url":"/ceylongemshub"}'
        #[arg(value_name = "PAYLOAD")]
        payload: String,

        /// Click the notification once shown
        #[arg(long)]
        click: bool,
    },

    /// Preload gallery images around the current one
    Preload {
        /// Image sources in gallery order
        #[arg(value_name = "SRC", required = true)]
        sources: Vec<String>,

        /// Index of the image being shown
        #[arg(long, default_value_t = 0)]
        current: usize,

        /// Images to load on each side of the current one
        #[arg(long, default_value_t = DEFAULT_PRELOAD_COUNT)]
        count: usize,
    },
}

#[derive(Subcommand)]
enum KvCommands {
    /// Store a value (JSON or plain string)
    Set {
        key: String,
        value: String,
        /// Lifetime in minutes
        #[arg(long, default_value_t = DEFAULT_TTL_MINUTES)]
        ttl: u64,
    },
    /// Read a live value
    Get { key: String },
    /// Remove a value
    Remove { key: String },
    /// Remove every cached value
    Clear,
    /// List cached keys
    List,
}

#[derive(Subcommand)]
enum PrefsCommands {
    /// Show current preferences
    Show,
    /// Set a top-level preference (value is JSON or a plain string)
    Set { key: String, value: String },
    /// Record a gem as recently viewed
    View { gem_id: String },
    /// Merge a JSON object into the filters
    Filters { json: String },
    /// Restore defaults
    Reset,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_directive = if cli.verbose {
        "ceylon_offline=info"
    } else {
        "ceylon_offline=warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    let config = ConfigBuilder::from_cli_flags(cli.origin, cli.version_tag, cli.data_dir);
    debug!(origin = %config.origin, version = config.version, data_dir = ?config.data_dir, "Loaded config");

    let started = Instant::now();
    match run(cli.command, &config).await {
        Ok((kind, data)) => {
            let envelope = OutputEnvelope::success(
                kind,
                config.origin.as_str(),
                config.version,
                data,
                Some(started.elapsed().as_millis() as u64),
            );
            print_envelope(&envelope);
        }
        Err(e) => {
            print_envelope(&OutputEnvelope::error(e.code(), &e.to_string()));
            std::process::exit(1);
        }
    }
}

fn print_envelope(envelope: &OutputEnvelope) {
    match envelope.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            println!(
                r#"{{"ok":false,"error":{{"code":"OUTPUT_ERROR","message":"{}"}},"meta":{{"version":"v1"}}}}"#,
                e
            );
            std::process::exit(1);
        }
    }
}

async fn run(command: Commands, config: &WorkerConfig) -> CliResult<(&'static str, Value)> {
    config.ensure_data_dir()?;

    match command {
        Commands::Install { no_activate } => handle_install(config, no_activate).await,
        Commands::Activate => handle_activate(config).await,
        Commands::Fetch {
            path,
            destination,
            method,
        } => handle_fetch(config, &path, &destination, &method).await,
        Commands::Stores => handle_stores(config).await,
        Commands::Kv { command } => handle_kv(config, command),
        Commands::Prefs { command } => handle_prefs(config, command),
        Commands::Push { payload, click } => handle_push(config, &payload, click).await,
        Commands::Preload {
            sources,
            current,
            count,
        } => handle_preload(config, &sources, current, count).await,
    }
}

struct Runtime {
    worker: Arc<ServiceWorker>,
    network: Arc<dyn Network>,
}

fn build_runtime(config: &WorkerConfig) -> CliResult<Runtime> {
    let stores = Arc::new(StoreManager::new(
        config.stores_dir(),
        &config.store_prefix,
        config.version,
    )?);
    let network: Arc<dyn Network> = Arc::new(HttpNetwork::new(config.origin.clone()));
    let worker = Arc::new(ServiceWorker::new(
        config.origin.clone(),
        config.manifest()?,
        stores,
        Arc::clone(&network),
        Arc::new(LoggingHost),
    ));
    Ok(Runtime { worker, network })
}

/// Build the runtime and adopt the registered version if it matches ours
fn resume_runtime(config: &WorkerConfig) -> CliResult<Runtime> {
    let runtime = build_runtime(config)?;
    if Registration::load(&config.data_dir).is_active(config.version) {
        runtime.worker.resume()?;
    } else {
        info!(version = config.version, "Version not active, requests bypass the worker");
    }
    Ok(runtime)
}

fn local_storage(config: &WorkerConfig) -> Arc<dyn LocalStorage> {
    Arc::new(FileStorage::new(config.local_storage_path()).with_quota(config.storage_quota))
}

async fn handle_install(config: &WorkerConfig, no_activate: bool) -> CliResult<(&'static str, Value)> {
    let runtime = build_runtime(config)?;
    let worker = &runtime.worker;
    worker.install().await?;

    let registration = Registration::load(&config.data_dir).installed(worker.version());
    registration.save(&config.data_dir)?;

    if no_activate {
        return Ok((
            "install_result",
            json!({ "phase": worker.phase(), "activation": null }),
        ));
    }

    let activation = worker.activate().await?;
    Registration::activated(worker.version()).save(&config.data_dir)?;

    Ok((
        "install_result",
        json!({ "phase": worker.phase(), "activation": activation }),
    ))
}

async fn handle_activate(config: &WorkerConfig) -> CliResult<(&'static str, Value)> {
    let registration = Registration::load(&config.data_dir);
    if !registration.is_installed(config.version) {
        return Err(CliError::InvalidPhase(format!(
            "Version {} is not installed; run install first",
            config.version
        )));
    }

    let runtime = build_runtime(config)?;
    runtime.worker.resume_installed()?;
    let activation = runtime.worker.activate().await?;
    Registration::activated(config.version).save(&config.data_dir)?;

    Ok(("activation", serde_json::to_value(&activation).map_err(WorkerError::from)?))
}

async fn handle_fetch(
    config: &WorkerConfig,
    path: &str,
    destination: &str,
    method: &str,
) -> CliResult<(&'static str, Value)> {
    let url = config
        .origin
        .join(path)
        .map_err(|e| CliError::InvalidArguments(format!("Invalid path {}: {}", path, e)))?;
    let request = Request::get(url)
        .with_destination(destination.parse::<Destination>()?)
        .with_method(method);

    let runtime = resume_runtime(config)?;
    let outcome = runtime.worker.handle_fetch(&request).await?;

    let view = match &outcome {
        Intercept::Respond(_) => to_fetch_view(&request, &outcome),
        Intercept::Bypass => {
            let response = runtime
                .network
                .fetch(&request)
                .await
                .map_err(WorkerError::from)?;
            to_fetch_view(&request, &outcome).with_response(&response)
        }
    };
    runtime.worker.settle().await;

    Ok(("fetch_result", serde_json::to_value(&view).map_err(WorkerError::from)?))
}

async fn handle_stores(config: &WorkerConfig) -> CliResult<(&'static str, Value)> {
    let runtime = build_runtime(config)?;
    let stores = runtime.worker.stores();
    let stats = stores.stats().await?;

    Ok((
        "store_status",
        json!({
            "registration": Registration::load(&config.data_dir),
            "current_stores": stores.valid_names(),
            "summary": stats.display(),
            "stats": stats,
        }),
    ))
}

fn handle_kv(config: &WorkerConfig, command: KvCommands) -> CliResult<(&'static str, Value)> {
    let cache = TtlCache::new(local_storage(config));

    let data = match command {
        KvCommands::Set { key, value, ttl } => {
            if !cache.set(&key, &ValueParser::parse_value(&value), ttl) {
                return Err(CliError::StorageError(format!(
                    "Failed to store value for {}",
                    key
                )));
            }
            json!({ "key": key, "ttl_minutes": ttl })
        }
        KvCommands::Get { key } => {
            let value = cache.get(&key);
            json!({ "key": key, "found": value.is_some(), "value": value })
        }
        KvCommands::Remove { key } => {
            let removed = cache.remove(&key);
            json!({ "key": key, "removed": removed })
        }
        KvCommands::Clear => json!({ "cleared": cache.clear() }),
        KvCommands::List => json!({ "keys": cache.keys() }),
    };

    Ok(("kv_result", data))
}

fn handle_prefs(config: &WorkerConfig, command: PrefsCommands) -> CliResult<(&'static str, Value)> {
    let mut prefs = PreferenceStore::load(local_storage(config));

    match command {
        PrefsCommands::Show => {}
        PrefsCommands::Set { key, value } => prefs.update(&key, ValueParser::parse_value(&value))?,
        PrefsCommands::View { gem_id } => prefs.add_to_recently_viewed(&gem_id),
        PrefsCommands::Filters { json } => prefs.update_filters(ValueParser::parse_object(&json)?)?,
        PrefsCommands::Reset => prefs.reset(),
    }

    Ok((
        "preferences",
        serde_json::to_value(prefs.preferences()).map_err(WorkerError::from)?,
    ))
}

async fn handle_push(config: &WorkerConfig, payload: &str, click: bool) -> CliResult<(&'static str, Value)> {
    let runtime = build_runtime(config)?;
    let worker = &runtime.worker;

    let notification = worker.handle_push(Some(payload.as_bytes())).await;
    let opened = match (&notification, click) {
        (Some(notification), true) => worker.handle_notification_click(notification).await,
        _ => false,
    };

    Ok((
        "push_result",
        json!({
            "shown": notification.is_some(),
            "notification": notification,
            "opened": opened,
        }),
    ))
}

async fn handle_preload(
    config: &WorkerConfig,
    sources: &[String],
    current: usize,
    count: usize,
) -> CliResult<(&'static str, Value)> {
    let runtime = resume_runtime(config)?;
    let mut preloader =
        ImagePreloader::new(Arc::clone(&runtime.worker), Arc::clone(&runtime.network))
            .with_count(count);

    let status = preloader.preload(sources, current).await.clone();
    runtime.worker.settle().await;

    Ok(("preload_result", json!({ "current": current, "status": status })))
}
