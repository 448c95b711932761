//! habitd: habit tracker backend service.
//!
//! # Architecture Overview
//!
//! ```text
//!   SIGINT/SIGTERM/SIGHUP ──┐
//!   panic hook / faults ────┤
//!                           ▼
//!                  ┌─────────────────┐      drain       ┌──────────────┐
//!                  │  SignalListener │──▶ Orchestrator ──▶│ HTTP server  │
//!                  └─────────────────┘        │           │ (stop accept)│
//!                                             │ cleanup   └──────────────┘
//!                                             ▼
//!                                   ┌──────────────────┐
//!                                   │  ResourceCache   │
//!                                   │ database, logger │
//!                                   └──────────────────┘
//!                                             │
//!                                       process exit
//! ```
//!
//! The entry point assembles the lifecycle manager once and hands it to
//! every component that registers cleanup or acquires resources; nothing
//! reaches for ambient globals.

use arc_swap::ArcSwap;
use clap::Parser;
use futures_util::future;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use habitd::config::loader;
use habitd::config::watcher::ConfigWatcher;
use habitd::http::{AppState, HttpServer};
use habitd::lifecycle::{OsProcess, RegisterOptions, ShutdownOrchestrator, SignalListener};
use habitd::observability::logging::{err_field, fields, logger_fingerprint, LoggerFactory};
use habitd::observability::metrics;
use habitd::resources::cache::CacheError;
use habitd::resources::database::{database_fingerprint, DatabaseHandle};
use habitd::resources::{DriftPolicy, ResourceCache};
use habitd::Logger;

#[derive(Parser)]
#[command(name = "habitd", about = "Habit tracker backend service")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => loader::load_config(path)?,
        None => loader::from_env()?,
    };

    if cli.validate {
        println!("configuration OK");
        return Ok(());
    }

    // One shared view of the current configuration; the reload loop swaps it.
    let current = Arc::new(ArcSwap::from_pointee(config.clone()));

    // Logger cache: cheap and stateless, drift always reinitializes.
    let logger_cache: ResourceCache<Logger> = {
        let current = Arc::clone(&current);
        ResourceCache::new("logger", DriftPolicy::Replace, move |_fingerprint| {
            let config = current.load_full();
            future::ready(Ok(Arc::new(LoggerFactory::create(config.environment))))
        })
    };
    let logger = (*logger_cache
        .acquire(&logger_fingerprint(config.environment))
        .await?)
        .clone();

    // Database cache: the drift policy is a deployment decision.
    let drift_policy = config.database.effective_drift_policy(&config.runtime);
    let database: ResourceCache<DatabaseHandle> = {
        let current = Arc::clone(&current);
        ResourceCache::new("database", drift_policy, move |_fingerprint| {
            let current = Arc::clone(&current);
            async move {
                let config = current.load_full();
                DatabaseHandle::connect(&config.database, &config.runtime)
                    .await
                    .map(Arc::new)
                    .map_err(|e| CacheError::Init(e.to_string()))
            }
        })
    };

    // Warm-up: a bad database configuration fails here, before traffic.
    let fingerprint = database_fingerprint(&config.database, &config.runtime)?;
    let handle = database.acquire(&fingerprint).await?;
    let database_fp = Arc::new(ArcSwap::from_pointee(fingerprint));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr, &logger),
            Err(_) => logger.error_with(
                "Failed to parse metrics address",
                fields(json!({ "metrics_address": config.observability.metrics_address })),
            ),
        }
    }

    let orchestrator = ShutdownOrchestrator::new(logger.clone(), Arc::new(OsProcess));

    // Cleanup hook: the drain broadcast has already stopped the listener by
    // the time this runs; release the connection handle and flush output.
    {
        let database = database.clone();
        let logger = logger.clone();
        orchestrator.register(
            move |event| async move {
                logger.info_with("Draining", fields(json!({ "trigger": event.label })));
                database.close_active().await;
                logger.flush();
                Ok(())
            },
            RegisterOptions {
                deadline: Duration::from_millis(config.shutdown.grace_period_ms),
            },
        );
    }

    let faults = SignalListener::new(orchestrator.clone()).spawn();
    faults.install_panic_hook();

    // Config hot reload: recompute the fingerprint and let the drift policy
    // decide what happens to the cached handle.
    let mut watcher_guard = None;
    if let Some(path) = &cli.config {
        let (watcher, mut updates) = ConfigWatcher::new(path, logger.clone());
        watcher_guard = Some(watcher.run()?);

        let current = Arc::clone(&current);
        let database = database.clone();
        let database_fp = Arc::clone(&database_fp);
        let logger = logger.clone();
        tokio::spawn(async move {
            while let Some(new_config) = updates.recv().await {
                current.store(Arc::new(new_config.clone()));
                match database_fingerprint(&new_config.database, &new_config.runtime) {
                    Ok(fingerprint) => {
                        database_fp.store(Arc::new(fingerprint.clone()));
                        match database.acquire(&fingerprint).await {
                            Ok(handle) => logger.info_with(
                                "Configuration reloaded",
                                fields(json!({ "database": handle.transport() })),
                            ),
                            Err(e) => logger.warn_with(
                                "Reloaded configuration not applied to database handle",
                                err_field(&e),
                            ),
                        }
                    }
                    Err(e) => logger.error_with(
                        "Reloaded configuration has an unusable database url",
                        err_field(&e),
                    ),
                }
            }
        });
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    let local_addr = listener.local_addr()?;

    if config.environment.is_development() {
        println!(
            "habitd listening on http://{local_addr} ({} transport)",
            handle.transport()
        );
    } else {
        logger.info_with(
            "Service started",
            fields(json!({
                "address": local_addr.to_string(),
                "environment": config.environment.as_str(),
                "database": handle.transport(),
            })),
        );
    }

    let state = AppState {
        logger: logger.clone(),
        database: database.clone(),
        database_fingerprint: Arc::clone(&database_fp),
    };
    let server = HttpServer::new(&config, state);
    let drain = orchestrator.subscribe();
    let server_task = tokio::spawn(server.run(listener, drain));

    match server_task.await {
        Ok(Ok(())) => {} // listener stopped after drain began
        Ok(Err(e)) => faults.report("http-server", &e),
        Err(e) => faults.report_message("http-server", e.to_string()),
    }

    drop(watcher_guard);

    // Process exit is owned by the orchestrator.
    future::pending::<()>().await;
    Ok(())
}
