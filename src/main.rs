//! Taskboard API server.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: `PostgreSQL` connection URL (required when `STORAGE_MODE=postgres`)
//! - `SEED_DEMO_DATA`: insert demo users, project and tasks (default: `true` in memory)
//! - `JWT_SECRET`: HS256 signing secret (default: random per process)
//! - `TOKEN_TTL_MINUTES`: bearer token lifetime (default: `30`)
//! - `RUST_LOG`: Logging filter (default: `taskboard=debug,tower_http=debug`)
//! - `HOST`: Server host address (default: `0.0.0.0`)
//! - `PORT`: Server port (default: `3000`)
//! - `WORKER_THREADS`: Number of tokio worker threads (default: logical CPU count)

use std::env;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard::api::{AppState, AuthConfig, router};
use taskboard::domain::DEFAULT_PASSWORD_COST;
use taskboard::infrastructure::{RepositoryConfig, RepositoryFactory, seed_demo_data};

/// Reads `WORKER_THREADS`; anything other than a positive integer falls back
/// to the tokio default.
fn worker_threads(value: Option<&str>) -> Result<Option<usize>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => match text.parse::<usize>() {
            Ok(threads) if threads > 0 => Ok(Some(threads)),
            _ => Err(format!("WORKER_THREADS='{text}' is not a positive integer, using default")),
        },
    }
}

fn main() {
    dotenvy::dotenv().ok();

    let threads = worker_threads(env::var("WORKER_THREADS").ok().as_deref());
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Ok(Some(count)) = threads {
        builder.worker_threads(count);
    }

    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to create tokio runtime: {error}");
            std::process::exit(1);
        }
    };
    runtime.block_on(async_main(threads.err()));
}

async fn async_main(worker_threads_warning: Option<String>) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskboard=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting taskboard server");
    if let Some(warning) = worker_threads_warning {
        tracing::warn!("{}", warning);
    }

    let config = match RepositoryConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    let auth = match AuthConfig::from_env() {
        Ok(auth) => auth,
        Err(error) => {
            tracing::error!("Configuration error: {}", error);
            std::process::exit(1);
        }
    };

    tracing::info!(
        storage_mode = ?config.storage_mode,
        seed_demo_data = config.seed_demo_data,
        token_ttl_minutes = auth.token_ttl.num_minutes(),
        "Configuration loaded"
    );

    let seed = config.seed_demo_data;
    let factory = RepositoryFactory::new(config);
    let repositories = match factory.create().await {
        Ok(repositories) => {
            tracing::info!("Repositories initialized successfully");
            repositories
        }
        Err(error) => {
            tracing::error!("Failed to initialize repositories: {}", error);
            std::process::exit(1);
        }
    };

    if seed && let Err(error) = seed_demo_data(&repositories, DEFAULT_PASSWORD_COST).await {
        tracing::error!(%error, "Failed to seed demo data");
        std::process::exit(1);
    }

    let application = router(AppState::new(repositories, &auth));

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(3000);

    let address: SocketAddr = match format!("{host}:{port}").parse() {
        Ok(address) => address,
        Err(error) => {
            tracing::error!(%error, "Invalid server address: {}:{}", host, port);
            std::process::exit(1);
        }
    };

    let listener = match TcpListener::bind(address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%error, "Failed to bind to address {}", address);
            std::process::exit(1);
        }
    };

    match listener.local_addr() {
        Ok(address) => tracing::info!("Listening on {}", address),
        Err(error) => tracing::warn!(%error, "Could not determine local address"),
    }

    if let Err(error) = axum::serve(listener, application)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "Server error");
        std::process::exit(1);
    }

    tracing::info!("Server shutdown complete");
}

/// Completes on SIGINT, or on SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::warn!(%error, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(%error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
