use std::net::SocketAddr;
use std::sync::Arc;

use autotune_api::config::ServerConfig;
use autotune_api::router::build_app_router;
use autotune_api::state::AppState;
use autotune_cloud::{AzureBatchScheduler, AzureBlobStore, BatchConfig, StorageConfig};
use autotune_notify::{DisabledMailer, EmailConfig, Mailer, SmtpMailer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "autotune_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = autotune_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    autotune_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    autotune_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Cloud clients ---
    let http = reqwest::Client::new();

    let batch_config = BatchConfig::from_env().expect("Invalid batch configuration");
    let scheduler = AzureBatchScheduler::with_client(http.clone(), &batch_config)
        .expect("Failed to create batch client");
    tracing::info!(pool_id = %batch_config.pool_id, "Batch client ready");

    let storage_config = StorageConfig::from_env().expect("Invalid storage configuration");
    let store = AzureBlobStore::with_client(http, &storage_config)
        .expect("Failed to create storage client");
    tracing::info!(endpoint = %storage_config.blob_endpoint, "Storage client ready");

    // --- Mailer ---
    let mailer: Arc<dyn Mailer> = match EmailConfig::from_env() {
        Some(email_config) => {
            tracing::info!(smtp_host = %email_config.smtp_host, "SMTP mailer configured");
            Arc::new(SmtpMailer::new(email_config).expect("Failed to create SMTP transport"))
        }
        None => {
            tracing::warn!("SMTP_HOST not set, results emails will be dropped");
            Arc::new(DisabledMailer)
        }
    };

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        scheduler: Arc::new(scheduler),
        store: Arc::new(store),
        mailer,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so in-flight
/// callbacks finish whether the server is stopped interactively or by a
/// process manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
