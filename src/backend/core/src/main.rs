//! Cinegate Server - Main entry point

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use cinegate_core::{
    api::{self, AppState, RouteLimiters},
    cache::TieredCache,
    catalog::{CatalogAggregator, TmdbClient},
    config::Config,
    health::{ExternalServiceHealthChecker, HealthConfig, HealthService},
    middleware::{start_cleanup_task, SlidingWindowLimiter},
    resolver::VideoSourceResolver,
    telemetry::{self, redact_secret},
};

#[derive(Parser, Debug)]
#[command(name = "cinegate-server", version, about = "Cinegate catalog and playback server")]
struct Args {
    /// Configuration file (defaults to $CINEGATE_CONFIG or config/cinegate.toml)
    #[arg(short, long, env = "CINEGATE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(&path.to_string_lossy())?,
        None => Config::load()?,
    };

    let telemetry = telemetry::init_telemetry(&config.logging, &config.metrics)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting Cinegate server");

    // Cache
    let cache = Arc::new(TieredCache::from_config(config.cache.clone(), &config.redis)?);
    tracing::info!(
        remote = ?cache.remote_name(),
        redis_url = %redact_secret(&config.redis.url),
        "Tiered cache ready"
    );

    // Limiters
    let limiters = RouteLimiters {
        catalog: Arc::new(SlidingWindowLimiter::new("catalog", config.rate_limit.catalog.clone())?),
        playback: Arc::new(SlidingWindowLimiter::new("playback", config.rate_limit.playback.clone())?),
    };
    let probe_limiter = Arc::new(SlidingWindowLimiter::new("probe", config.rate_limit.probe.clone())?);

    // Catalog and resolver
    let source = Arc::new(TmdbClient::new(&config.upstream)?);
    let catalog = Arc::new(CatalogAggregator::new(
        source,
        cache.clone(),
        config.catalog.clone(),
        &config.upstream,
    ));
    let resolver = Arc::new(VideoSourceResolver::new(config.resolver.clone())?.with_probe_limiter(probe_limiter.clone()));

    // Health
    let check_timeout = config.server.health_check_timeout;
    let mut health = HealthService::new(HealthConfig { check_timeout });
    health.attach_cache(cache.clone());
    health.register_checker(Arc::new(ExternalServiceHealthChecker::new(
        "metadata_api",
        config.upstream.base_url.clone(),
        check_timeout,
    )));
    health.register_checker(Arc::new(
        ExternalServiceHealthChecker::new("video_host", config.resolver.base_url.clone(), check_timeout)
            .with_head()
            .with_user_agent(&config.resolver.user_agent, check_timeout),
    ));
    tracing::info!(checkers = ?health.checker_names(), "Health checks registered");

    // Background tasks
    let shutdown = CancellationToken::new();
    let sweep_interval = config.rate_limit.sweep_interval;
    let tasks = vec![
        start_cleanup_task(limiters.catalog.clone(), sweep_interval, shutdown.clone()),
        start_cleanup_task(limiters.playback.clone(), sweep_interval, shutdown.clone()),
        start_cleanup_task(probe_limiter, sweep_interval, shutdown.clone()),
        cache
            .clone()
            .start_maintenance_task(config.cache.sweep_interval, shutdown.clone()),
    ];

    let state = AppState {
        cache,
        catalog,
        resolver,
        limiters,
        rate_limit: Arc::new(config.rate_limit.clone()),
    };
    let app = api::build_router(state, Arc::new(health));

    let listener = tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(address = %listener.local_addr()?, "Starting HTTP server");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    futures::future::join_all(tasks).await;

    tracing::info!("Server shutdown complete");
    telemetry.shutdown();

    Ok(())
}

/// Wait for Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
