use std::net::SocketAddr;
use std::sync::Arc;

use billing_server::api::{self, AppState};
use billing_server::cache::{JsonFileReferenceSource, ReferenceCache, ReferenceSource};
use billing_server::config::AppConfig;
use billing_server::database::{
    init_pool_from_config, run_migrations, InMemoryOrderRepository, InMemoryRefundRepository,
    OrderRepository, PgOrderRepository, PgRefundRepository, RefundRepository,
};
use billing_server::logging::init_tracing;
use billing_server::payments::{GatewaySession, HandlerRegistry};
use billing_server::services::{
    BillingService, GeoLookup, HttpGeoLookup, NoSavedCards, StaticGeoLookup,
};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.billing.environment,
        "Starting billing server"
    );

    let (orders, refunds): (Arc<dyn OrderRepository>, Arc<dyn RefundRepository>) =
        match &config.database {
            Some(database) => {
                let pool = init_pool_from_config(database).await?;
                run_migrations(&pool).await?;
                info!(
                    max_connections = pool.options().get_max_connections(),
                    "Database connection pool initialized"
                );
                (
                    Arc::new(PgOrderRepository::new(pool.clone())),
                    Arc::new(PgRefundRepository::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set, orders and refunds are kept in memory");
                (
                    Arc::new(InMemoryOrderRepository::new()),
                    Arc::new(InMemoryRefundRepository::new()),
                )
            }
        };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let cache = Arc::new(ReferenceCache::default());
    let refresh_handle = match &config.billing.reference_data_path {
        Some(path) => {
            let source: Arc<dyn ReferenceSource> = Arc::new(JsonFileReferenceSource::new(path));
            cache.rebuild(source.as_ref()).await?;
            info!(path = %path, "Reference data loaded");
            Some(cache.clone().spawn_refresh(
                source,
                config.billing.refresh_interval(),
                shutdown_rx.clone(),
            ))
        }
        None => {
            warn!("REFERENCE_DATA_PATH not set, reference cache is empty");
            None
        }
    };

    let geo: Arc<dyn GeoLookup> = match &config.billing.geoip_url {
        Some(url) => Arc::new(HttpGeoLookup::new(url, config.billing.call_timeout())?),
        None => {
            warn!("GEOIP_URL not set, every payer is unlocated");
            Arc::new(StaticGeoLookup::new())
        }
    };

    let session = Arc::new(GatewaySession::new());
    let handlers = HandlerRegistry::with_defaults(config.cardpay.clone(), session)?;
    info!(handlers = ?handlers.list_available_handlers(), "Payment system handlers registered");

    let billing = Arc::new(BillingService::new(
        cache,
        orders,
        refunds,
        geo,
        Arc::new(NoSavedCards),
        handlers,
        config.billing.clone(),
    ));

    let app = api::router(AppState { billing });

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(handle) = refresh_handle {
        if let Err(e) = tokio::time::timeout(std::time::Duration::from_secs(5), handle).await {
            error!(error = %e, "Timed out waiting for reference cache refresh shutdown");
        }
    }

    info!("Server shutdown complete");
    Ok(())
}
