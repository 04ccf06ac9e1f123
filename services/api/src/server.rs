use crate::cli::ServeArgs;
use crate::infra::{AppState, ConfiguredBlobStore, InMemoryRecordStore, InMemorySessionProvider};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use ethiolearn::config::AppConfig;
use ethiolearn::error::AppError;
use ethiolearn::marketplace::MarketplaceService;
use ethiolearn::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let records = Arc::new(InMemoryRecordStore::default());
    let blobs = ConfiguredBlobStore::from_config(&config.storage);
    let blob_backend = blobs.describe();
    let service = Arc::new(MarketplaceService::new(records, Arc::new(blobs)));
    let sessions = Arc::new(InMemorySessionProvider::default());

    let app = with_marketplace_routes(service, sessions)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, blobs = %blob_backend, "ethiolearn api ready");

    axum::serve(listener, app).await?;
    Ok(())
}
