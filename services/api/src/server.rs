use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryIdentityProvider, InMemoryQuoteRepository, LogNotifier};
use crate::routes::with_quote_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use quote_intake::config::AppConfig;
use quote_intake::error::AppError;
use quote_intake::telemetry;
use quote_intake::workflows::quote_requests::{LocalFileStore, QuoteRequestService};
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
    if let Some(root) = args.storage_root.take() {
        config.storage.root = root;
    }

    telemetry::init(&config.telemetry)?;
    std::fs::create_dir_all(&config.storage.root)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let files = Arc::new(LocalFileStore::new(config.storage.root.clone()));
    let notifier = Arc::new(LogNotifier::new(config.notifications.recipients.clone()));
    let service = Arc::new(QuoteRequestService::new(
        Arc::new(InMemoryQuoteRepository::default()),
        files,
        notifier,
        config.uploads,
        &config.notifications,
    ));
    let identity = Arc::new(InMemoryIdentityProvider::seeded());

    let app = with_quote_routes(service, identity)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        storage_root = %config.storage.root.display(),
        "quote intake portal ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
